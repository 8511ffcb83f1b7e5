use chrono::{TimeZone, Utc};
use clot_engine::matches::{Match, MatchHistory, MatchOutcome, MatchState};
use clot_engine::pairing::{RoundRobin, Swiss, seed_list};
use clot_engine::rating::{DEFAULT_K_FACTOR, rate_result};
use clot_engine::standings::{recompute_buchholz, resolve_placements};
use clot_engine::tournament::{Team, TeamId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

/// Helper to create a field of teams with a spread of results
fn field(n: i64) -> Vec<Team> {
    let joined = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (1..=n)
        .map(|id| Team {
            id,
            tournament_id: 1,
            name: format!("Team {id}"),
            players: vec![format!("p{id}")],
            rating: 1000 + (id as i32 * 7) % 300,
            wins: (id % 4) as u32,
            losses: (3 - id % 4) as u32,
            buchholz: 0,
            seed: Some(id as u32),
            placement: None,
            active: true,
            max_concurrent_matches: 2,
            has_used_bye: false,
            joined_at: joined,
            vetoed_templates: Vec::new(),
            origin: None,
        })
        .collect()
}

/// A finished round-robin between every pair of the field, lower id winning
fn finished_league(teams: &[Team]) -> Vec<Match> {
    let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let ids: Vec<TeamId> = teams.iter().map(|t| t.id).collect();
    RoundRobin::all_pairings(&ids)
        .into_iter()
        .enumerate()
        .map(|(idx, pairing)| Match {
            id: idx as i64 + 1,
            tournament_id: 1,
            round_id: 1,
            round_number: 1,
            pairing,
            state: MatchState::Finished,
            winning_team: Some(pairing.first.min(pairing.second)),
            outcome: Some(MatchOutcome::Played),
            host_match_id: Some(format!("g{idx}")),
            template: None,
            created_at: at,
            last_activity: at,
            boot_deadline: None,
            finished_at: Some(at),
            needs_recreation: false,
        })
        .collect()
}

/// Benchmark Swiss pairing on growing fields
fn bench_swiss_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("swiss_pairing");
    let swiss = Swiss::default();

    for n in [16i64, 64, 256] {
        let teams = field(n);
        let refs: Vec<&Team> = teams.iter().collect();
        let history = MatchHistory::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| swiss.pair_teams(black_box(&refs), &history, &mut rng));
        });
    }

    group.finish();
}

/// Benchmark bracket seeding
fn bench_seed_list(c: &mut Criterion) {
    c.bench_function("seed_list_1000", |b| {
        b.iter(|| seed_list(black_box(1000)));
    });
}

/// Benchmark rating updates
fn bench_rating(c: &mut Criterion) {
    c.bench_function("rate_result", |b| {
        b.iter(|| rate_result(black_box(1450), black_box(1320), DEFAULT_K_FACTOR));
    });
}

/// Benchmark standings resolution over a full league
fn bench_standings(c: &mut Criterion) {
    let mut group = c.benchmark_group("standings");

    for n in [8i64, 32] {
        let teams = field(n);
        let matches = finished_league(&teams);
        group.bench_with_input(BenchmarkId::new("placements", n), &n, |b, _| {
            b.iter(|| resolve_placements(black_box(&teams), black_box(&matches)));
        });
        group.bench_with_input(BenchmarkId::new("buchholz", n), &n, |b, _| {
            b.iter(|| recompute_buchholz(black_box(&teams), black_box(&matches)));
        });
    }

    group.finish();
}

/// Benchmark building the pairing list of a large league
fn bench_round_robin_pairings(c: &mut Criterion) {
    let ids: Vec<TeamId> = (1..=100).collect();
    c.bench_function("round_robin_pairings_100", |b| {
        b.iter(|| RoundRobin::all_pairings(black_box(&ids)));
    });
}

criterion_group!(pairing, bench_swiss_pairing, bench_seed_list, bench_round_robin_pairings);
criterion_group!(results, bench_rating, bench_standings);
criterion_main!(pairing, results);
