//! Shared setup for integration tests: an in-memory store, a scriptable host
//! and a manual clock wired into one manager.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use clot_engine::clock::ManualClock;
use clot_engine::config::EngineConfig;
use clot_engine::db::InMemoryRepository;
use clot_engine::host::{HostSettings, SimulatedHost};
use clot_engine::pairing::Format;
use clot_engine::tournament::{Team, Tournament, TournamentConfig, TournamentId, TournamentManager};
use std::sync::Arc;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn player(i: usize) -> String {
    format!("p{i:02}")
}

pub struct Harness {
    pub manager: TournamentManager,
    pub host: Arc<SimulatedHost>,
    pub clock: Arc<ManualClock>,
    pub repo: Arc<InMemoryRepository>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(HostSettings::default())
    }

    pub fn with_settings(settings: HostSettings) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let host = Arc::new(SimulatedHost::new(clock.clone(), settings));
        let repo = Arc::new(InMemoryRepository::new());
        let config = EngineConfig {
            rng_seed: Some(2024),
            ..EngineConfig::default()
        };
        let manager = TournamentManager::new(repo.clone(), host.clone(), clock.clone(), config);
        Self {
            manager,
            host,
            clock,
            repo,
        }
    }

    /// Create a tournament and register `n` one-player teams, `p01` first.
    pub async fn setup(&self, name: &str, format: Format, n: usize) -> (Tournament, Vec<Team>) {
        let config = TournamentConfig::new(name, format).with_template(7);
        let tournament = self.manager.create_tournament(config).await.unwrap();
        let mut teams = Vec::with_capacity(n);
        for i in 1..=n {
            let team = self
                .manager
                .register_team(tournament.id, format!("Team {i}"), vec![player(i)])
                .await
                .unwrap();
            teams.push(team);
        }
        (tournament, teams)
    }

    /// Finish every open host game. The side holding the lowest player
    /// token wins.
    pub fn play_open_games(&self) -> usize {
        let open = self.host.open_games();
        for id in &open {
            let Some(request) = self.host.request(id) else {
                continue;
            };
            if let Some(winner) = request.sides.iter().flatten().min() {
                self.host.finish(id, winner);
            }
        }
        open.len()
    }

    /// Play and advance until the tournament finishes. Returns the number
    /// of cycles it took.
    pub async fn run_to_completion(&self, id: TournamentId, max_cycles: usize) -> usize {
        for cycle in 0..max_cycles {
            if self.manager.is_finished(id).await.unwrap() {
                return cycle;
            }
            self.play_open_games();
            self.manager.advance(id).await.unwrap();
        }
        panic!("tournament {id} did not finish within {max_cycles} cycles");
    }
}
