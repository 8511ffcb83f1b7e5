//! Standings: live ordering, buchholz, and final placement.

pub mod tiebreak;

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::matches::Match;
use crate::tournament::{StandingRow, Team, TeamId};

pub use tiebreak::{HeadToHead, resolve_placements};

/// Live ordering: wins, buchholz, rating, then id.
pub fn live_order(teams: &[Team]) -> Vec<&Team> {
    let mut ordered: Vec<&Team> = teams.iter().collect();
    ordered.sort_by_key(|t| (Reverse(t.wins), Reverse(t.buchholz), Reverse(t.rating), t.id));
    ordered
}

/// The live leader, if any team exists.
pub fn leader(teams: &[Team]) -> Option<TeamId> {
    live_order(teams).first().map(|t| t.id)
}

/// Buchholz from scratch: for every decided match, each side adds its
/// opponent's win/loss differential.
pub fn recompute_buchholz(teams: &[Team], matches: &[Match]) -> HashMap<TeamId, i32> {
    let score: HashMap<TeamId, i32> = teams.iter().map(|t| (t.id, t.score())).collect();
    let mut buchholz: HashMap<TeamId, i32> = teams.iter().map(|t| (t.id, 0)).collect();

    for game in matches.iter().filter(|m| m.is_finished() && m.winning_team.is_some()) {
        let (a, b) = (game.pairing.first, game.pairing.second);
        if let (Some(score_a), Some(score_b)) = (score.get(&a), score.get(&b)) {
            *buchholz.entry(a).or_default() += score_b;
            *buchholz.entry(b).or_default() += score_a;
        }
    }

    buchholz
}

/// Standings table. Placed teams come first by placement, the rest follow
/// in live order.
pub fn table(teams: &[Team]) -> Vec<StandingRow> {
    let mut placed: Vec<&Team> = teams.iter().filter(|t| t.placement.is_some()).collect();
    placed.sort_by_key(|t| (t.placement, t.id));

    let unplaced: Vec<Team> = teams
        .iter()
        .filter(|t| t.placement.is_none())
        .cloned()
        .collect();

    placed
        .into_iter()
        .map(StandingRow::from)
        .chain(live_order(&unplaced).into_iter().map(StandingRow::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{MatchOutcome, MatchState, Pairing};
    use chrono::Utc;

    fn team(id: TeamId, wins: u32, losses: u32) -> Team {
        Team {
            id,
            tournament_id: 1,
            name: format!("T{id}"),
            players: vec![format!("p{id}")],
            rating: 1000,
            wins,
            losses,
            buchholz: 0,
            seed: None,
            placement: None,
            active: true,
            max_concurrent_matches: 2,
            has_used_bye: false,
            joined_at: Utc::now(),
            vetoed_templates: Vec::new(),
            origin: None,
        }
    }

    fn decided(winner: TeamId, loser: TeamId) -> Match {
        let now = Utc::now();
        Match {
            id: winner * 100 + loser,
            tournament_id: 1,
            round_id: 1,
            round_number: 1,
            pairing: Pairing::new(winner, loser),
            state: MatchState::Finished,
            winning_team: Some(winner),
            outcome: Some(MatchOutcome::Played),
            host_match_id: None,
            template: None,
            created_at: now,
            last_activity: now,
            boot_deadline: None,
            finished_at: Some(now),
            needs_recreation: false,
        }
    }

    #[test]
    fn test_buchholz_sums_opponent_differentials() {
        let teams = vec![team(1, 2, 0), team(2, 1, 1), team(3, 0, 2)];
        let matches = vec![decided(1, 2), decided(1, 3), decided(2, 3)];
        let buchholz = recompute_buchholz(&teams, &matches);
        // 1 met 2 (0) and 3 (-2)
        assert_eq!(buchholz[&1], -2);
        assert_eq!(buchholz[&2], 0);
        assert_eq!(buchholz[&3], 2);
    }

    #[test]
    fn test_live_order_breaks_ties_by_buchholz() {
        let mut teams = vec![team(1, 1, 0), team(2, 1, 0)];
        teams[1].buchholz = 3;
        assert_eq!(leader(&teams), Some(2));
    }

    #[test]
    fn test_table_puts_placed_teams_first() {
        let mut teams = vec![team(1, 3, 0), team(2, 0, 3), team(3, 1, 1)];
        teams[1].placement = Some(1);
        let rows = table(&teams);
        let order: Vec<TeamId> = rows.iter().map(|r| r.team_id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
