//! Final placement with tie resolution.
//!
//! Teams are bucketed by wins, best first. Inside a bucket:
//! - one team takes the next place;
//! - two teams are split by their direct result;
//! - three or more play a mini-league of head-to-head wins among
//!   themselves, and every smaller tied sub-group is resolved again the same
//!   way.
//!
//! Whenever head-to-head cannot separate a group (no direct match, a split
//! series, or a mini-league where everyone scores the same) the group is
//! ordered by buchholz, then rating, then ascending team id. The result is
//! always a strict total order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::matches::Match;
use crate::tournament::{Team, TeamId};

/// Direct results between pairs of teams.
#[derive(Debug, Clone, Default)]
pub struct HeadToHead {
    wins: HashMap<(TeamId, TeamId), u32>,
}

impl HeadToHead {
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut h2h = Self::default();
        for game in matches.iter().filter(|m| m.is_finished()) {
            if let (Some(winner), Some(loser)) = (game.winning_team, game.losing_team()) {
                *h2h.wins.entry((winner, loser)).or_default() += 1;
            }
        }
        h2h
    }

    /// How often `team` beat `opponent`.
    pub fn wins(&self, team: TeamId, opponent: TeamId) -> u32 {
        self.wins.get(&(team, opponent)).copied().unwrap_or(0)
    }
}

/// Placement of every team, 1 for the best. Inactive teams are placed too.
pub fn resolve_placements(teams: &[Team], matches: &[Match]) -> Vec<(TeamId, u32)> {
    let h2h = HeadToHead::from_matches(matches);

    let mut buckets: BTreeMap<Reverse<u32>, Vec<&Team>> = BTreeMap::new();
    for team in teams {
        buckets.entry(Reverse(team.wins)).or_default().push(team);
    }

    buckets
        .into_values()
        .flat_map(|bucket| order_tied(bucket, &h2h))
        .zip(1u32..)
        .collect()
}

fn order_tied(group: Vec<&Team>, h2h: &HeadToHead) -> Vec<TeamId> {
    match group.as_slice() {
        [] => Vec::new(),
        [only] => vec![only.id],
        [a, b] => match h2h.wins(a.id, b.id).cmp(&h2h.wins(b.id, a.id)) {
            std::cmp::Ordering::Greater => vec![a.id, b.id],
            std::cmp::Ordering::Less => vec![b.id, a.id],
            std::cmp::Ordering::Equal => {
                log::warn!(
                    "Teams {} and {} tied without a deciding direct result",
                    a.id,
                    b.id
                );
                fallback_order(group)
            }
        },
        _ => {
            let mut sub_buckets: BTreeMap<Reverse<u32>, Vec<&Team>> = BTreeMap::new();
            for team in &group {
                let score = group
                    .iter()
                    .filter(|other| other.id != team.id)
                    .map(|other| h2h.wins(team.id, other.id))
                    .sum();
                sub_buckets.entry(Reverse(score)).or_default().push(team);
            }

            if sub_buckets.len() == 1 {
                return fallback_order(group);
            }

            sub_buckets
                .into_values()
                .flat_map(|sub| order_tied(sub, h2h))
                .collect()
        }
    }
}

fn fallback_order(mut group: Vec<&Team>) -> Vec<TeamId> {
    group.sort_by_key(|t| (Reverse(t.buchholz), Reverse(t.rating), t.id));
    group.into_iter().map(|t| t.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{MatchOutcome, MatchState, Pairing};
    use chrono::Utc;

    fn team(id: TeamId, wins: u32, buchholz: i32) -> Team {
        Team {
            id,
            tournament_id: 1,
            name: format!("T{id}"),
            players: vec![format!("p{id}")],
            rating: 1000,
            wins,
            losses: 0,
            buchholz,
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

    fn result(id: i64, winner: TeamId, loser: TeamId) -> Match {
        let now = Utc::now();
        Match {
            id,
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

    fn ids(placements: &[(TeamId, u32)]) -> Vec<TeamId> {
        placements.iter().map(|(id, _)| *id).collect()
    }

    #[test]
    fn test_distinct_wins_order_directly() {
        let teams = vec![team(1, 1, 0), team(2, 3, 0), team(3, 2, 0)];
        let placements = resolve_placements(&teams, &[]);
        assert_eq!(placements, vec![(2, 1), (3, 2), (1, 3)]);
    }

    #[test]
    fn test_two_way_tie_uses_direct_result() {
        let teams = vec![team(1, 2, 5), team(2, 2, 0)];
        let matches = vec![result(1, 2, 1)];
        assert_eq!(ids(&resolve_placements(&teams, &matches)), vec![2, 1]);
    }

    #[test]
    fn test_two_way_tie_without_meeting_uses_buchholz_then_id() {
        let teams = vec![team(4, 2, 1), team(3, 2, 4)];
        assert_eq!(ids(&resolve_placements(&teams, &[])), vec![3, 4]);

        let teams = vec![team(4, 2, 0), team(3, 2, 0)];
        assert_eq!(ids(&resolve_placements(&teams, &[])), vec![3, 4]);
    }

    #[test]
    fn test_three_way_tie_mini_league() {
        // 1 beat 2 and 3, 2 beat 3: a clean mini-league order.
        let teams = vec![team(3, 2, 0), team(2, 2, 0), team(1, 2, 0)];
        let matches = vec![result(1, 1, 2), result(2, 1, 3), result(3, 2, 3)];
        assert_eq!(ids(&resolve_placements(&teams, &matches)), vec![1, 2, 3]);
    }

    #[test]
    fn test_three_way_cycle_falls_back_to_buchholz() {
        // 1 beat 2, 2 beat 3, 3 beat 1: everyone has one mini-league win.
        let teams = vec![team(1, 2, 1), team(2, 2, 7), team(3, 2, 4)];
        let matches = vec![result(1, 1, 2), result(2, 2, 3), result(3, 3, 1)];
        assert_eq!(ids(&resolve_placements(&teams, &matches)), vec![2, 3, 1]);
    }

    #[test]
    fn test_four_way_tie_recurses_into_sub_groups() {
        // Mini-league: 1 and 2 score 2, 3 and 4 score 1; 2 beat 1, 4 beat 3.
        let teams = vec![team(1, 3, 0), team(2, 3, 0), team(3, 3, 0), team(4, 3, 0)];
        let matches = vec![
            result(1, 2, 1),
            result(2, 1, 3),
            result(3, 1, 4),
            result(4, 2, 3),
            result(5, 4, 2),
            result(6, 3, 4),
            result(7, 4, 3),
        ];
        // Scores: 1 -> 2, 2 -> 2, 3 -> 1, 4 -> 2. Top bucket {1,2,4} is a
        // cycle among itself (2>1, 1>4, 4>2) so it falls back to id order.
        assert_eq!(ids(&resolve_placements(&teams, &matches)), vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_placements_are_sequential() {
        let teams: Vec<Team> = (1..=6).map(|id| team(id, (id % 3) as u32, 0)).collect();
        let placements = resolve_placements(&teams, &[]);
        let places: Vec<u32> = placements.iter().map(|(_, p)| *p).collect();
        assert_eq!(places, vec![1, 2, 3, 4, 5, 6]);
    }
}
