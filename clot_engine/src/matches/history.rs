//! Lookups over match entries: who met whom, and who is still busy.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::tournament::TeamId;

use super::models::{MatchEntry, Pairing};

#[derive(Debug, Clone)]
struct Meeting {
    round_number: u32,
    created_at: DateTime<Utc>,
}

/// Index of a tournament's match entries.
#[derive(Debug, Clone, Default)]
pub struct MatchHistory {
    meetings: HashMap<(TeamId, TeamId), Vec<Meeting>>,
    unfinished: HashMap<TeamId, u32>,
}

impl MatchHistory {
    pub fn from_entries(entries: &[MatchEntry]) -> Self {
        let mut history = Self::default();

        for entry in entries {
            if !entry.is_finished {
                *history.unfinished.entry(entry.team).or_default() += 1;
            }
            // Each match has two mirrored entries; index it once.
            if entry.team < entry.opponent {
                history
                    .meetings
                    .entry(Pairing::new(entry.team, entry.opponent).key())
                    .or_default()
                    .push(Meeting {
                        round_number: entry.round_number,
                        created_at: entry.created_at,
                    });
            }
        }

        history
    }

    pub fn have_met(&self, a: TeamId, b: TeamId) -> bool {
        self.meetings.contains_key(&Pairing::new(a, b).key())
    }

    pub fn times_met(&self, a: TeamId, b: TeamId) -> usize {
        self.meetings
            .get(&Pairing::new(a, b).key())
            .map_or(0, Vec::len)
    }

    pub fn met_in_round(&self, a: TeamId, b: TeamId, round_number: u32) -> bool {
        self.meetings
            .get(&Pairing::new(a, b).key())
            .is_some_and(|m| m.iter().any(|m| m.round_number == round_number))
    }

    /// Whether a match between the two was created at or after `since`.
    pub fn met_since(&self, a: TeamId, b: TeamId, since: DateTime<Utc>) -> bool {
        self.meetings
            .get(&Pairing::new(a, b).key())
            .is_some_and(|m| m.iter().any(|m| m.created_at >= since))
    }

    pub fn unfinished_count(&self, team: TeamId) -> u32 {
        self.unfinished.get(&team).copied().unwrap_or(0)
    }

    /// Record a pairing proposed earlier in the same cycle.
    pub fn record_pending(&mut self, pairing: Pairing, round_number: u32, at: DateTime<Utc>) {
        self.meetings
            .entry(pairing.key())
            .or_default()
            .push(Meeting {
                round_number,
                created_at: at,
            });
        *self.unfinished.entry(pairing.first).or_default() += 1;
        *self.unfinished.entry(pairing.second).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entries(a: TeamId, b: TeamId, round: u32, finished: bool, at: DateTime<Utc>) -> Vec<MatchEntry> {
        let make = |team, opponent| MatchEntry {
            match_id: 1,
            tournament_id: 1,
            round_number: round,
            team,
            opponent,
            is_finished: finished,
            created_at: at,
        };
        vec![make(a, b), make(b, a)]
    }

    #[test]
    fn test_meetings_are_order_insensitive() {
        let now = Utc::now();
        let history = MatchHistory::from_entries(&entries(3, 1, 2, true, now));
        assert!(history.have_met(1, 3));
        assert!(history.have_met(3, 1));
        assert!(history.met_in_round(1, 3, 2));
        assert!(!history.met_in_round(1, 3, 1));
        assert_eq!(history.times_met(1, 3), 1);
    }

    #[test]
    fn test_unfinished_counts_per_team() {
        let now = Utc::now();
        let mut all = entries(1, 2, 1, false, now);
        all.extend(entries(1, 3, 1, true, now));
        let history = MatchHistory::from_entries(&all);
        assert_eq!(history.unfinished_count(1), 1);
        assert_eq!(history.unfinished_count(2), 1);
        assert_eq!(history.unfinished_count(3), 0);
    }

    #[test]
    fn test_met_since_window() {
        let now = Utc::now();
        let history = MatchHistory::from_entries(&entries(1, 2, 1, true, now - Duration::hours(2)));
        assert!(!history.met_since(1, 2, now - Duration::hours(1)));
        assert!(history.met_since(1, 2, now - Duration::hours(3)));
    }

    #[test]
    fn test_record_pending() {
        let mut history = MatchHistory::default();
        history.record_pending(Pairing::new(4, 5), 1, Utc::now());
        assert!(history.have_met(5, 4));
        assert_eq!(history.unfinished_count(4), 1);
    }
}
