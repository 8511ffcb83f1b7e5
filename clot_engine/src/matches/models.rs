//! Match data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::HostMatchId;
use crate::tournament::{RoundId, TeamId, TemplateId, TournamentId};

use super::errors::{MatchError, MatchResult};

/// Match ID type
pub type MatchId = i64;

/// Marker stored instead of a host id when the host lost the game record.
pub const INVALID_LINK: &str = "invalid_link";

/// Two teams meeting each other. Identity ignores order.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub first: TeamId,
    pub second: TeamId,
}

impl Pairing {
    pub fn new(first: TeamId, second: TeamId) -> Self {
        Self { first, second }
    }

    pub fn contains(&self, team: TeamId) -> bool {
        self.first == team || self.second == team
    }

    /// The other team, if `team` is part of this pairing.
    pub fn opponent_of(&self, team: TeamId) -> Option<TeamId> {
        if self.first == team {
            Some(self.second)
        } else if self.second == team {
            Some(self.first)
        } else {
            None
        }
    }

    /// Order-insensitive key for maps and sets.
    pub fn key(&self) -> (TeamId, TeamId) {
        (self.first.min(self.second), self.first.max(self.second))
    }
}

impl PartialEq for Pairing {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl std::hash::Hash for Pairing {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One position of a bracket. `None` is an undecided occupant, or a bye in
/// the first round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BracketSlot {
    pub first: Option<TeamId>,
    pub second: Option<TeamId>,
}

impl BracketSlot {
    pub fn new(first: Option<TeamId>, second: Option<TeamId>) -> Self {
        Self { first, second }
    }

    pub fn open() -> Self {
        Self::default()
    }

    /// The concrete pairing once both occupants are known.
    pub fn as_pairing(&self) -> Option<Pairing> {
        match (self.first, self.second) {
            (Some(a), Some(b)) => Some(Pairing::new(a, b)),
            _ => None,
        }
    }

    /// The single occupant of a slot whose other side is empty.
    pub fn lone_team(&self) -> Option<TeamId> {
        match (self.first, self.second) {
            (Some(a), None) | (None, Some(a)) => Some(a),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.second.is_none()
    }
}

impl From<Pairing> for BracketSlot {
    fn from(pairing: Pairing) -> Self {
        Self::new(Some(pairing.first), Some(pairing.second))
    }
}

/// Lifecycle state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    /// Created on the host, not yet polled
    Created,
    WaitingForPlayers,
    InProgress,
    Finished,
    /// Removed so it can be recreated
    Deleted,
    /// Held after an invariant violation; polled again only once recreated
    Halted,
}

/// How a finished match was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// Played out on the host
    Played,
    /// A side declined or failed to join in time
    ForcedLoss,
    /// The host lost the game record, or reported no winner
    Voided,
}

/// A match between two teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round_id: RoundId,
    pub round_number: u32,
    pub pairing: Pairing,
    pub state: MatchState,
    pub winning_team: Option<TeamId>,
    pub outcome: Option<MatchOutcome>,
    pub host_match_id: Option<HostMatchId>,
    pub template: Option<TemplateId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub boot_deadline: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub needs_recreation: bool,
}

impl Match {
    pub fn is_finished(&self) -> bool {
        self.state == MatchState::Finished
    }

    /// Neither finished nor deleted.
    pub fn is_open(&self) -> bool {
        !matches!(self.state, MatchState::Finished | MatchState::Deleted)
    }

    /// Open and not held back, so the host is asked about it each cycle.
    pub fn needs_polling(&self) -> bool {
        self.is_open() && self.state != MatchState::Halted && !self.needs_recreation
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.pairing.contains(team)
    }

    /// The team that lost, once a winner is recorded.
    pub fn losing_team(&self) -> Option<TeamId> {
        self.winning_team
            .and_then(|winner| self.pairing.opponent_of(winner))
    }

    /// Record a decided result.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::WinnerNotInMatch` if `winner` is not one of the
    /// two match teams.
    pub fn finish_with_winner(
        &mut self,
        winner: TeamId,
        outcome: MatchOutcome,
        now: DateTime<Utc>,
    ) -> MatchResult<()> {
        if !self.pairing.contains(winner) {
            return Err(MatchError::WinnerNotInMatch {
                match_id: self.id,
                team: winner,
            });
        }
        self.state = MatchState::Finished;
        self.winning_team = Some(winner);
        self.outcome = Some(outcome);
        self.finished_at = Some(now);
        self.last_activity = now;
        Ok(())
    }

    /// Finish without a winner or rating change.
    pub fn void(&mut self, now: DateTime<Utc>, invalid_link: bool) {
        self.state = MatchState::Finished;
        self.winning_team = None;
        self.outcome = Some(MatchOutcome::Voided);
        self.finished_at = Some(now);
        self.last_activity = now;
        if invalid_link {
            self.host_match_id = Some(INVALID_LINK.to_string());
        }
    }
}

/// Parameters for a match the host has already accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatch {
    pub tournament_id: TournamentId,
    pub round_id: RoundId,
    pub round_number: u32,
    pub pairing: Pairing,
    pub host_match_id: HostMatchId,
    pub template: Option<TemplateId>,
    pub created_at: DateTime<Utc>,
}

/// One team's view of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub match_id: MatchId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub team: TeamId,
    pub opponent: TeamId,
    pub is_finished: bool,
    pub created_at: DateTime<Utc>,
}

impl MatchEntry {
    /// The two entries a new match produces.
    pub fn pair_for(m: &Match) -> [MatchEntry; 2] {
        let entry = |team, opponent| MatchEntry {
            match_id: m.id,
            tournament_id: m.tournament_id,
            round_number: m.round_number,
            team,
            opponent,
            is_finished: false,
            created_at: m.created_at,
        };
        [
            entry(m.pairing.first, m.pairing.second),
            entry(m.pairing.second, m.pairing.first),
        ]
    }
}
