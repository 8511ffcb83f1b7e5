//! Match error types.

use thiserror::Error;

use crate::tournament::TeamId;

use super::models::MatchId;

/// Match errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// A result names a team outside the match
    #[error("Match {match_id}: winning team {team} is not a participant")]
    WinnerNotInMatch { match_id: MatchId, team: TeamId },

    /// A host participant belongs to a team that is not playing this match
    #[error("Match {match_id}: participant {player} belongs to neither team")]
    UnknownParticipant { match_id: MatchId, player: String },

    /// A match team is missing from the repository
    #[error("Match {match_id}: team {team} not found")]
    MissingTeam { match_id: MatchId, team: TeamId },
}

pub type MatchResult<T> = Result<T, MatchError>;
