//! Tournament error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::host::HostError;
use crate::matches::{MatchError, MatchId};
use crate::pairing::PairingError;

use super::models::{TeamId, TournamentId};

/// How an error is handled by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Host call failed or timed out; retried next cycle
    RecoverableRemote,
    /// An expected related record is missing; the item is skipped
    RecoverableData,
    /// A model invariant was broken; surfaced to the caller
    InvariantViolation,
    /// Setup or configuration cannot be used
    ConfigurationInvalid,
}

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Tournament is full")]
    TournamentFull,

    #[error("Tournament already started")]
    AlreadyStarted,

    #[error("Tournament not started")]
    NotStarted,

    #[error("Player already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Insufficient teams: need {needed}, have {current}")]
    InsufficientTeams { needed: usize, current: usize },

    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Operation not supported by the {0} format")]
    UnsupportedFormat(String),

    #[error("Invariant violated in match {match_id}: {reason}")]
    InvariantViolation { match_id: MatchId, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Match host error: {0}")]
    Host(#[from] HostError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TournamentError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            TournamentError::Host(_) => ErrorClass::RecoverableRemote,
            TournamentError::TeamNotFound(_)
            | TournamentError::MatchNotFound(_)
            | TournamentError::Repository(RepositoryError::NotFound { .. }) => {
                ErrorClass::RecoverableData
            }
            TournamentError::InvariantViolation { .. } => ErrorClass::InvariantViolation,
            TournamentError::Repository(_) | TournamentError::Serialization(_) => {
                ErrorClass::RecoverableRemote
            }
            TournamentError::Pairing(e) if e.is_invariant() => ErrorClass::InvariantViolation,
            _ => ErrorClass::ConfigurationInvalid,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::RecoverableRemote | ErrorClass::RecoverableData
        )
    }
}

impl From<MatchError> for TournamentError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::WinnerNotInMatch { match_id, team } => {
                TournamentError::InvariantViolation {
                    match_id,
                    reason: format!("winning team {team} is not one of the match teams"),
                }
            }
            MatchError::UnknownParticipant { match_id, player } => {
                TournamentError::InvariantViolation {
                    match_id,
                    reason: format!("participant {player} is not on either match team"),
                }
            }
            MatchError::MissingTeam { team, .. } => TournamentError::TeamNotFound(team),
        }
    }
}

pub type TournamentResult<T> = Result<T, TournamentError>;
