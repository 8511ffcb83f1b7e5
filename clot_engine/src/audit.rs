//! Audit trail.
//!
//! Records what the engine decided and what it had to skip. Each helper logs
//! through the `log` facade and returns the record for the repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matches::MatchId;
use crate::tournament::{ErrorClass, TournamentId};

/// Category of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    /// A match changed state on the host
    MatchStatus,
    /// A result was applied
    MatchResolution,
    /// A pairing strategy proposed or deferred
    PairingCycle,
    /// An item was skipped and will be retried
    Recoverable,
    /// A model invariant was broken
    Violation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tournament_id: TournamentId,
    pub match_id: Option<MatchId>,
    pub kind: AuditKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Record a match state change.
pub fn match_status(
    tournament_id: TournamentId,
    match_id: MatchId,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> AuditRecord {
    let message = message.into();
    log::debug!("Tournament {}: match {}: {}", tournament_id, match_id, message);
    AuditRecord {
        tournament_id,
        match_id: Some(match_id),
        kind: AuditKind::MatchStatus,
        message,
        at,
    }
}

/// Record an applied result.
pub fn match_resolution(
    tournament_id: TournamentId,
    match_id: MatchId,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> AuditRecord {
    let message = message.into();
    log::info!("Tournament {}: match {} resolved: {}", tournament_id, match_id, message);
    AuditRecord {
        tournament_id,
        match_id: Some(match_id),
        kind: AuditKind::MatchResolution,
        message,
        at,
    }
}

/// Record what a pairing cycle did.
pub fn pairing_cycle(
    tournament_id: TournamentId,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> AuditRecord {
    let message = message.into();
    log::info!("Tournament {}: {}", tournament_id, message);
    AuditRecord {
        tournament_id,
        match_id: None,
        kind: AuditKind::PairingCycle,
        message,
        at,
    }
}

/// Record a skipped item together with its error class.
pub fn recoverable(
    tournament_id: TournamentId,
    match_id: Option<MatchId>,
    class: ErrorClass,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> AuditRecord {
    let message = format!("{:?}: {}", class, message.into());
    log::warn!("Tournament {}: {}", tournament_id, message);
    AuditRecord {
        tournament_id,
        match_id,
        kind: AuditKind::Recoverable,
        message,
        at,
    }
}

/// Record a broken invariant.
pub fn violation(
    tournament_id: TournamentId,
    match_id: Option<MatchId>,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> AuditRecord {
    let message = message.into();
    log::error!("Tournament {}: invariant violated: {}", tournament_id, message);
    AuditRecord {
        tournament_id,
        match_id,
        kind: AuditKind::Violation,
        message,
        at,
    }
}
