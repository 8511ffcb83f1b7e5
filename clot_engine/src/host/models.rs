//! Match-host request and snapshot models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tournament::{PlayerToken, TemplateId};

/// Host-side game identifier
pub type HostMatchId = String;

/// Error reason the host reports for a game it no longer knows.
pub const RECORD_MISSING: &str = "ServerGameKeyNotFound";

/// Whether a host error reason means the game record is gone.
pub fn is_record_missing_reason(reason: &str) -> bool {
    reason.contains(RECORD_MISSING) || reason.to_ascii_lowercase().contains("not found")
}

/// Per-participant state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    Invited,
    Joined,
    Declined,
    Booted,
    Won,
    Lost,
    SurrenderAccepted,
    EndedByVote,
}

impl ParticipantState {
    /// States that mean the player never took part in the game.
    pub fn is_no_show(self) -> bool {
        matches!(
            self,
            ParticipantState::Invited | ParticipantState::Declined | ParticipantState::Booted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub player: PlayerToken,
    pub state: ParticipantState,
}

/// Overall game state reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMatchState {
    WaitingForPlayers,
    InProgress,
    Finished,
    /// Host-side failure with its coded reason
    Error(String),
}

/// Game settings the lifecycle cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    pub auto_boot_minutes: Option<i64>,
    pub direct_boot_minutes: Option<i64>,
    pub allow_vacations: bool,
}

impl HostSettings {
    /// Boot threshold, preferring AutoBoot over DirectBoot.
    pub fn boot_threshold(&self) -> Option<Duration> {
        self.auto_boot_minutes
            .or(self.direct_boot_minutes)
            .map(Duration::minutes)
    }
}

/// Point-in-time view of a hosted game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub state: HostMatchState,
    pub participants: Vec<ParticipantStatus>,
    pub last_turn_time: Option<DateTime<Utc>>,
    pub settings: HostSettings,
}

impl HostSnapshot {
    pub fn errored(reason: impl Into<String>) -> Self {
        Self {
            state: HostMatchState::Error(reason.into()),
            participants: Vec::new(),
            last_turn_time: None,
            settings: HostSettings::default(),
        }
    }

    pub fn is_record_missing(&self) -> bool {
        matches!(&self.state, HostMatchState::Error(reason) if is_record_missing_reason(reason))
    }
}

/// Request to create one game on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    pub name: String,
    pub template: Option<TemplateId>,
    /// Players of each side, first side first
    pub sides: [Vec<PlayerToken>; 2],
    /// Opaque setting overrides passed through to the host
    pub settings: serde_json::Map<String, serde_json::Value>,
}
