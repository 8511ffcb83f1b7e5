//! Match-host collaborator.
//!
//! The engine never talks to a game server itself. It creates, polls and
//! deletes games through an injected [`MatchHost`], and wraps every call in
//! [`timeouts::with_timeout`].

pub mod errors;
pub mod models;
pub mod simulated;
pub mod timeouts;

use async_trait::async_trait;

use crate::tournament::{PlayerToken, TemplateId};

pub use errors::{HostError, HostResult};
pub use models::{
    CreateMatchRequest, HostMatchId, HostMatchState, HostSettings, HostSnapshot,
    ParticipantState, ParticipantStatus, RECORD_MISSING,
};
pub use simulated::SimulatedHost;

/// Remote service that hosts the actual games.
#[async_trait]
pub trait MatchHost: Send + Sync {
    /// Create a game and return its host id
    async fn create_match(&self, request: &CreateMatchRequest) -> HostResult<HostMatchId>;

    /// Current state of a game
    async fn match_status(&self, id: &HostMatchId) -> HostResult<HostSnapshot>;

    /// Delete a game
    async fn delete_match(&self, id: &HostMatchId) -> HostResult<()>;

    /// Whether a player has declared a vacation
    async fn is_on_vacation(&self, player: &PlayerToken) -> HostResult<bool>;

    /// Whether a player may play games on a template
    async fn can_use_template(&self, player: &PlayerToken, template: TemplateId)
    -> HostResult<bool>;
}
