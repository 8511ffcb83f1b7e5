//! Matches: the model, the entry index and lifecycle reconciliation.

pub mod errors;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod pairing_list;

pub use errors::{MatchError, MatchResult};
pub use history::MatchHistory;
pub use lifecycle::{
    LifecyclePolicy, ReconcileInput, Reconciliation, Resolution, SkipReason, reconcile,
};
pub use models::{
    BracketSlot, INVALID_LINK, Match, MatchEntry, MatchId, MatchOutcome, MatchState, NewMatch,
    Pairing,
};
