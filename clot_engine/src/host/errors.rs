//! Match-host error types.

use std::time::Duration;
use thiserror::Error;

use super::models::is_record_missing_reason;

/// Match-host errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The host answered with a coded error reason
    #[error("Host rejected request: {reason}")]
    Rejected { reason: String },

    /// The call did not complete in time
    #[error("Host call timed out after {0:?}")]
    Timeout(Duration),

    /// The host could not be reached
    #[error("Host unreachable: {0}")]
    Transport(String),
}

impl HostError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        HostError::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether the host says the game record does not exist.
    pub fn is_record_missing(&self) -> bool {
        matches!(self, HostError::Rejected { reason } if is_record_missing_reason(reason))
    }
}

pub type HostResult<T> = Result<T, HostError>;
