//! Repository error types.

use thiserror::Error;

use crate::matches::pairing_list::PairingListError;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Record does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Write conflicts with an existing record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] PairingListError),

    /// Storage backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        RepositoryError::NotFound { entity, id }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
