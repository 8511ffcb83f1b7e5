//! Storage contract and an in-memory implementation.

pub mod errors;
pub mod memory;
pub mod repository;

pub use errors::{RepositoryError, RepositoryResult};
pub use memory::InMemoryRepository;
pub use repository::{
    AuditRepository, MatchRepository, Repository, RoundRepository, TeamRepository,
    TournamentRepository,
};
