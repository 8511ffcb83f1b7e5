//! Repository trait definitions.
//!
//! The engine reads and writes every entity through these traits, so any
//! store with read-your-writes consistency can back it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditRecord;
use crate::matches::{Match, MatchEntry, MatchId, NewMatch};
use crate::tournament::{
    NewRound, NewTeam, Round, Team, TeamId, Tournament, TournamentConfig, TournamentId,
};

use super::errors::RepositoryResult;

/// Trait for tournament repository operations
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Create a tournament that has not started
    async fn create_tournament(
        &self,
        config: &TournamentConfig,
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<Tournament>;

    /// Find tournament by ID
    async fn find_tournament(&self, id: TournamentId) -> RepositoryResult<Option<Tournament>>;

    /// Save tournament fields
    async fn save_tournament(&self, tournament: &Tournament) -> RepositoryResult<()>;

    /// Tournaments whose parent is `parent`, oldest first
    async fn child_tournaments(&self, parent: TournamentId) -> RepositoryResult<Vec<Tournament>>;
}

/// Trait for team repository operations
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Register a team; `initial_rating` applies when the team carries none
    async fn create_team(&self, team: &NewTeam, initial_rating: i32) -> RepositoryResult<Team>;

    /// Find team by ID
    async fn find_team(&self, id: TeamId) -> RepositoryResult<Option<Team>>;

    /// Teams of a tournament in registration order
    async fn teams_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Team>>;

    /// Save team fields
    async fn save_team(&self, team: &Team) -> RepositoryResult<()>;
}

/// Trait for round repository operations
#[async_trait]
pub trait RoundRepository: Send + Sync {
    /// Create a round; fails if the round number is taken
    async fn create_round(&self, round: &NewRound) -> RepositoryResult<Round>;

    /// Rounds of a tournament by round number
    async fn rounds_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Round>>;

    /// Save round fields
    async fn save_round(&self, round: &Round) -> RepositoryResult<()>;
}

/// Trait for match repository operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Create a match and its two entries
    async fn create_match(&self, new_match: &NewMatch) -> RepositoryResult<Match>;

    /// Find match by ID
    async fn find_match(&self, id: MatchId) -> RepositoryResult<Option<Match>>;

    /// Matches of a tournament in creation order, deleted ones included
    async fn matches_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Match>>;

    /// Save match fields
    async fn save_match(&self, game: &Match) -> RepositoryResult<()>;

    /// Entries of a tournament
    async fn entries_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<MatchEntry>>;

    /// Save a finished match, its teams and finished entries in one step
    async fn record_result(&self, game: &Match, teams: &[Team]) -> RepositoryResult<()>;

    /// Remove both entries of a match
    async fn delete_match_entries(&self, match_id: MatchId) -> RepositoryResult<()>;
}

/// Trait for audit log operations
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append a record
    async fn append_audit(&self, record: &AuditRecord) -> RepositoryResult<()>;

    /// Records of a tournament, oldest first
    async fn audit_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<AuditRecord>>;
}

/// Everything the engine needs from storage.
pub trait Repository:
    TournamentRepository + TeamRepository + RoundRepository + MatchRepository + AuditRepository
{
}

impl<T> Repository for T where
    T: TournamentRepository + TeamRepository + RoundRepository + MatchRepository + AuditRepository
{
}
