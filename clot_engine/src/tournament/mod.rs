//! Tournaments: models, errors and the progression manager.
//!
//! This module provides:
//! - Tournament creation and team registration
//! - Start-of-tournament planning for every format
//! - The reconcile-then-pair cycle driven by [`TournamentManager::advance`]
//! - Standings and completion queries
//!
//! ## Example
//!
//! ```no_run
//! use clot_engine::clock::SystemClock;
//! use clot_engine::config::EngineConfig;
//! use clot_engine::db::InMemoryRepository;
//! use clot_engine::host::{HostSettings, SimulatedHost};
//! use clot_engine::pairing::{Format, Swiss};
//! use clot_engine::tournament::{StartOptions, TournamentConfig, TournamentManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clock = Arc::new(SystemClock);
//!     let host = Arc::new(SimulatedHost::new(clock.clone(), HostSettings::default()));
//!     let manager = TournamentManager::new(
//!         Arc::new(InMemoryRepository::new()),
//!         host.clone(),
//!         clock,
//!         EngineConfig::default(),
//!     );
//!
//!     let config = TournamentConfig::new("Spring Swiss", Format::Swiss(Swiss::default()));
//!     let tournament = manager.create_tournament(config).await?;
//!     for i in 0..8 {
//!         manager
//!             .register_team(tournament.id, format!("Team {i}"), vec![format!("player-{i}")])
//!             .await?;
//!     }
//!
//!     manager.start(tournament.id, StartOptions::Registration).await?;
//!     while !manager.is_finished(tournament.id).await? {
//!         host.resolve_open_games(&mut rand::rng());
//!         manager.advance(tournament.id).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod locks;
pub mod manager;
pub mod models;

pub use errors::{ErrorClass, TournamentError, TournamentResult};
pub use locks::TournamentLocks;
pub use manager::{AdvanceReport, TournamentManager};
pub use models::{
    CalendarMonth, NewRound, NewTeam, PlayerToken, Round, RoundId, StandingRow, StartOptions,
    Team, TeamId, TemplateId, Tournament, TournamentConfig, TournamentId, round_title,
};
