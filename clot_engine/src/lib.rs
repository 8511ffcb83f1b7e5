//! # Clot Engine
//!
//! A tournament progression engine for games played on a remote match host.
//!
//! The engine does not run games. It creates them on a [`host::MatchHost`],
//! polls their state, turns finished or abandoned games into results, and
//! decides who plays whom next. Everything happens in discrete, idempotent
//! cycles driven by [`tournament::TournamentManager::advance`].
//!
//! ## Formats
//!
//! Every format implements [`pairing::PairingStrategy`] and is dispatched
//! through the [`pairing::Format`] enum with `enum_dispatch`:
//!
//! - **Swiss**: score-bucketed rounds that avoid rematches
//! - **Seeded bracket**: single elimination with byes for missing seeds
//! - **Round robin**: everyone meets everyone, with optional byes and a
//!   date schedule (clan leagues)
//! - **Group stage**: round-robin groups feeding a seeded knockout
//! - **Monthly rotation**: one template per calendar month, rolling schedule
//! - **Continuous ladder**: real-time games paired as teams become free
//!
//! ## Core Modules
//!
//! - [`tournament`]: models and the orchestrating manager
//! - [`pairing`]: the pairing strategies
//! - [`matches`]: match model and host-state reconciliation
//! - [`standings`]: tiebreaks, buchholz and placements
//! - [`rating`]: Elo updates
//! - [`db`]: storage contract and an in-memory store
//! - [`host`]: match-host contract and a scriptable in-memory host

/// Audit trail records.
pub mod audit;

/// Time source.
pub mod clock;

/// Engine configuration.
pub mod config;

/// Storage contract and in-memory implementation.
pub mod db;

/// Match-host contract.
pub mod host;

/// Match model, entry index and lifecycle reconciliation.
pub mod matches;

/// Pairing strategies, one per format.
pub mod pairing;

/// Elo rating.
pub mod rating;

/// Standings and tiebreaks.
pub mod standings;

/// Tournaments and the progression manager.
pub mod tournament;

pub use config::EngineConfig;
pub use pairing::{Format, FormatKind, PairingStrategy};
pub use tournament::{
    AdvanceReport, StartOptions, TournamentConfig, TournamentError, TournamentManager,
    TournamentResult,
};
