//! Runner configuration management.
//!
//! Consolidates environment variable reads for the simulation driver. Engine
//! defaults are read separately through [`EngineConfig::from_env`].

use clot_engine::{EngineConfig, FormatKind};
use std::net::SocketAddr;
use std::time::Duration;

/// Simulation settings loaded from the environment, with CLI overrides
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Format of the simulated tournament
    pub format: FormatKind,
    /// Teams registered before the start
    pub teams: usize,
    /// Upper bound on advance cycles
    pub max_cycles: u32,
    /// Real time slept between cycles
    pub interval: Duration,
    /// Simulated time that passes on each cycle
    pub step_minutes: i64,
    /// Template every created game uses
    pub template: i64,
    /// Seed shared by the engine and the simulated players
    pub seed: Option<u64>,
    /// Prometheus scrape endpoint, disabled when absent
    pub metrics_addr: Option<SocketAddr>,
    /// Engine defaults
    pub engine: EngineConfig,
}

/// Values given on the command line; each one wins over its environment variable.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub format: Option<FormatKind>,
    pub teams: Option<usize>,
    pub max_cycles: Option<u32>,
    pub interval_ms: Option<u64>,
    pub seed: Option<u64>,
    pub metrics_addr: Option<SocketAddr>,
}

impl RunnerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but cannot be used
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        let format = match overrides.format {
            Some(format) => format,
            None => match std::env::var("CLOT_RUNNER_FORMAT") {
                Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "CLOT_RUNNER_FORMAT".to_string(),
                    reason: format!("Unknown format '{raw}'"),
                })?,
                Err(_) => FormatKind::Swiss,
            },
        };

        let metrics_addr = match overrides.metrics_addr {
            Some(addr) => Some(addr),
            None => match std::env::var("CLOT_RUNNER_METRICS_ADDR") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "CLOT_RUNNER_METRICS_ADDR".to_string(),
                    reason: format!("'{raw}' is not a socket address"),
                })?),
                Err(_) => None,
            },
        };

        let mut engine = EngineConfig::from_env()?;
        let seed = overrides
            .seed
            .or_else(|| std::env::var("CLOT_RUNNER_SEED").ok().and_then(|v| v.parse().ok()));
        if seed.is_some() {
            engine.rng_seed = seed;
        }

        Ok(RunnerConfig {
            format,
            teams: overrides
                .teams
                .unwrap_or_else(|| parse_env_or("CLOT_RUNNER_TEAMS", 8)),
            max_cycles: overrides
                .max_cycles
                .unwrap_or_else(|| parse_env_or("CLOT_RUNNER_MAX_CYCLES", 200)),
            interval: Duration::from_millis(
                overrides
                    .interval_ms
                    .unwrap_or_else(|| parse_env_or("CLOT_RUNNER_INTERVAL_MS", 0)),
            ),
            step_minutes: parse_env_or("CLOT_RUNNER_STEP_MINUTES", 60),
            template: parse_env_or("CLOT_RUNNER_TEMPLATE", 1),
            seed,
            metrics_addr,
            engine,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.teams < 2 {
            return Err(ConfigError::Invalid {
                var: "CLOT_RUNNER_TEAMS".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        if self.max_cycles == 0 {
            return Err(ConfigError::Invalid {
                var: "CLOT_RUNNER_MAX_CYCLES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.step_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "CLOT_RUNNER_STEP_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.template <= 0 {
            return Err(ConfigError::Invalid {
                var: "CLOT_RUNNER_TEMPLATE".to_string(),
                reason: "Must be a positive template id".to_string(),
            });
        }

        self.engine.validate()?;
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("Engine configuration: {0}")]
    Engine(#[from] clot_engine::config::ConfigError),
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
