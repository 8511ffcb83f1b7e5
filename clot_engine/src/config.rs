//! Engine configuration.
//!
//! Every knob that shapes pairing or lifecycle decisions lives here with its
//! default. Per-format options copy these defaults when a tournament is
//! created, so changing the environment never alters a running tournament.

use std::time::Duration;

use crate::rating::{DEFAULT_INITIAL_RATING, DEFAULT_K_FACTOR};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Engine-wide defaults and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// K-factor for rating updates
    pub k_factor: f64,
    /// Rating assigned to newly registered teams
    pub initial_rating: i32,
    /// Upper bound on every match-host call
    pub host_timeout: Duration,
    /// Boot threshold used when the host reports neither AutoBoot nor DirectBoot
    pub default_boot_minutes: i64,
    /// Default per-team cap on unfinished matches
    pub default_max_concurrent: u32,
    /// Largest per-team cap a tournament may configure
    pub max_concurrent_ceiling: u32,
    /// Shuffle attempts before Swiss accepts a partial bucket pairing
    pub swiss_pairing_attempts: u32,
    /// Reshuffles per bye candidate in round-robin cycles that use byes
    pub round_robin_pairing_attempts: u32,
    /// Hard ceiling on how long a vacation can hold a match open
    pub vacation_ceiling_days: i64,
    /// Ladder rematch cooldown
    pub ladder_cooldown_minutes: i64,
    /// Months kept scheduled ahead of the current one in monthly rotations
    pub rolling_months: u32,
    /// Teams per group in group stages
    pub group_size: usize,
    /// Seed for the pairing RNG; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_INITIAL_RATING,
            host_timeout: Duration::from_secs(10),
            default_boot_minutes: 3 * 24 * 60,
            default_max_concurrent: 2,
            max_concurrent_ceiling: 6,
            swiss_pairing_attempts: 10,
            round_robin_pairing_attempts: 50,
            vacation_ceiling_days: 20,
            ladder_cooldown_minutes: 60,
            rolling_months: 6,
            group_size: 4,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `CLOT_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the loaded values fail [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            k_factor: parse_env_or("CLOT_K_FACTOR", defaults.k_factor),
            initial_rating: parse_env_or("CLOT_INITIAL_RATING", defaults.initial_rating),
            host_timeout: Duration::from_secs(parse_env_or(
                "CLOT_HOST_TIMEOUT_SECS",
                defaults.host_timeout.as_secs(),
            )),
            default_boot_minutes: parse_env_or(
                "CLOT_DEFAULT_BOOT_MINUTES",
                defaults.default_boot_minutes,
            ),
            default_max_concurrent: parse_env_or(
                "CLOT_DEFAULT_MAX_CONCURRENT",
                defaults.default_max_concurrent,
            ),
            max_concurrent_ceiling: parse_env_or(
                "CLOT_MAX_CONCURRENT_CEILING",
                defaults.max_concurrent_ceiling,
            ),
            swiss_pairing_attempts: parse_env_or(
                "CLOT_SWISS_PAIRING_ATTEMPTS",
                defaults.swiss_pairing_attempts,
            ),
            round_robin_pairing_attempts: parse_env_or(
                "CLOT_ROUND_ROBIN_PAIRING_ATTEMPTS",
                defaults.round_robin_pairing_attempts,
            ),
            vacation_ceiling_days: parse_env_or(
                "CLOT_VACATION_CEILING_DAYS",
                defaults.vacation_ceiling_days,
            ),
            ladder_cooldown_minutes: parse_env_or(
                "CLOT_LADDER_COOLDOWN_MINUTES",
                defaults.ladder_cooldown_minutes,
            ),
            rolling_months: parse_env_or("CLOT_ROLLING_MONTHS", defaults.rolling_months),
            group_size: parse_env_or("CLOT_GROUP_SIZE", defaults.group_size),
            rng_seed: std::env::var("CLOT_RNG_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.k_factor > 0.0 && self.k_factor.is_finite()) {
            return Err(invalid("CLOT_K_FACTOR", "Must be a positive number"));
        }

        if self.initial_rating <= 0 {
            return Err(invalid("CLOT_INITIAL_RATING", "Must be greater than 0"));
        }

        if self.host_timeout.is_zero() {
            return Err(invalid("CLOT_HOST_TIMEOUT_SECS", "Must be greater than 0"));
        }

        if self.default_boot_minutes <= 0 {
            return Err(invalid("CLOT_DEFAULT_BOOT_MINUTES", "Must be greater than 0"));
        }

        if self.max_concurrent_ceiling < 2 {
            return Err(invalid("CLOT_MAX_CONCURRENT_CEILING", "Must be at least 2"));
        }

        if self.default_max_concurrent == 0
            || self.default_max_concurrent > self.max_concurrent_ceiling
        {
            return Err(ConfigError::Invalid {
                var: "CLOT_DEFAULT_MAX_CONCURRENT".to_string(),
                reason: format!("Must be between 1 and {}", self.max_concurrent_ceiling),
            });
        }

        if self.swiss_pairing_attempts == 0 {
            return Err(invalid("CLOT_SWISS_PAIRING_ATTEMPTS", "Must be at least 1"));
        }

        if self.round_robin_pairing_attempts == 0 {
            return Err(invalid(
                "CLOT_ROUND_ROBIN_PAIRING_ATTEMPTS",
                "Must be at least 1",
            ));
        }

        if self.vacation_ceiling_days <= 0 {
            return Err(invalid("CLOT_VACATION_CEILING_DAYS", "Must be greater than 0"));
        }

        if self.ladder_cooldown_minutes < 0 {
            return Err(invalid("CLOT_LADDER_COOLDOWN_MINUTES", "Must not be negative"));
        }

        if self.group_size < 2 {
            return Err(invalid("CLOT_GROUP_SIZE", "Must be at least 2"));
        }

        Ok(())
    }

    /// Clamp a requested per-team concurrency cap into `1..=max_concurrent_ceiling`.
    pub fn clamp_concurrency(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_concurrent_ceiling)
    }
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Helper to parse environment variable with default fallback
pub(crate) fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
