//! Logging setup and structured cycle events.
//!
//! The engine and the cycle helpers below log through the `log` facade.
//! `Plain` output goes through `env_logger`; `Structured` output goes through
//! a `tracing` subscriber, which also picks up `log` records.

use clot_engine::AdvanceReport;
use clot_engine::tournament::{StandingRow, TournamentId};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Plain,
    Structured,
}

impl std::str::FromStr for LogStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(LogStyle::Plain),
            "structured" | "tracing" => Ok(LogStyle::Structured),
            other => Err(format!("unknown log style '{other}'")),
        }
    }
}

/// Initialize logging. Levels come from `RUST_LOG`, defaulting to `info`.
///
/// # Example
///
/// ```no_run
/// use clot_runner::logging::{self, LogStyle};
///
/// logging::init(LogStyle::Structured);
/// tracing::info!("Runner starting");
/// ```
pub fn init(style: LogStyle) {
    match style {
        LogStyle::Plain => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .format_target(false)
                .init();
        }
        LogStyle::Structured => {
            let env_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();

            tracing::info!("Structured logging initialized");
        }
    }
}

/// Log one advance cycle, including the cycles of child tournaments
pub fn log_cycle(cycle: u32, report: &AdvanceReport) {
    if report.had_activity() {
        log::info!(
            "Cycle {} tournament {}: polled={} resolved={} voided={} skipped={} halted={} recreated={} created={}",
            cycle,
            report.tournament_id,
            report.polled,
            report.resolved,
            report.voided,
            report.skipped,
            report.halted,
            report.recreated,
            report.created
        );
    } else {
        log::debug!("Cycle {} tournament {}: quiet", cycle, report.tournament_id);
    }

    if report.skipped > 0 {
        log::warn!(
            "Tournament {}: {} match(es) left for the next cycle",
            report.tournament_id,
            report.skipped
        );
    }
    if report.halted > 0 {
        log::error!(
            "Tournament {}: {} match(es) halted until recreated",
            report.tournament_id,
            report.halted
        );
    }

    for child in &report.children {
        log_cycle(cycle, child);
    }
}

/// Log an error returned from an advance cycle
pub fn log_advance_failure(cycle: u32, tournament_id: TournamentId, error: &dyn std::fmt::Display) {
    log::error!(
        "Cycle {} tournament {}: advance failed: {}",
        cycle,
        tournament_id,
        error
    );
}

/// Log a finished tournament with its final table
pub fn log_tournament_finished(tournament_id: TournamentId, cycles: u32, standings: &[StandingRow]) {
    log::info!("Tournament {} finished after {} cycle(s)", tournament_id, cycles);
    log_standings(standings);
}

/// Log a standings table, one line per team
pub fn log_standings(standings: &[StandingRow]) {
    for (position, row) in standings.iter().enumerate() {
        log::info!(
            "  {:>2}. {:<12} {:>2}-{:<2} rating {:>4} buchholz {:>3}{}",
            position + 1,
            row.name,
            row.wins,
            row.losses,
            row.rating,
            row.buchholz,
            row.placement
                .map(|p| format!(" (place {p})"))
                .unwrap_or_default()
        );
    }
}
