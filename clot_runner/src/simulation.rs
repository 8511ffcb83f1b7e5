//! A tournament played out against the in-memory host.
//!
//! Simulated time moves by a fixed step per cycle on a [`ManualClock`], so
//! boot thresholds, ladder cooldowns and calendar months all come into play
//! without waiting on the wall clock.

use chrono::{Duration, Utc};
use clot_engine::clock::{Clock, ManualClock};
use clot_engine::db::InMemoryRepository;
use clot_engine::host::{HostSettings, SimulatedHost};
use clot_engine::pairing::{ContinuousLadder, Format, FormatKind};
use clot_engine::tournament::{
    CalendarMonth, ErrorClass, StandingRow, TeamId, TournamentId, TournamentResult,
};
use clot_engine::{AdvanceReport, StartOptions, TournamentConfig, TournamentManager};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RunnerConfig;
use crate::{logging, metrics};

/// Outcome of a simulated run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tournament_id: TournamentId,
    /// Advance cycles run after the start
    pub cycles: u32,
    pub finished: bool,
    pub standings: Vec<StandingRow>,
}

/// One simulated tournament with its own store, host and clock
pub struct Simulation {
    config: RunnerConfig,
    manager: TournamentManager,
    host: Arc<SimulatedHost>,
    clock: Arc<ManualClock>,
    rng: StdRng,
    format: Format,
    scheduled_months: HashSet<CalendarMonth>,
}

impl Simulation {
    pub fn new(config: RunnerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let host = Arc::new(SimulatedHost::new(
            clock.clone(),
            HostSettings {
                auto_boot_minutes: Some(config.engine.default_boot_minutes),
                direct_boot_minutes: None,
                allow_vacations: false,
            },
        ));
        let repo = Arc::new(InMemoryRepository::new());
        let manager =
            TournamentManager::new(repo, host.clone(), clock.clone(), config.engine.clone());

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let format = match config.format {
            FormatKind::ContinuousLadder => ContinuousLadder::from_config(&config.engine)
                .with_templates(vec![config.template])
                .into(),
            kind => Format::with_defaults(kind, &config.engine),
        };

        Self {
            config,
            manager,
            host,
            clock,
            rng,
            format,
            scheduled_months: HashSet::new(),
        }
    }

    pub fn manager(&self) -> &TournamentManager {
        &self.manager
    }

    pub fn host(&self) -> &SimulatedHost {
        &self.host
    }

    fn player(index: usize) -> String {
        format!("player-{index:03}")
    }

    /// Create the tournament, fill it with one-player teams and start it.
    pub async fn setup(&mut self) -> TournamentResult<TournamentId> {
        let kind = self.format.kind();
        let name = format!("Simulated {kind}");
        let tournament_config =
            TournamentConfig::new(name, self.format.clone()).with_template(self.config.template);
        let tournament = self.manager.create_tournament(tournament_config).await?;

        let mut teams: Vec<TeamId> = Vec::with_capacity(self.config.teams);
        for index in 1..=self.config.teams {
            let name = format!("Team {index}");
            let players = vec![Self::player(index)];
            let team = match kind {
                FormatKind::ContinuousLadder => {
                    self.manager.join_ladder(tournament.id, name, players).await?
                }
                _ => self.manager.register_team(tournament.id, name, players).await?,
            };
            teams.push(team.id);
        }
        log::info!(
            "Registered {} teams in tournament {}",
            teams.len(),
            tournament.id
        );

        let report = self
            .manager
            .start(tournament.id, StartOptions::Registration)
            .await?;
        self.schedule_month_templates(tournament.id).await?;
        logging::log_cycle(0, &report);
        metrics::record_report(&report);

        Ok(tournament.id)
    }

    /// Validate the current rolling horizon of a monthly rotation.
    async fn schedule_month_templates(&mut self, id: TournamentId) -> TournamentResult<()> {
        let Format::MonthlyRotation(rotation) = &self.format else {
            return Ok(());
        };

        let horizon = rotation.horizon(self.clock.now());
        for month in horizon {
            if self.scheduled_months.contains(&month) {
                continue;
            }
            match self
                .manager
                .assign_month_template(id, month, self.config.template)
                .await
            {
                Ok(()) => {
                    self.scheduled_months.insert(month);
                }
                // Opened by a later cycle
                Err(clot_engine::TournamentError::InvalidSetup(reason)) => {
                    log::debug!("Month {month} not open yet: {reason}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Play one simulated step: every open game finishes, time moves on and
    /// the tournament advances.
    pub async fn step(&mut self, id: TournamentId) -> TournamentResult<AdvanceReport> {
        let played = self.host.resolve_open_games(&mut self.rng);
        log::debug!("Simulated players finished {played} game(s)");
        self.clock.advance(Duration::minutes(self.config.step_minutes));

        let report = self.manager.advance(id).await?;
        self.schedule_month_templates(id).await?;
        Ok(report)
    }

    /// Advance until the tournament finishes or the cycle budget runs out.
    ///
    /// Recoverable errors are logged and the next cycle retries. An invariant
    /// violation has already halted its match, so the run goes on. Anything
    /// else ends the run.
    pub async fn run(&mut self, id: TournamentId) -> TournamentResult<RunSummary> {
        let format = self.format.kind().to_string();
        let mut cycles = 0;
        let mut ticker = (!self.config.interval.is_zero())
            .then(|| tokio::time::interval(self.config.interval));

        while cycles < self.config.max_cycles && !self.manager.is_finished(id).await? {
            cycles += 1;
            let started = Instant::now();
            match self.step(id).await {
                Ok(report) => {
                    logging::log_cycle(cycles, &report);
                    metrics::record_report(&report);
                }
                Err(e) if e.is_recoverable() || e.class() == ErrorClass::InvariantViolation => {
                    logging::log_advance_failure(cycles, id, &e);
                    metrics::advance_errors_total(&format!("{:?}", e.class()));
                }
                Err(e) => {
                    logging::log_advance_failure(cycles, id, &e);
                    metrics::advance_errors_total(&format!("{:?}", e.class()));
                    return Err(e);
                }
            }
            metrics::cycles_total(&format);
            metrics::cycle_duration_ms(&format, started.elapsed().as_secs_f64() * 1000.0);
            metrics::open_games(self.host.open_games().len());

            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }
        }

        let finished = self.manager.is_finished(id).await?;
        let standings = self.manager.get_standings(id).await?;
        if finished {
            logging::log_tournament_finished(id, cycles, &standings);
            metrics::tournaments_finished_total(&format);
        } else {
            log::info!("Tournament {id} still running after {cycles} cycle(s)");
            logging::log_standings(&standings);
        }

        Ok(RunSummary {
            tournament_id: id,
            cycles,
            finished,
            standings,
        })
    }
}
