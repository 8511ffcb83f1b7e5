//! Simulated tournament runner.
//!
//! Creates a tournament on an in-memory store, fills it with one-player
//! teams and advances it against a simulated match host until it finishes.

use anyhow::Error;
use clot_runner::logging::{self, LogStyle};
use clot_runner::{Overrides, RunnerConfig, Simulation, metrics};
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Play a simulated tournament through the clot engine

USAGE:
  clot_runner [OPTIONS]

OPTIONS:
  --format       KIND      swiss, bracket, round-robin, group-stage, monthly, ladder  [default: env CLOT_RUNNER_FORMAT or swiss]
  --teams        N         Teams to register                                          [default: 8]
  --cycles       N         Maximum advance cycles                                     [default: 200]
  --interval-ms  MS        Real time between cycles                                   [default: 0]
  --seed         N         Seed for pairings and simulated results                    [default: random]
  --metrics-addr IP:PORT   Serve Prometheus metrics on this address
  --log-style    STYLE     plain or structured                                        [default: plain]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  CLOT_RUNNER_*            Runner defaults (FORMAT, TEAMS, MAX_CYCLES, INTERVAL_MS,
                           STEP_MINUTES, TEMPLATE, SEED, METRICS_ADDR)
  CLOT_*                   Engine defaults (K_FACTOR, INITIAL_RATING, GROUP_SIZE, ...)
  RUST_LOG                 Log filter
";

struct Args {
    overrides: Overrides,
    log_style: LogStyle,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        overrides: Overrides {
            format: pargs.opt_value_from_str("--format")?,
            teams: pargs.opt_value_from_str("--teams")?,
            max_cycles: pargs.opt_value_from_str("--cycles")?,
            interval_ms: pargs.opt_value_from_str("--interval-ms")?,
            seed: pargs.opt_value_from_str("--seed")?,
            metrics_addr: pargs.opt_value_from_str("--metrics-addr")?,
        },
        log_style: pargs
            .opt_value_from_str("--log-style")?
            .unwrap_or_default(),
    };

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init(args.log_style);

    let config = RunnerConfig::from_env(args.overrides)?;
    config.validate()?;
    info!(
        "Simulating a {} tournament with {} teams",
        config.format, config.teams
    );

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Serving metrics at http://{addr}/metrics");
    }

    let mut simulation = Simulation::new(config);
    let id = simulation
        .setup()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to set up tournament: {}", e))?;

    let summary = simulation.run(id).await?;
    if summary.finished {
        if let Some(winner) = summary.standings.first() {
            info!("Winner: {} after {} cycle(s)", winner.name, summary.cycles);
        }
    } else {
        info!("Stopped after {} cycle(s)", summary.cycles);
    }

    Ok(())
}
