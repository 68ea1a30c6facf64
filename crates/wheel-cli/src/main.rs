//! Wheel command-line driver
//!
//! Runs the built-in quadratic tracking model with a progressive hedging hub
//! and optional Lagrangian and xhat spokes.
//!
//! Usage: `wheel --num-scens 10 [--bundle-size 2] [--rel-gap 1e-6] [--summary out.json]`

mod demo;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use wheel_protocols::{SpokeKind, SpokeSpec, WheelConfig, WheelSpinner};

use crate::demo::{LagrangianBound, ProgressiveHedging, XhatEvaluator, SOLVER_NAME};
use crate::error::{CliError, Result};

#[derive(Parser, Debug)]
#[command(name = "wheel")]
#[command(about = "Run a hub-and-spoke scenario decomposition on the demo model")]
struct Args {
    /// Number of scenarios
    #[arg(long = "num-scens", default_value = "10")]
    num_scens: usize,

    /// Scenarios per subproblem bundle (must divide the scenario count)
    #[arg(long)]
    bundle_size: Option<usize>,

    /// Seed for the generated scenario targets
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Subproblem solver
    #[arg(long, default_value = SOLVER_NAME)]
    solver_name: String,

    /// Hub iteration budget
    #[arg(long, default_value = "100")]
    max_iterations: u64,

    /// Relative gap tolerance
    #[arg(long, default_value = "1e-4")]
    rel_gap: f64,

    /// Absolute gap tolerance
    #[arg(long)]
    abs_gap: Option<f64>,

    /// Progressive hedging penalty
    #[arg(long, default_value = "1.0")]
    rho: f64,

    /// Do not run the Lagrangian bound spoke
    #[arg(long)]
    no_lagrangian: bool,

    /// Let the Lagrangian spoke take subgradient steps between iterates
    #[arg(long)]
    subgradient_while_waiting: bool,

    /// Do not run the xhat spoke
    #[arg(long)]
    no_xhat: bool,

    /// How long the hub waits for spokes to start (milliseconds)
    #[arg(long, default_value = "10000")]
    startup_timeout_ms: u64,

    /// How long the hub waits for spokes to stop (milliseconds)
    #[arg(long, default_value = "5000")]
    shutdown_timeout_ms: u64,

    /// Write the run summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Start from a saved iterate
    #[arg(long)]
    checkpoint_in: Option<PathBuf>,

    /// Save the final iterate
    #[arg(long)]
    checkpoint_out: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> WheelConfig {
        let mut config = WheelConfig::default()
            .with_max_iterations(self.max_iterations)
            .with_rel_gap(self.rel_gap)
            .with_startup_timeout(Duration::from_millis(self.startup_timeout_ms))
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms));
        if let Some(abs_gap) = self.abs_gap {
            config = config.with_abs_gap(abs_gap);
        }
        if let Some(path) = &self.checkpoint_in {
            config = config.with_checkpoint_in(path);
        }
        if let Some(path) = &self.checkpoint_out {
            config = config.with_checkpoint_out(path);
        }
        config
    }

    fn spokes(&self) -> Vec<SpokeSpec> {
        let mut spokes = Vec::new();
        if !self.no_lagrangian {
            let lagrangian = LagrangianBound::default()
                .with_subgradient_while_waiting(self.subgradient_while_waiting);
            spokes.push(SpokeSpec::new("lagrangian", SpokeKind::BoundImprover, lagrangian));
        }
        if !self.no_xhat {
            spokes.push(SpokeSpec::new("xhat", SpokeKind::Heuristic, XhatEvaluator));
        }
        spokes
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    wheel_logging::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if args.solver_name != SOLVER_NAME {
        return Err(CliError::UnknownSolver(args.solver_name));
    }
    if !(args.rho > 0.0) {
        return Err(CliError::InvalidArgument(format!("rho must be positive, got {}", args.rho)));
    }

    let scenarios = Arc::new(demo::scenario_set(args.num_scens, args.seed)?);
    let hub = ProgressiveHedging::new(args.rho, &scenarios, args.bundle_size)?;
    info!(
        scenarios = scenarios.len(),
        bundle_size = ?args.bundle_size,
        seed = args.seed,
        "Loaded demo model"
    );

    let spinner = WheelSpinner::new(scenarios, args.config(), hub, args.spokes())?;

    let cancel = spinner.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling run");
            cancel.cancel();
        }
    });

    let outcome = tokio::task::spawn_blocking(move || spinner.spin()).await;
    interrupt.abort();
    let result = outcome??;

    if let Some(reason) = result.termination {
        info!(
            "Terminated ({reason}) after {} iterations: upper {:.6}, lower {:.6}, rel gap {:.3e}",
            result.iterations, result.upper_bound, result.lower_bound, result.relative_gap
        );
    }
    let unresponsive = result.unresponsive();
    if !unresponsive.is_empty() {
        warn!(?unresponsive, "Some spokes did not confirm shutdown");
    }

    if let Some(path) = &args.summary {
        result.write_json(path)?;
        info!("Wrote summary to {}", path.display());
    }
    Ok(())
}
