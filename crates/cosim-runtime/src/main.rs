//! # CoSim
//!
//! ```text
//! cosim run --config bridge.toml --tstop 1000 --cells 4
//! cosim listen --port 5557 --kind samples
//! cosim send --port 5559 --group 1 --value 0.02
//! ```
//!
//! Logging follows `COSIM_LOG_LEVEL` (or `RUST_LOG`); set
//! `COSIM_JSON_LOGS=true` for JSON lines on stderr.

use anyhow::Result;
use clap::Parser;
use tracing::error;

use cosim_runtime::cli::{Cli, Command};
use cosim_runtime::commands;
use cosim_telemetry::{init_telemetry, TelemetryConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(TelemetryConfig::from_env())?;

    let result = match &cli.command {
        Command::Run(args) => commands::run::execute(args),
        Command::Send(args) => commands::send::execute(args),
        Command::Listen(args) => commands::listen::execute(args),
    };
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
