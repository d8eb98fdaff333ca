//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// CoSim: real-time co-simulation bridge driver
#[derive(Parser, Debug)]
#[command(name = "cosim")]
#[command(about = "Run a paced simulation with live pub/sub ports, or act as the other end")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Integrate the demo network with the ports described in a TOML file
    Run(RunArgs),
    /// Publish control messages for a bridge input port
    Send(SendArgs),
    /// Subscribe to a bridge output port and print each message as JSON
    Listen(ListenArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Bridge configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Stop time in simulation time units
    #[arg(long, default_value = "100")]
    pub tstop: f64,

    /// Integrator step
    #[arg(long, default_value = "0.025")]
    pub dt: f64,

    /// Number of cells in the demo network
    #[arg(long, default_value = "1")]
    pub cells: usize,

    /// Seed for the spike generators
    #[arg(long, default_value = "1")]
    pub seed: u64,
}

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Port to publish on
    #[arg(short, long, default_value = "5559")]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Target group id
    #[arg(short, long, default_value = "1")]
    pub group: u32,

    /// Value written to every variable in the group
    #[arg(short, long, default_value = "2", allow_hyphen_values = true)]
    pub value: f64,

    /// Delay between messages in milliseconds
    #[arg(short, long, default_value = "10")]
    pub interval_ms: u64,

    /// Stop after this many messages (default: until interrupted)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Send the 8-byte integer-pair form instead of two doubles
    #[arg(long)]
    pub int_pair: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// 24-byte sample records
    Samples,
    /// 8-byte event records
    Events,
}

#[derive(Parser, Debug)]
pub struct ListenArgs {
    /// Port to connect to
    #[arg(short, long, default_value = "5557")]
    pub port: u16,

    /// Publisher host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Record layout to decode
    #[arg(short, long, value_enum, default_value = "samples")]
    pub kind: StreamKind,

    /// Acknowledge the publisher right after connecting
    #[arg(long)]
    pub ack: bool,

    /// Exit after this many records (default: until interrupted)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Give up connecting after this many milliseconds
    #[arg(long, default_value = "5000")]
    pub connect_timeout_ms: u64,
}
