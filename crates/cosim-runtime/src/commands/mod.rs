//! Subcommand implementations.

pub mod listen;
pub mod run;
pub mod send;

use cosim_bridge::StopSignal;
use tracing::info;

/// Raise `stop` on Ctrl-C.
pub fn install_interrupt(stop: &StopSignal) -> anyhow::Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping");
        stop.stop();
    })?;
    Ok(())
}
