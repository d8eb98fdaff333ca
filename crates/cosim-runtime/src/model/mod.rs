//! Demo model driven by `cosim run`.

mod network;

pub use network::{CellParams, DemoNetwork};
