//! Transport adapters: TCP sockets and an in-process hub.

pub mod framing;
pub mod memory;
pub mod tcp;

pub use framing::MAX_FRAME_LEN;
pub use memory::{MemoryHub, MemoryPublisher, MemorySubscriber};
pub use tcp::{TcpPublisher, TcpSubscriber, HIGH_WATER_MARK};
