//! Live replication of write commands from one key-value store to another.
//!
//! The source store's `MONITOR` feed is read line by line, every command
//! flagged `write` in the source's command catalog is replayed against the
//! target once the target reports itself as master.

pub mod classifier;
pub mod client;
pub mod command;
pub mod connection;
mod error;
pub mod feed;
pub mod frame;
pub mod gate;
pub mod pipeline;
pub mod replicator;
pub mod stats;

pub use classifier::WriteCommands;
pub use client::{Destination, RespClient};
pub use command::{parse_command, ParsedCommand};
pub use error::TapError;
pub use frame::Frame;
pub use gate::{Readiness, ReadinessGate};
pub use pipeline::Pipeline;
pub use replicator::{Replicator, ReplicatorConfig};
pub use stats::{CommandStats, StatsReport};

pub type Result<T> = std::result::Result<T, TapError>;

/// Number of concurrent forwarding workers.
pub const DEFAULT_WORKERS: usize = 50;
