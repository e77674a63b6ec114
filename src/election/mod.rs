//! Deterministic leader election over externally supplied membership.

mod exec;
mod resolver;
mod watcher;

pub use exec::take_over_process;
pub use resolver::{resolve_leader, resolve_leader_of, Leadership};
pub use watcher::{current_leadership, Watcher};
