//! wrangle - leader election and TCP forwarding sidecar for replicated
//! service groups.
//!
//! Leadership is a pure function of membership data published by an
//! external metadata service: the group member with the lowest creation
//! index is the leader. Non-leaders keep a local TCP port forwarded to
//! the leader's address and repoint themselves when leadership moves;
//! the member that becomes leader can replace its own process image with
//! the real service command.
//!
//! Data flow:
//!
//! ```text
//! metadata service -> resolver (pure) -> watcher -> forwarder -> broker
//! ```

pub mod commands;
pub mod config;
pub mod election;
pub mod error;
pub mod metadata;
pub mod proxy;

pub use config::Config;
pub use election::{current_leadership, resolve_leader, resolve_leader_of, Leadership, Watcher};
pub use error::{Error, Result};
pub use metadata::{Host, Member, MetadataClient, Service};
pub use proxy::{Forwarder, ForwarderHandle};
