//! TCP forwarding proxy.
//!
//! ```text
//! Client -> Forwarder (accept) -> destination cell -> leader
//!                |
//!        per-connection broker pair (one pump per direction)
//! ```

mod broker;
mod forwarder;

pub use broker::{pump, PumpEnd};
pub use forwarder::{Forwarder, ForwarderHandle};
