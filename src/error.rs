//! Error taxonomy for the sidecar.
//!
//! Propagation policy:
//! - Startup and configuration errors are fatal: the watcher halts and the
//!   process exits non-zero.
//! - Steady-state refresh errors are logged and the last-known leader
//!   belief is retained.
//! - Per-connection errors never cross the connection boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The metadata service could not be reached or answered with an
    /// unexpected status.
    #[error("metadata service unavailable: {0}")]
    SourceUnavailable(String),

    /// The calling container could not be found by the metadata service.
    #[error("calling container not found in metadata")]
    SelfNotFound,

    /// The forwarding listener could not bind its port. Fatal; rebinding
    /// only happens as part of an explicit reset, never as error recovery.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// No leader address is currently known. Scoped to a single accepted
    /// connection; the listener and other connections are unaffected.
    #[error("forwarding destination unknown")]
    DestinationUnknown,

    /// A wait-style operation exceeded its budget.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::SourceUnavailable(err.to_string())
    }
}
