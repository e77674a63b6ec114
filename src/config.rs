//! Runtime configuration.
//!
//! The configuration is built once at the entry point and threaded
//! explicitly into every component that talks to the outside world. The
//! library deliberately carries no ambient default metadata URL; the only
//! default lives on the CLI flag.

/// Sidecar configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the membership/metadata service.
    pub metadata_url: String,
}

impl Config {
    pub fn new(metadata_url: impl Into<String>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
        }
    }
}
