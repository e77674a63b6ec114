//! CLI commands.

mod health;
mod ip;
mod leader;
mod probe;
mod service;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;

/// wrangle - leader election and TCP forwarding for replicated services.
#[derive(Debug, Parser)]
#[command(name = "wrangle")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the metadata service.
    #[arg(
        long,
        global = true,
        env = "WRANGLE_METADATA_URL",
        default_value = "http://metadata.internal/v1"
    )]
    metadata_url: String,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "WRANGLE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Elect, route traffic to, and inspect the leader of a service.
    Leader(leader::LeaderCommand),

    /// Print container IP information.
    Ip(ip::IpCommand),

    /// Inspect and wait on the calling container's service.
    Service(service::ServiceCommand),

    /// Probe a TCP/HTTP(S) endpoint for liveness.
    Probe(probe::ProbeCommand),

    /// Serve a simple HTTP health check endpoint.
    Health(health::HealthCommand),
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub async fn run(self) -> Result<()> {
        let config = Config::new(self.metadata_url);

        match self.command {
            Commands::Leader(cmd) => cmd.run(&config).await,
            Commands::Ip(cmd) => cmd.run(&config).await,
            Commands::Service(cmd) => cmd.run(&config).await,
            Commands::Probe(cmd) => cmd.run().await,
            Commands::Health(cmd) => cmd.run().await,
        }
    }
}
