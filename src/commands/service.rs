//! Service commands: scale, containers, wait.

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::metadata::{MetadataClient, READY_BUDGET};

/// Inspect and wait on the calling container's service.
#[derive(Debug, Args)]
pub struct ServiceCommand {
    #[command(subcommand)]
    command: ServiceSubcommand,
}

#[derive(Debug, Subcommand)]
enum ServiceSubcommand {
    /// Print the configured scale of this service.
    Scale {
        /// Print the current number of running containers instead.
        #[arg(long)]
        current: bool,
    },

    /// List the containers of this service, one per line.
    Containers {
        /// Delimiter between entries.
        #[arg(long, default_value = "\n")]
        delimiter: String,

        /// Leave the calling container out of the list.
        #[arg(long)]
        exclude_self: bool,
    },

    /// Wait for service states.
    Wait {
        #[command(subcommand)]
        command: WaitSubcommand,
    },
}

#[derive(Debug, Subcommand)]
enum WaitSubcommand {
    /// Wait for the running container count to reach the configured scale.
    Scale {
        /// Seconds to wait before giving up.
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
}

impl ServiceCommand {
    pub async fn run(self, config: &Config) -> Result<()> {
        let client = MetadataClient::connect(config, READY_BUDGET).await?;

        match self.command {
            ServiceSubcommand::Scale { current } => {
                let service = client.get_self_service().await?;
                if current {
                    println!("{}", service.containers.len());
                } else {
                    println!("{}", service.scale);
                }
                Ok(())
            }

            ServiceSubcommand::Containers {
                delimiter,
                exclude_self,
            } => {
                let service = client.get_self_service().await?;
                let mut containers = service.containers;

                if exclude_self {
                    let self_member = client.get_self_member().await?;
                    containers.retain(|name| *name != self_member.name);
                }

                println!("{}", containers.join(&delimiter));
                Ok(())
            }

            ServiceSubcommand::Wait {
                command: WaitSubcommand::Scale { timeout },
            } => {
                client
                    .wait_for_service_scale(Duration::from_secs(timeout), Duration::from_secs(1))
                    .await?;
                Ok(())
            }
        }
    }
}
