//! Leader commands: check, elect, forward, get.

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::election::{current_leadership, Watcher};
use crate::metadata::{MetadataClient, READY_BUDGET};

/// Deterministically elect, route traffic to, and inspect the leader of a
/// service.
#[derive(Debug, Args)]
pub struct LeaderCommand {
    #[command(subcommand)]
    command: LeaderSubcommand,
}

#[derive(Debug, Subcommand)]
enum LeaderSubcommand {
    /// Exit 0 if this container is the leader, 1 otherwise.
    Check {
        /// Check leadership of another service in the stack.
        #[arg(long)]
        service: Option<String>,
    },

    /// Forward a port to the leader; exec a command on becoming leader.
    Elect {
        /// Port to proxy to the leader.
        #[arg(long = "proxy-tcp-port")]
        proxy_tcp_port: u16,

        /// Command to exec once this container is the leader.
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Forward a local port to the leader without ever taking over.
    Forward {
        /// Local source port to listen on.
        #[arg(long = "src-port")]
        src_port: u16,

        /// Destination port on the leader (defaults to the source port).
        #[arg(long = "dst-port")]
        dst_port: Option<u16>,
    },

    /// Print the leader's primary IP, or one of its host attributes.
    Get {
        /// Attribute to print instead of the primary IP: host | agent_ip.
        attribute: Option<String>,
    },
}

impl LeaderCommand {
    pub async fn run(self, config: &Config) -> Result<()> {
        let client = MetadataClient::connect(config, READY_BUDGET).await?;

        match self.command {
            LeaderSubcommand::Check { service } => {
                let leadership = current_leadership(&client, service.as_deref()).await?;
                info!(
                    leader = %leadership.leader.name,
                    is_self = leadership.is_self,
                    "leadership checked"
                );
                std::process::exit(if leadership.is_self { 0 } else { 1 });
            }

            LeaderSubcommand::Elect {
                proxy_tcp_port,
                command,
            } => {
                let watcher = Watcher::elect(client, proxy_tcp_port, command);
                watcher.run().await?;
                Ok(())
            }

            LeaderSubcommand::Forward { src_port, dst_port } => {
                let watcher = Watcher::forward(client, src_port, dst_port.unwrap_or(src_port));
                watcher.run().await?;
                Ok(())
            }

            LeaderSubcommand::Get { attribute } => {
                let leadership = current_leadership(&client, None).await?;

                match attribute.as_deref() {
                    None => println!("{}", leadership.leader.primary_ip),
                    Some("host") => {
                        let host = client.get_host(&leadership.leader.host_uuid).await?;
                        println!("{}", host.name);
                    }
                    Some("agent_ip") => {
                        let host = client.get_host(&leadership.leader.host_uuid).await?;
                        println!("{}", host.agent_ip);
                    }
                    Some(other) => {
                        anyhow::bail!(
                            "unrecognized attribute '{}': expected host or agent_ip",
                            other
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
