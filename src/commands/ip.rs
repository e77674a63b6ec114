//! IP commands: myip, stringify.
//!
//! Output is one line of shell-substitutable text; the joined list feeds
//! templated configuration for clustered software that needs its peer
//! addresses up front.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::metadata::{MetadataClient, READY_BUDGET};

/// Print container IP information.
#[derive(Debug, Args)]
pub struct IpCommand {
    #[command(subcommand)]
    command: IpSubcommand,
}

#[derive(Debug, Subcommand)]
enum IpSubcommand {
    /// Print this container's primary IP.
    Myip,

    /// Print a joined list of the IPs of a service's containers.
    Stringify {
        /// Service to list, as STACK/SERVICE (defaults to this
        /// container's own service).
        target: Option<String>,

        /// Delimiter between entries.
        #[arg(long, default_value = ",")]
        delimiter: String,

        /// Prepend each entry with this value.
        #[arg(long, default_value = "")]
        prefix: String,

        /// Append this value to each entry.
        #[arg(long, default_value = "")]
        suffix: String,

        /// Print host agent IPs instead of container IPs.
        #[arg(long)]
        use_agent_ips: bool,

        /// Print host names instead of container IPs.
        #[arg(long)]
        use_agent_names: bool,
    },
}

impl IpCommand {
    pub async fn run(self, config: &Config) -> Result<()> {
        let client = MetadataClient::connect(config, READY_BUDGET).await?;

        match self.command {
            IpSubcommand::Myip => {
                let member = client.get_self_member().await?;
                println!("{}", member.primary_ip);
                Ok(())
            }

            IpSubcommand::Stringify {
                target,
                delimiter,
                prefix,
                suffix,
                use_agent_ips,
                use_agent_names,
            } => {
                let (stack, service) = match target {
                    Some(target) => parse_target(&target)?,
                    None => {
                        let member = client.get_self_member().await?;
                        (member.stack_name, member.service_name)
                    }
                };

                let members = client.get_service_members(&stack, &service).await?;
                let mut entries = Vec::with_capacity(members.len());
                for member in &members {
                    let entry = if use_agent_names {
                        client.get_host(&member.host_uuid).await?.name
                    } else if use_agent_ips {
                        client.get_host(&member.host_uuid).await?.agent_ip
                    } else {
                        member.primary_ip.clone()
                    };
                    entries.push(entry);
                }

                println!("{}", join_entries(&prefix, &suffix, &delimiter, &entries));
                Ok(())
            }
        }
    }
}

fn parse_target(target: &str) -> Result<(String, String)> {
    match target.split_once('/') {
        Some((stack, service)) if !stack.is_empty() && !service.is_empty() => {
            Ok((stack.to_string(), service.to_string()))
        }
        _ => bail!("service must be given as STACK/SERVICE, got '{}'", target),
    }
}

fn join_entries(prefix: &str, suffix: &str, delimiter: &str, entries: &[String]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}{}{}", prefix, entry, suffix))
        .collect::<Vec<_>>()
        .join(delimiter)
}
