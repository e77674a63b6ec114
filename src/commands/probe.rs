//! Endpoint probe command.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use reqwest::Url;
use tokio::net::TcpStream;
use tracing::warn;

/// Probe a TCP/HTTP(S) endpoint to determine if it is healthy.
#[derive(Debug, Args)]
pub struct ProbeCommand {
    /// Endpoint to probe (tcp://host:port or http(s)://...).
    endpoint: String,

    /// Connection timeout in seconds.
    #[arg(long, short = 't', default_value_t = 5)]
    timeout: u64,

    /// Keep probing until the endpoint is healthy.
    #[arg(long = "loop")]
    until_healthy: bool,

    /// Rate at which to back off between retries, must be >= 1.
    #[arg(long, short = 'b', default_value_t = 1.0)]
    backoff: f64,

    /// Minimum seconds to wait before retrying.
    #[arg(long, short = 'm', default_value_t = 1)]
    min: u64,

    /// Maximum seconds to wait before retrying.
    #[arg(long, short = 'x', default_value_t = 120)]
    max: u64,
}

impl ProbeCommand {
    pub async fn run(self) -> Result<()> {
        let timeout = Duration::from_secs(self.timeout);

        if self.until_healthy {
            let min = Duration::from_secs(self.min);
            let max = Duration::from_secs(self.max).max(min);
            let mut attempts = 0u32;

            while let Err(e) = probe_once(&self.endpoint, timeout).await {
                warn!(endpoint = %self.endpoint, error = %e, "probe failed; retrying");
                attempts += 1;

                let factor = self.backoff.powi(attempts as i32).clamp(1.0, 86_400.0);
                let delay = min.mul_f64(factor).clamp(min, max);
                tokio::time::sleep(delay).await;
            }
        } else {
            probe_once(&self.endpoint, timeout).await?;
        }

        println!("OK");
        Ok(())
    }
}

async fn probe_once(endpoint: &str, timeout: Duration) -> Result<()> {
    let url = Url::parse(endpoint).context("invalid endpoint URL")?;

    match url.scheme() {
        "tcp" => {
            let host = url.host_str().context("tcp endpoint is missing a host")?;
            let port = url.port().context("tcp endpoint is missing a port")?;

            tokio::time::timeout(timeout, TcpStream::connect((host, port)))
                .await
                .with_context(|| format!("timed out connecting to {}:{}", host, port))??;
            Ok(())
        }
        "http" | "https" => {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            let response = client.get(url).send().await?;

            if response.status().is_success() {
                Ok(())
            } else {
                bail!("HTTP {}", response.status().as_u16());
            }
        }
        scheme => bail!("unsupported URL scheme: {}", scheme),
    }
}
