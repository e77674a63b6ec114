//! Client for the membership/metadata service.
//!
//! The metadata service is an HTTP JSON API that knows, for every
//! container in the deployment, its identity, creation index, network
//! address, and group (service/stack) membership. It also exposes a
//! monotonically increasing version that can be long-polled to observe
//! membership changes.
//!
//! Every endpoint failure maps to [`Error::SourceUnavailable`] except the
//! explicit self-absence case, which maps to [`Error::SelfNotFound`].

use std::time::Duration;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// How long `connect` waits for the metadata service to answer at all.
pub const READY_BUDGET: Duration = Duration::from_secs(60);

/// One member of a replicated service group.
///
/// Immutable once fetched; observing changes requires a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Unique identity assigned by the metadata service.
    pub uuid: String,
    pub name: String,
    /// Creation sequence number, assigned monotonically at join time and
    /// never reused. Used purely for ordering.
    pub create_index: i64,
    /// Primary network address of the container.
    pub primary_ip: String,
    pub service_name: String,
    pub stack_name: String,
    #[serde(default)]
    pub host_uuid: String,
}

/// The calling container's service, as the metadata service sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Desired number of containers.
    pub scale: i64,
    /// Names of the containers currently part of the service.
    #[serde(default)]
    pub containers: Vec<String>,
}

/// A host running one or more members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub agent_ip: String,
}

/// Metadata service API client.
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    /// Create a client for the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.metadata_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client and wait until the metadata service answers.
    ///
    /// Containers can start before their metadata entry is published, so
    /// commands gate on readiness before doing anything else. Fails with
    /// `SourceUnavailable` once the budget is exhausted.
    pub async fn connect(config: &Config, budget: Duration) -> Result<Self> {
        let client = Self::new(config)?;
        let deadline = Instant::now() + budget;

        loop {
            match client.version().await {
                Ok(version) => {
                    debug!(version = %version, "metadata service ready");
                    return Ok(client);
                }
                Err(e) if Instant::now() >= deadline => {
                    return Err(Error::SourceUnavailable(format!(
                        "not ready after {}s: {}",
                        budget.as_secs(),
                        e
                    )));
                }
                Err(e) => {
                    debug!(error = %e, "metadata service not ready, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Fetch the calling container's own record.
    pub async fn get_self_member(&self) -> Result<Member> {
        let url = format!("{}/self/container", self.base_url);
        debug!(url = %url, "fetching self container");

        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::SelfNotFound);
        }
        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Fetch all containers of a service, in the order the metadata
    /// service reports them.
    pub async fn get_service_members(&self, stack: &str, service: &str) -> Result<Vec<Member>> {
        self.get_json(&format!(
            "/stacks/{}/services/{}/containers",
            stack, service
        ))
        .await
    }

    /// Fetch the calling container's service.
    pub async fn get_self_service(&self) -> Result<Service> {
        self.get_json("/self/service").await
    }

    /// Fetch a host by its identifier.
    pub async fn get_host(&self, host_uuid: &str) -> Result<Host> {
        self.get_json(&format!("/hosts/{}", host_uuid)).await
    }

    /// Fetch the current metadata version token.
    pub async fn version(&self) -> Result<String> {
        self.get_json("/version").await
    }

    /// Long-poll for a version different from `since`.
    ///
    /// The service holds the request open up to `max_wait` and then
    /// answers with the current version, so a returned token equal to
    /// `since` simply means nothing changed; callers loop. Delivery is
    /// at-least-once.
    pub async fn wait_for_change(&self, since: &str, max_wait: Duration) -> Result<String> {
        let url = format!("{}/version", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("wait", "true"),
                ("value", since),
                ("maxWait", &max_wait.as_secs().to_string()),
            ])
            .timeout(max_wait + Duration::from_secs(5))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Wait for the calling container's service to reach its configured
    /// scale, polling once per `poll_interval`.
    ///
    /// No partial credit: once the budget is exceeded the wait fails with
    /// `Timeout` even if the service is one container short.
    pub async fn wait_for_service_scale(
        &self,
        budget: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + budget;

        loop {
            let service = self.get_self_service().await?;
            let current = service.containers.len() as i64;
            if current >= service.scale {
                debug!(service = %service.name, scale = service.scale, "service at scale");
                return Ok(());
            }

            if Instant::now() >= deadline {
                warn!(
                    service = %service.name,
                    current,
                    desired = service.scale,
                    "gave up waiting for scale"
                );
                return Err(Error::Timeout(format!(
                    "service {} to reach scale {}",
                    service.name, service.scale
                )));
            }

            debug!(service = %service.name, current, desired = service.scale, "waiting for scale");
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "metadata request");

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
