//! Watcher orchestration.
//!
//! The watcher ties the pieces together: it resolves the initial leader,
//! subscribes to membership changes, and reacts to leadership changes by
//! repointing the forwarder or, in elect mode, by handing the process
//! over to the configured command once this container becomes leader.
//!
//! The initial resolve is fatal on error: an unreachable metadata service
//! at startup is an operator problem, not a transient condition. Once
//! running, re-resolve failures are logged and the previous leader belief
//! is retained; stale-but-available beats fail-fast here.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::{error, info, warn};

use super::exec::take_over_process;
use super::resolver::{resolve_leader, resolve_leader_of, Leadership};
use crate::error::{Error, Result};
use crate::metadata::MetadataClient;
use crate::proxy::{Forwarder, ForwarderHandle};

/// Resolve the current leadership for the calling container.
///
/// With `service` set, the leader of that service (in the caller's stack)
/// is resolved instead of the caller's own; the caller may or may not be
/// part of it. Each call reads a fresh snapshot.
pub async fn current_leadership(
    client: &MetadataClient,
    service: Option<&str>,
) -> Result<Leadership> {
    let self_member = client.get_self_member().await?;

    match service {
        None => {
            let members = client
                .get_service_members(&self_member.stack_name, &self_member.service_name)
                .await?;
            Ok(resolve_leader(&self_member, &members))
        }
        Some(service) => {
            let members = client
                .get_service_members(&self_member.stack_name, service)
                .await?;
            let leader = resolve_leader_of(&members).ok_or_else(|| {
                Error::SourceUnavailable(format!("no containers found for service {}", service))
            })?;
            Ok(Leadership {
                is_self: leader.uuid == self_member.uuid,
                leader: leader.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Forward until this container becomes leader, then take over.
    Elect,
    /// Forward forever; never take over.
    Forward,
}

/// Orchestrates leader resolution, the change subscription, and the
/// forwarding proxy.
pub struct Watcher {
    client: MetadataClient,
    mode: Mode,
    src_port: u16,
    dst_port: u16,
    command: Vec<String>,
    poll_interval: Duration,
    long_poll_max: Duration,
    destination: Arc<ArcSwapOption<SocketAddr>>,
}

impl Watcher {
    /// Election mode: forward `port` to the leader's same port, and exec
    /// `command` if this container becomes (or already is) the leader.
    pub fn elect(client: MetadataClient, port: u16, command: Vec<String>) -> Self {
        Self::new(client, Mode::Elect, port, port, command)
    }

    /// Pure forwarding mode: forward `src_port` to the leader's
    /// `dst_port`, never taking over.
    pub fn forward(client: MetadataClient, src_port: u16, dst_port: u16) -> Self {
        Self::new(client, Mode::Forward, src_port, dst_port, Vec::new())
    }

    fn new(
        client: MetadataClient,
        mode: Mode,
        src_port: u16,
        dst_port: u16,
        command: Vec<String>,
    ) -> Self {
        Self {
            client,
            mode,
            src_port,
            dst_port,
            command,
            poll_interval: Duration::from_secs(1),
            long_poll_max: Duration::from_secs(30),
            destination: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Override the pause between change polls (mainly for tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override how long one change long-poll is held open.
    pub fn with_long_poll_max(mut self, max: Duration) -> Self {
        self.long_poll_max = max;
        self
    }

    /// Run until the process is replaced or a fatal error occurs.
    pub async fn run(self) -> Result<()> {
        let leadership = current_leadership(&self.client, None).await?;
        info!(
            leader = %leadership.leader.name,
            leader_ip = %leadership.leader.primary_ip,
            is_self = leadership.is_self,
            "initial leader resolved"
        );

        if self.mode == Mode::Elect && leadership.is_self {
            return self.assume_leadership().await;
        }

        self.destination.store(
            destination_for(&leadership, self.src_port, self.dst_port).map(Arc::new),
        );

        let (forwarder, handle) =
            Forwarder::bind(self.src_port, Arc::clone(&self.destination)).await?;
        let became_leader = Arc::new(AtomicBool::new(false));

        let subscription = Subscription {
            client: self.client.clone(),
            mode: self.mode,
            src_port: self.src_port,
            dst_port: self.dst_port,
            destination: Arc::clone(&self.destination),
            handle,
            became_leader: Arc::clone(&became_leader),
            poll_interval: self.poll_interval,
            long_poll_max: self.long_poll_max,
        };
        tokio::spawn(subscription.run());

        forwarder.run().await?;

        if became_leader.load(Ordering::Relaxed) {
            // The subscription loop stopped the forwarder because we won.
            self.assume_leadership().await
        } else {
            Ok(())
        }
    }

    async fn assume_leadership(self) -> Result<()> {
        if self.command.is_empty() {
            info!("leader with no command configured; staying passive");
            std::future::pending::<()>().await;
            return Ok(());
        }

        info!(command = ?self.command, "taking over process");
        let never = take_over_process(&self.command)?;
        match never {}
    }
}

/// Compute the forwarding destination for a resolved leader.
///
/// `None` when the leader has no usable address, and also when forwarding
/// the same port back to ourselves would loop traffic.
fn destination_for(leadership: &Leadership, src_port: u16, dst_port: u16) -> Option<SocketAddr> {
    if leadership.is_self && src_port == dst_port {
        return None;
    }

    leadership
        .leader
        .primary_ip
        .parse()
        .ok()
        .map(|ip| SocketAddr::new(ip, dst_port))
}

/// The change-subscription loop.
///
/// Long-polls the metadata version; every delivered token triggers one
/// re-resolve. Tokens are observed in delivery order and the cached
/// belief is last-resolve-wins.
struct Subscription {
    client: MetadataClient,
    mode: Mode,
    src_port: u16,
    dst_port: u16,
    destination: Arc<ArcSwapOption<SocketAddr>>,
    handle: ForwarderHandle,
    became_leader: Arc<AtomicBool>,
    poll_interval: Duration,
    long_poll_max: Duration,
}

impl Subscription {
    async fn run(self) {
        let mut version = String::from("0");

        loop {
            let next = match self.client.wait_for_change(&version, self.long_poll_max).await {
                Ok(token) => token,
                Err(e) => {
                    warn!(error = %e, "change subscription failed; retrying");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            if next == version {
                // Long poll elapsed with no change. The pause keeps us
                // from spinning against a service that answers instantly.
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            version = next;

            let leadership = match current_leadership(&self.client, None).await {
                Ok(leadership) => leadership,
                Err(e) => {
                    error!(error = %e, "failed to re-resolve leader; keeping previous belief");
                    continue;
                }
            };

            if self.mode == Mode::Elect && leadership.is_self {
                info!("became leader; stopping forwarder");
                self.became_leader.store(true, Ordering::Relaxed);
                self.handle.close();
                return;
            }

            let next_destination = destination_for(&leadership, self.src_port, self.dst_port);
            let previous = self.destination.swap(next_destination.map(Arc::new));

            if previous.as_deref().copied() != next_destination {
                info!(
                    leader = %leadership.leader.name,
                    destination = ?next_destination,
                    "leader changed; resetting forwarder"
                );
                self.handle.reset();
            }
        }
    }
}
