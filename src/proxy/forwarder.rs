//! TCP forwarding proxy.
//!
//! Owns one listening socket and relays every accepted connection to the
//! current leader address. The destination is read per accepted
//! connection from a shared [`ArcSwapOption`] cell, so a leadership
//! change is picked up by new connections even without an explicit reset.
//! A reset tears the listener down and rebinds the same port right away,
//! so idle listeners repoint without waiting for the next accept.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Instrument};

use super::broker::{pump, PumpEnd};
use crate::error::{Error, Result};

/// Control signals understood by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyCommand {
    /// Stop accepting and close the listener. In-flight connections
    /// drain naturally.
    Stop,
    /// Close the listener and immediately rebind the same port.
    Reset,
}

enum LoopExit {
    Stop,
    Reset,
}

/// Handle used to stop or reset a running [`Forwarder`].
#[derive(Clone)]
pub struct ForwarderHandle {
    control: mpsc::UnboundedSender<ProxyCommand>,
}

impl ForwarderHandle {
    /// Signal the accept loop to stop and close the listening socket.
    pub fn close(&self) {
        let _ = self.control.send(ProxyCommand::Stop);
    }

    /// Signal the accept loop to rebind, picking up a swapped destination
    /// for connections that would otherwise sit behind an idle listener.
    pub fn reset(&self) {
        let _ = self.control.send(ProxyCommand::Reset);
    }
}

/// The forwarding proxy.
pub struct Forwarder {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    destination: Arc<ArcSwapOption<SocketAddr>>,
    control: mpsc::UnboundedReceiver<ProxyCommand>,
}

impl Forwarder {
    /// Bind the listening socket on `0.0.0.0:port`.
    ///
    /// A bind failure is fatal and surfaced to the caller; it is never
    /// retried internally.
    pub async fn bind(
        port: u16,
        destination: Arc<ArcSwapOption<SocketAddr>>,
    ) -> Result<(Self, ForwarderHandle)> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| Error::Bind { port, source })?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "listener bound");

        let (control_tx, control_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                addr,
                listener: Some(listener),
                destination,
                control: control_rx,
            },
            ForwarderHandle {
                control: control_tx,
            },
        ))
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the accept loop until told to stop or a fatal error occurs.
    ///
    /// Resets are handled internally: the listener is dropped and the
    /// same port rebound before accepting again.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let listener = match self.listener.take() {
                Some(listener) => listener,
                None => {
                    // Rebinding after a reset; same port, fresh socket.
                    TcpListener::bind(self.addr)
                        .await
                        .map_err(|source| Error::Bind {
                            port: self.addr.port(),
                            source,
                        })?
                }
            };

            match self.accept_loop(listener).await {
                LoopExit::Reset => {
                    info!(addr = %self.addr, "resetting listener");
                    continue;
                }
                LoopExit::Stop => {
                    info!(addr = %self.addr, "listener closed");
                    return Ok(());
                }
            }
        }
    }

    async fn accept_loop(&mut self, listener: TcpListener) -> LoopExit {
        loop {
            tokio::select! {
                command = self.control.recv() => match command {
                    Some(ProxyCommand::Reset) => return LoopExit::Reset,
                    Some(ProxyCommand::Stop) | None => return LoopExit::Stop,
                },
                accepted = listener.accept() => match accepted {
                    Ok((client, peer_addr)) => {
                        let destination = Arc::clone(&self.destination);
                        tokio::spawn(
                            async move {
                                if let Err(e) = forward_connection(client, destination).await {
                                    debug!(error = %e, "forwarding ended with error");
                                }
                            }
                            .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                        // Avoid a tight loop on persistent accept failures.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }
}

/// Relay one accepted connection to the current destination.
///
/// The destination is resolved at accept time, not proxy-creation time.
/// A missing destination or a dial failure fails this connection only.
async fn forward_connection(
    client: TcpStream,
    destination: Arc<ArcSwapOption<SocketAddr>>,
) -> Result<()> {
    let Some(addr) = destination.load_full() else {
        warn!("no destination known, dropping connection");
        return Err(Error::DestinationUnknown);
    };

    let backend = TcpStream::connect(*addr).await.map_err(|e| {
        warn!(destination = %addr, error = %e, "dial failed");
        Error::Io(e)
    })?;
    debug!(destination = %addr, "forwarding");

    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    let (stop_out_tx, stop_out_rx) = oneshot::channel();
    let (stop_in_tx, stop_in_rx) = oneshot::channel();

    let mut outbound = tokio::spawn(pump(
        client_read,
        backend_write,
        stop_out_rx,
        "client->leader",
    ));
    let mut inbound = tokio::spawn(pump(
        backend_read,
        client_write,
        stop_in_rx,
        "leader->client",
    ));

    // Whichever direction finishes first has already propagated its
    // half-close. A clean client EOF must not cut the reply short: the
    // leader has seen the half-close and its response is still owed, so
    // the inbound pump drains until the leader closes. Only an aborted
    // outbound (error or stop) means the reply path is dead; then the
    // inbound read is forced to unblock. An inbound finish always
    // unblocks the outbound read, since the leader is done either way.
    let (sent, received) = tokio::select! {
        finished = &mut outbound => {
            let (sent, end) = finished.unwrap_or((0, PumpEnd::Aborted));
            if end == PumpEnd::Aborted {
                let _ = stop_in_tx.send(());
            }
            let (received, _) = inbound.await.unwrap_or((0, PumpEnd::Aborted));
            (sent, received)
        }
        finished = &mut inbound => {
            let (received, _) = finished.unwrap_or((0, PumpEnd::Aborted));
            let _ = stop_out_tx.send(());
            let (sent, _) = outbound.await.unwrap_or((0, PumpEnd::Aborted));
            (sent, received)
        }
    };

    debug!(sent, received, "connection torn down");
    Ok(())
}
