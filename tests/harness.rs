//! Shared helpers for integration tests: disposable TCP backends and
//! wiremock fixtures for the metadata service.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wrangle::Member;

/// A disposable TCP backend that either echoes what it receives or
/// answers every received chunk with a fixed banner.
pub struct TestBackend {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestBackend {
    pub async fn echo() -> io::Result<Self> {
        Self::spawn("127.0.0.1:0", None).await
    }

    pub async fn banner(banner: &'static [u8]) -> io::Result<Self> {
        Self::spawn("127.0.0.1:0", Some(banner)).await
    }

    /// Bind a banner backend on a specific address. Loopback aliases like
    /// 127.0.0.2 let tests give two backends the same port.
    pub async fn banner_on(addr: &str, banner: &'static [u8]) -> io::Result<Self> {
        Self::spawn(addr, Some(banner)).await
    }

    async fn spawn(addr: &str, banner: Option<&'static [u8]>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicU64::new(0));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let conn_count = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((mut stream, _)) = accepted else { break };
                        conn_count.fetch_add(1, Ordering::Relaxed);

                        tokio::spawn(async move {
                            let mut buf = vec![0u8; 8192];
                            loop {
                                match stream.read(&mut buf).await {
                                    Ok(0) | Err(_) => break,
                                    Ok(n) => {
                                        let reply = banner.unwrap_or(&buf[..n]);
                                        if stream.write_all(reply).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Build a member record the way the metadata service reports them.
pub fn member(uuid: &str, create_index: i64, primary_ip: &str) -> Member {
    Member {
        uuid: uuid.to_string(),
        name: format!("app_{}", uuid),
        create_index,
        primary_ip: primary_ip.to_string(),
        service_name: "app".to_string(),
        stack_name: "prod".to_string(),
        host_uuid: "h-1".to_string(),
    }
}

/// Mount the static happy-path metadata endpoints: self record, service
/// containers, and a version that never changes.
pub async fn mount_metadata(server: &MockServer, self_member: &Member, members: &[Member]) {
    Mock::given(method("GET"))
        .and(path("/self/container"))
        .respond_with(ResponseTemplate::new(200).set_body_json(self_member))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/stacks/prod/services/app/containers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(members))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json("1"))
        .mount(server)
        .await;
}

/// Reserve a port that is free right now (bind-and-drop).
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
