mod harness;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use harness::TestBackend;
use wrangle::{Error, Forwarder};

fn cell(addr: Option<SocketAddr>) -> Arc<ArcSwapOption<SocketAddr>> {
    Arc::new(ArcSwapOption::new(addr.map(Arc::new)))
}

/// One short write-then-read exchange through the proxy.
async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> Result<Vec<u8>, &'static str> {
    let result = timeout(Duration::from_millis(500), async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;
        let mut buf = vec![0u8; 64];
        let n = stream.read(&mut buf).await?;
        Ok::<_, std::io::Error>(buf[..n].to_vec())
    })
    .await;

    match result {
        Ok(Ok(data)) if !data.is_empty() => Ok(data),
        Ok(Ok(_)) => Err("connection closed"),
        Ok(Err(_)) => Err("io error"),
        Err(_) => Err("timeout"),
    }
}

/// Keep trying a roundtrip until the expected reply shows up.
async fn roundtrip_until(addr: SocketAddr, payload: &[u8], expected: &[u8]) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if let Ok(data) = roundtrip(addr, payload).await {
            if data == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn echo_roundtrip_delivers_bytes_in_order() {
    let backend = TestBackend::echo().await.unwrap();
    let destination = cell(Some(backend.addr));

    let (forwarder, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    let reply = roundtrip(addr, b"ping").await.unwrap();
    assert_eq!(reply, b"ping");
}

#[tokio::test]
async fn multiple_chunks_arrive_in_order() {
    let backend = TestBackend::echo().await.unwrap();
    let destination = cell(Some(backend.addr));

    let (forwarder, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    let exchange = timeout(Duration::from_secs(2), async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello ").await.unwrap();
        stream.write_all(b"world").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    })
    .await
    .unwrap();

    assert_eq!(exchange, b"hello world");
}

#[tokio::test]
async fn unknown_destination_fails_connection_but_not_listener() {
    let destination = cell(None);

    let (forwarder, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    // No leader known: the connection is dropped, nothing else breaks.
    assert!(roundtrip(addr, b"x").await.is_err());

    // Once a destination appears, the same listener serves it.
    let backend = TestBackend::echo().await.unwrap();
    destination.store(Some(Arc::new(backend.addr)));
    assert!(roundtrip_until(addr, b"ping", b"ping").await);
}

#[tokio::test]
async fn reset_repoints_subsequent_connections() {
    let alpha = TestBackend::banner(b"alpha").await.unwrap();
    let bravo = TestBackend::banner(b"bravo").await.unwrap();
    let destination = cell(Some(alpha.addr));

    let (forwarder, handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    // Established connection to the old leader.
    let mut old_conn = TcpStream::connect(addr).await.unwrap();
    old_conn.write_all(b"x").await.unwrap();
    let mut buf = [0u8; 5];
    timeout(Duration::from_secs(1), old_conn.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"alpha");

    // Leadership moves: swap the destination and reset the listener.
    destination.store(Some(Arc::new(bravo.addr)));
    handle.reset();

    assert!(roundtrip_until(addr, b"x", b"bravo").await);

    // The in-flight connection keeps draining to the old leader; it is
    // never silently switched mid-stream.
    old_conn.write_all(b"y").await.unwrap();
    timeout(Duration::from_secs(1), old_conn.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"alpha");
}

#[tokio::test]
async fn response_after_client_half_close_is_delivered() {
    // A backend that reads the whole request to EOF before answering,
    // the way one-shot request/response protocols do.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"request");
        stream.write_all(b"done").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let destination = cell(Some(backend_addr));
    let (forwarder, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"request").await.unwrap();
    stream.shutdown().await.unwrap();

    // The response is produced strictly after our half-close; it must
    // still come back in full.
    let mut out = Vec::new();
    timeout(Duration::from_secs(1), stream.read_to_end(&mut out))
        .await
        .expect("response never arrived")
        .unwrap();
    assert_eq!(out, b"done");
}

#[tokio::test]
async fn half_close_from_destination_reaches_client() {
    // A backend that sends a parting word and fully closes.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"bye").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let destination = cell(Some(backend_addr));
    let (forwarder, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    tokio::spawn(forwarder.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The client keeps its write side open the whole time; the proxy must
    // still propagate the destination's close instead of hanging.
    let mut out = Vec::new();
    let read = timeout(Duration::from_secs(1), stream.read_to_end(&mut out)).await;
    assert!(read.is_ok(), "client side did not observe the close");
    assert_eq!(out, b"bye");
}

#[tokio::test]
async fn close_stops_accepting() {
    let backend = TestBackend::echo().await.unwrap();
    let destination = cell(Some(backend.addr));

    let (forwarder, handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let addr = forwarder.local_addr();
    let run = tokio::spawn(forwarder.run());

    handle.close();
    let result = timeout(Duration::from_secs(1), run)
        .await
        .expect("close was not observed")
        .unwrap();
    assert!(result.is_ok());

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn bind_conflict_surfaces_as_bind_error() {
    let destination = cell(None);

    let (first, _handle) = Forwarder::bind(0, Arc::clone(&destination)).await.unwrap();
    let taken = first.local_addr().port();

    let second = Forwarder::bind(taken, Arc::clone(&destination)).await;
    assert!(matches!(second, Err(Error::Bind { port, .. }) if port == taken));
}
