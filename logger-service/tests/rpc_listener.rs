//! RPC listener loop integration tests.
//!
//! Covers accept-error handling, session isolation and cancellation
//! against real loopback sockets.

use async_trait::async_trait;
use futures::SinkExt;
use logger_service::rpc::protocol::{self, FindArgs, RpcRequest, methods};
use logger_service::rpc::{Acceptor, CallError, RpcClient, RpcError, RpcListener, RpcService};
use logger_service::store::NewLogEntry;
use logger_service::{LogStore, MemoryLogStore};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Fails a fixed number of accepts with `error` before delegating to a real listener.
struct FlakyAcceptor {
    inner: TcpListener,
    failures_left: usize,
    failures_seen: Arc<AtomicUsize>,
    error: fn() -> io::Error,
}

#[async_trait]
impl Acceptor for FlakyAcceptor {
    type Io = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            self.failures_seen.fetch_add(1, Ordering::SeqCst);
            return Err((self.error)());
        }
        self.inner.accept().await
    }
}

fn service() -> Arc<RpcService> {
    let store: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
    Arc::new(RpcService::new(store))
}

async fn loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn spawn_listener() -> (SocketAddr, CancellationToken, JoinHandle<Result<(), RpcError>>) {
    spawn_listener_with(service()).await
}

async fn spawn_listener_with(
    service: Arc<RpcService>,
) -> (SocketAddr, CancellationToken, JoinHandle<Result<(), RpcError>>) {
    let listener = RpcListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(listener.serve(service, cancel.clone()));
    (addr, cancel, handle)
}

// =============================================================================
// Accept Errors
// =============================================================================

#[tokio::test]
async fn test_transient_accept_errors_are_retried() {
    let (inner, addr) = loopback().await;
    let failures_seen = Arc::new(AtomicUsize::new(0));
    let acceptor = FlakyAcceptor {
        inner,
        failures_left: 4,
        failures_seen: failures_seen.clone(),
        error: || io::Error::from_raw_os_error(libc::EMFILE),
    };
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        RpcListener::from_acceptor(acceptor, addr).serve(service(), cancel.clone()),
    );

    let mut client = RpcClient::connect(addr).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), client.ping())
        .await
        .expect("listener stopped accepting")
        .unwrap();
    assert_eq!(reply, "pong");
    assert_eq!(failures_seen.load(Ordering::SeqCst), 4);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_fatal_accept_error_stops_listener() {
    let (inner, addr) = loopback().await;
    let acceptor = FlakyAcceptor {
        inner,
        failures_left: usize::MAX,
        failures_seen: Arc::new(AtomicUsize::new(0)),
        error: || io::Error::from_raw_os_error(libc::EBADF),
    };
    let cancel = CancellationToken::new();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        RpcListener::from_acceptor(acceptor, addr).serve(service(), cancel.clone()),
    )
    .await
    .expect("listener did not stop");

    assert!(matches!(result, Err(RpcError::Listener(_))));
    assert!(cancel.is_cancelled());
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_idle_session_does_not_block_others() {
    let (addr, cancel, handle) = spawn_listener().await;

    let _idle = RpcClient::connect(addr).await.unwrap();
    let mut active = RpcClient::connect(addr).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), active.ping())
        .await
        .expect("second session was blocked")
        .unwrap();
    assert_eq!(reply, "pong");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_frame_ends_only_that_session() {
    let (addr, cancel, handle) = spawn_listener().await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    // Length prefix of 1 followed by a request that stops after its sequence number.
    raw.write_all(&[0, 0, 0, 1, 1]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), raw.read(&mut buf))
        .await
        .expect("session was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    let mut client = RpcClient::connect(addr).await.unwrap();
    assert_eq!(client.ping().await.unwrap(), "pong");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_method_keeps_session_open() {
    let (addr, cancel, handle) = spawn_listener().await;
    let mut client = RpcClient::connect(addr).await.unwrap();

    let err = client
        .call::<(), String>("RPCServer.Missing", &())
        .await
        .unwrap_err();
    match err {
        CallError::Remote(message) => assert!(message.contains("RPCServer.Missing")),
        other => panic!("unexpected error: {other}"),
    }

    let err = client
        .call::<u8, String>(methods::LOG_INFO, &42)
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Remote(_)));

    assert_eq!(client.ping().await.unwrap(), "pong");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_calls_on_one_session_share_the_store() {
    let (addr, cancel, handle) = spawn_listener().await;
    let mut client = RpcClient::connect(addr).await.unwrap();

    let reply = client.log_info("queue", "job done").await.unwrap();
    assert_eq!(reply, "Processed payload via RPC: queue");

    let records = client.find(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data, "job done");

    let record = client.get(&records[0].id).await.unwrap();
    assert_eq!(record, records[0]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_interrupts_session_blocked_on_write() {
    let store = Arc::new(MemoryLogStore::new());
    let data = "x".repeat(4 * 1024);
    for i in 0..1000 {
        store
            .insert(NewLogEntry {
                name: format!("bulk-{i}"),
                data: data.clone(),
            })
            .await
            .unwrap();
    }
    let (addr, cancel, handle) = spawn_listener_with(Arc::new(RpcService::new(store))).await;

    // Pipeline large queries and never read a reply.
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut writer = Framed::new(stream, protocol::codec());
    for seq in 0..50 {
        let request =
            RpcRequest::new(seq, methods::FIND, &FindArgs { limit: Some(1000) }).unwrap();
        writer.send(protocol::encode(&request).unwrap()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener waited for a stalled session")
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(writer);
}

#[tokio::test]
async fn test_cancel_stops_listener_and_sessions() {
    let (addr, cancel, handle) = spawn_listener().await;
    let mut client = RpcClient::connect(addr).await.unwrap();
    assert_eq!(client.ping().await.unwrap(), "pong");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener did not stop")
        .unwrap()
        .unwrap();

    assert!(client.ping().await.is_err());
}
