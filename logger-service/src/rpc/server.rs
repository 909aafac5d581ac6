//! RPC listener loop.
//!
//! Accepts connections until cancelled and runs each one as its own
//! session task. Sessions handle calls strictly one at a time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::{RpcError, SessionError};
use super::protocol::{self, RpcRequest, RpcResponse};
use super::service::RpcService;

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);
/// How long a stopping listener waits for its sessions to finish.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of inbound connections.
#[async_trait]
pub trait Acceptor: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Io, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Io = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Whether an accept error means the listening socket itself is unusable.
///
/// Anything not listed here (descriptor exhaustion, aborted handshakes,
/// interrupted calls, ...) is retried.
pub fn is_fatal_accept_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::InvalidInput {
        return true;
    }
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::EBADF || code == libc::ENOTSOCK || code == libc::EINVAL
    )
}

/// Exponential delay between retries after transient accept errors.
#[derive(Debug, Default)]
struct AcceptBackoff {
    failures: u32,
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let exp = self.failures.min(16);
        self.failures = self.failures.saturating_add(1);
        ACCEPT_BACKOFF_BASE
            .saturating_mul(1u32 << exp)
            .min(ACCEPT_BACKOFF_MAX)
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// A bound RPC listener.
pub struct RpcListener<A: Acceptor = TcpListener> {
    acceptor: A,
    local_addr: SocketAddr,
}

impl RpcListener<TcpListener> {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "RPC listener bound");
        Ok(Self {
            acceptor: listener,
            local_addr,
        })
    }
}

impl<A: Acceptor> RpcListener<A> {
    pub fn from_acceptor(acceptor: A, local_addr: SocketAddr) -> Self {
        Self {
            acceptor,
            local_addr,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `cancel` fires or the listener fails.
    ///
    /// Each session gets a child of `cancel`; on return every session has
    /// been told to stop and given [`SESSION_DRAIN_TIMEOUT`] to do so.
    pub async fn serve(
        mut self,
        service: Arc<RpcService>,
        cancel: CancellationToken,
    ) -> Result<(), RpcError> {
        info!(addr = %self.local_addr, "Starting RPC server");

        let tracker = TaskTracker::new();
        let mut backoff = AcceptBackoff::default();

        let result = loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                accepted = self.acceptor.accept() => accepted,
            };

            match accepted {
                Ok((io, peer)) => {
                    backoff.reset();
                    let service = Arc::clone(&service);
                    let session_cancel = cancel.child_token();
                    tracker.spawn(async move {
                        debug!(%peer, "RPC session opened");
                        match serve_session(io, service, session_cancel).await {
                            Ok(calls) => debug!(%peer, calls, "RPC session closed"),
                            Err(e) => warn!(%peer, error = %e, "RPC session terminated"),
                        }
                    });
                }
                Err(e) if is_fatal_accept_error(&e) => {
                    error!(error = %e, "RPC listener failed");
                    break Err(RpcError::Listener(e));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, ?delay, "RPC accept failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        cancel.cancel();
        tracker.close();
        if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, tracker.wait())
            .await
            .is_err()
        {
            warn!(remaining = tracker.len(), "RPC sessions did not finish in time");
        }

        info!(addr = %self.local_addr, "RPC server stopped");
        result
    }
}

/// Serve calls on one connection until the peer hangs up or `cancel` fires.
///
/// Returns the number of calls answered.
async fn serve_session<S>(
    io: S,
    service: Arc<RpcService>,
    cancel: CancellationToken,
) -> Result<u64, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(io, protocol::codec());
    let mut calls = 0u64;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = framed.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        let request: RpcRequest = protocol::decode(&frame?).map_err(SessionError::Decode)?;

        // A peer that stops reading must not hold the session past cancellation.
        let answered = async {
            let response = service.handle(request).await;
            framed.send(encode_response(response)?).await?;
            Ok::<_, SessionError>(())
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            answered = answered => answered?,
        }
        calls += 1;
    }

    Ok(calls)
}

/// Encode a response, replacing it with an error response if it cannot be framed.
fn encode_response(response: RpcResponse) -> Result<Bytes, SessionError> {
    match protocol::encode(&response) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            warn!(seq = response.seq, error = %e, "RPC response could not be encoded");
            let fallback =
                RpcResponse::error(response.seq, format!("rpc: failed to encode reply: {e}"));
            protocol::encode(&fallback).map_err(SessionError::Encode)
        }
    }
}
