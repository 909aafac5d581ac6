//! Process supervisor.
//!
//! Startup is strictly ordered and fail-fast:
//!
//! ```text
//! validate config → connect store (≤ 15s) → build facade
//!     → bind RPC → bind HTTP → spawn RPC loop → serve HTTP (foreground)
//! ```
//!
//! Shutdown cancels the RPC loop and its sessions, stops HTTP gracefully and
//! then releases the store connection.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, ServiceConfig, StorageBackend};
use crate::rest::{AppState, create_router};
use crate::rpc::{RpcError, RpcListener, RpcService};
use crate::store::{self, ConnectionError, ConnectionHandle, LogStore, MemoryLogStore, Models};

/// Overall budget for establishing the store connection at startup.
pub const STARTUP_DEADLINE: Duration = Duration::from_secs(15);
/// Budget for releasing the store connection at shutdown.
pub const RELEASE_DEADLINE: Duration = Duration::from_secs(15);

/// Errors that stop the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot connect to document store: {0}")]
    Connection(#[from] ConnectionError),

    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("RPC server task failed: {0}")]
    RpcTask(#[from] JoinError),

    #[error("HTTP server failed: {0}")]
    Http(#[source] io::Error),

    #[error("failed to release document store connection: {0}")]
    Release(#[source] ConnectionError),
}

/// A started service: store connected, both listeners bound, nothing served yet.
pub struct Service {
    store: Arc<dyn LogStore>,
    connection: Option<Arc<ConnectionHandle>>,
    rpc: RpcListener,
    http: TcpListener,
    http_addr: SocketAddr,
}

impl Service {
    /// Connect the store and bind both transports.
    ///
    /// Any failure is returned before a single request is served. Once
    /// the store is connected, a later bind failure releases it again.
    pub async fn start(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let (store, connection) = open_storage(&config.storage).await?;

        let rpc_addr = config.rpc_addr();
        let rpc = match RpcListener::bind(rpc_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                release_quietly(connection.as_deref()).await;
                return Err(ServiceError::Bind {
                    transport: "RPC",
                    addr: rpc_addr,
                    source,
                });
            }
        };

        let http_addr = config.http_addr();
        let http = match TcpListener::bind(http_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                release_quietly(connection.as_deref()).await;
                return Err(ServiceError::Bind {
                    transport: "HTTP",
                    addr: http_addr,
                    source,
                });
            }
        };
        let http_addr = http.local_addr().map_err(ServiceError::Http)?;
        info!(addr = %http_addr, "HTTP listener bound");

        Ok(Self {
            store,
            connection,
            rpc,
            http,
            http_addr,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc.local_addr()
    }

    /// Serve both transports until `shutdown` resolves or either transport stops.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Service {
            store,
            connection,
            rpc,
            http,
            http_addr,
        } = self;

        let cancel = CancellationToken::new();

        let rpc_service = Arc::new(RpcService::new(Arc::clone(&store)));
        let mut rpc_task = tokio::spawn(rpc.serve(rpc_service, cancel.child_token()));

        let router = create_router(Arc::new(AppState { store }));
        let http_cancel = cancel.clone();
        let http_server = axum::serve(http, router)
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .into_future();
        tokio::pin!(http_server);

        let signal_cancel = cancel.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown => {
                    info!("Shutdown requested");
                    signal_cancel.cancel();
                }
                _ = signal_cancel.cancelled() => {}
            }
        });

        info!(addr = %http_addr, "Starting HTTP server");

        let first = tokio::select! {
            res = &mut http_server => Stopped::Http(res),
            res = &mut rpc_task => Stopped::Rpc(res),
        };
        cancel.cancel();

        let outcome = match first {
            Stopped::Http(http_res) => {
                let rpc_res = flatten_rpc(rpc_task.await);
                http_res.map_err(ServiceError::Http).and(rpc_res)
            }
            Stopped::Rpc(rpc_res) => {
                let rpc_res = flatten_rpc(rpc_res);
                if let Err(e) = &rpc_res {
                    error!(error = %e, "RPC server stopped unexpectedly, shutting down");
                }
                let http_res = http_server.await.map_err(ServiceError::Http);
                rpc_res.and(http_res)
            }
        };
        signal_task.abort();
        info!("Transports stopped");

        let released = match connection {
            Some(handle) => handle
                .release(RELEASE_DEADLINE)
                .await
                .map(|_| ())
                .map_err(|e| {
                    error!(error = %e, "Failed to release document store connection");
                    ServiceError::Release(e)
                }),
            None => Ok(()),
        };

        outcome.and(released)
    }
}

enum Stopped {
    Http(io::Result<()>),
    Rpc(Result<Result<(), RpcError>, JoinError>),
}

fn flatten_rpc(res: Result<Result<(), RpcError>, JoinError>) -> Result<(), ServiceError> {
    res?.map_err(ServiceError::from)
}

async fn open_storage(
    backend: &StorageBackend,
) -> Result<(Arc<dyn LogStore>, Option<Arc<ConnectionHandle>>), ServiceError> {
    match backend {
        StorageBackend::Mongo(config) => {
            let handle = match tokio::time::timeout(STARTUP_DEADLINE, store::connect(config)).await
            {
                Ok(connected) => Arc::new(connected?),
                Err(_) => {
                    return Err(ConnectionError::Timeout {
                        operation: "connect",
                        after: STARTUP_DEADLINE,
                    }
                    .into());
                }
            };
            let models: Arc<dyn LogStore> = Arc::new(Models::new(Arc::clone(&handle)));
            Ok((models, Some(handle)))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; entries are lost on exit");
            Ok((Arc::new(MemoryLogStore::new()), None))
        }
    }
}

async fn release_quietly(connection: Option<&ConnectionHandle>) {
    if let Some(handle) = connection {
        if let Err(e) = handle.release(RELEASE_DEADLINE).await {
            warn!(error = %e, "Failed to release document store connection after startup failure");
        }
    }
}
