//! Shared test utilities for logger-service integration tests.

use logger_service::{RpcClient, Service, ServiceConfig, ServiceError, StorageBackend};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::task::JoinHandle;

/// Allocate an available port for testing.
#[allow(dead_code)]
pub fn allocate_port() -> u16 {
    portpicker::pick_unused_port().expect("No available port")
}

/// Loopback config with OS-assigned ports and in-memory storage.
#[allow(dead_code)]
pub fn memory_config() -> ServiceConfig {
    ServiceConfig {
        bind_host: Ipv4Addr::LOCALHOST.into(),
        http_port: 0,
        rpc_port: 0,
        storage: StorageBackend::Memory,
    }
}

/// A running service with both transports on loopback.
#[allow(dead_code)]
pub struct TestServer {
    pub http_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    pub client: Client,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServiceError>>,
}

#[allow(dead_code)]
impl TestServer {
    /// Start a service with in-memory storage.
    pub async fn spawn() -> Self {
        let service = Service::start(memory_config())
            .await
            .expect("Failed to start service");
        let http_addr = service.http_addr();
        let rpc_addr = service.rpc_addr();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(service.run(async move {
            let _ = shutdown_rx.await;
        }));

        // Small delay to ensure both transports are accepting
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Self {
            http_addr,
            rpc_addr,
            client: Client::new(),
            shutdown_tx,
            handle,
        }
    }

    /// Get base URL for the HTTP API.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    /// Perform a GET request.
    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a POST request with JSON body.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Open an RPC connection to the service.
    pub async fn rpc(&self) -> RpcClient {
        RpcClient::connect(self.rpc_addr)
            .await
            .expect("RPC connect failed")
    }

    /// Request shutdown and return how the service ended.
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        let _ = self.shutdown_tx.send(());
        self.handle.await.expect("Service task panicked")
    }
}
