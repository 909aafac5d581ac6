use clap::Parser;
use std::net::IpAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use logger_service::config::{
    DEFAULT_AUTH_SOURCE, DEFAULT_DATABASE, DEFAULT_HTTP_PORT, DEFAULT_RPC_PORT,
    DEFAULT_STORE_ENDPOINT,
};
use logger_service::{Service, ServiceConfig, StorageBackend, StoreConfig};

#[derive(Parser)]
#[command(name = "logger-service")]
#[command(about = "Log ingestion gateway - HTTP and RPC front end for a MongoDB log store")]
struct Args {
    /// Listen host for both transports
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port for the HTTP API
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Port for the RPC listener
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    rpc_port: u16,

    /// MongoDB endpoint (host:port)
    #[arg(long, default_value = DEFAULT_STORE_ENDPOINT)]
    store_endpoint: String,

    /// MongoDB user
    #[arg(long, default_value = "admin")]
    store_user: String,

    /// MongoDB password
    #[arg(long, default_value = "password")]
    store_password: String,

    /// Database holding the logs collection
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Database the credentials are defined in
    #[arg(long, default_value = DEFAULT_AUTH_SOURCE)]
    auth_source: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 15)]
    connect_timeout: u64,

    /// Server selection timeout in seconds
    #[arg(long, default_value_t = 5)]
    server_selection_timeout: u64,

    /// Run in development mode (in-memory storage, no MongoDB)
    #[arg(long)]
    dev: bool,
}

impl Args {
    fn into_config(self) -> ServiceConfig {
        let storage = if self.dev {
            StorageBackend::Memory
        } else {
            StorageBackend::Mongo(StoreConfig {
                endpoint: self.store_endpoint,
                username: self.store_user,
                password: self.store_password,
                database: self.database,
                auth_source: self.auth_source,
                connect_timeout: Duration::from_secs(self.connect_timeout),
                server_selection_timeout: Duration::from_secs(self.server_selection_timeout),
            })
        };

        ServiceConfig {
            bind_host: self.bind,
            http_port: self.http_port,
            rpc_port: self.rpc_port,
            storage,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("logger_service=info".parse()?))
        .init();

    let config = Args::parse().into_config();

    info!(
        http = %config.http_addr(),
        rpc = %config.rpc_addr(),
        storage = ?config.storage,
        "Starting logger-service"
    );

    let service = Service::start(config).await.inspect_err(|e| {
        error!(error = %e, "Startup failed");
    })?;

    info!(rpc = %service.rpc_addr(), http = %service.http_addr(), "logger-service ready");

    service.run(shutdown_signal()).await.inspect_err(|e| {
        error!(error = %e, "logger-service stopped with an error");
    })?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, waiting for SIGINT only");
            let _ = ctrl_c.await;
            info!("Received SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}
