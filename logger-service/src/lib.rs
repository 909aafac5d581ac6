pub mod config;
pub mod rest;
pub mod rpc;
pub mod store;
pub mod supervisor;

pub use config::{ConfigError, ServiceConfig, StorageBackend, StoreConfig};
pub use rpc::{RpcClient, RpcListener, RpcService};
pub use store::{ConnectionError, LogRecord, LogStore, MemoryLogStore, Models, PersistenceError};
pub use supervisor::{Service, ServiceError};
