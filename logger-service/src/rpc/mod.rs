//! Binary RPC transport: listener loop, per-connection sessions and a client.

mod client;
mod error;
pub mod protocol;
mod server;
mod service;

pub use client::RpcClient;
pub use error::{CallError, RpcError, SessionError};
pub use server::{Acceptor, RpcListener, is_fatal_accept_error};
pub use service::RpcService;
