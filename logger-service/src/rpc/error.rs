//! RPC error types.

use std::io;

use thiserror::Error;

/// Errors that end the RPC accept loop.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The listening socket itself is broken; accepting again cannot succeed.
    #[error("RPC listener failed: {0}")]
    Listener(#[source] io::Error),
}

/// Errors that end a single RPC session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Io(#[from] io::Error),

    #[error("malformed request frame: {0}")]
    Decode(#[source] bincode::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[source] bincode::Error),
}

/// Errors returned to [`RpcClient`](super::RpcClient) callers.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport: {0}")]
    Io(#[from] io::Error),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("response sequence {got} does not match request {expected}")]
    SequenceMismatch { expected: u64, got: u64 },

    /// The server processed the frame but the call failed.
    #[error("remote: {0}")]
    Remote(String),
}
