//! Method dispatch for RPC sessions.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::protocol::{self, FindArgs, RpcPayload, RpcRequest, RpcResponse, methods};
use crate::store::{FindQuery, LogStore, NewLogEntry, PersistenceError};

#[derive(Debug, Error)]
enum MethodError {
    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),

    #[error("rpc: bad arguments: {0}")]
    BadArguments(#[source] bincode::Error),

    #[error("rpc: failed to encode reply: {0}")]
    Encode(#[source] bincode::Error),

    #[error("{0}")]
    Persistence(#[from] PersistenceError),
}

/// Maps method names onto the persistence facade.
pub struct RpcService {
    store: Arc<dyn LogStore>,
}

impl RpcService {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Run one call. Failures become error responses; they never end the session.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let seq = request.seq;
        match self.dispatch(&request.method, &request.body).await {
            Ok(body) => RpcResponse::ok(seq, body),
            Err(e) => {
                debug!(seq, method = %request.method, error = %e, "RPC call failed");
                RpcResponse::error(seq, e.to_string())
            }
        }
    }

    async fn dispatch(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, MethodError> {
        match method {
            methods::LOG_INFO => {
                let payload: RpcPayload = args(body)?;
                let name = payload.name.clone();
                self.store
                    .insert(NewLogEntry {
                        name: payload.name,
                        data: payload.data,
                    })
                    .await?;
                reply(&format!("Processed payload via RPC: {}", name))
            }
            methods::FIND => {
                let find: FindArgs = args(body)?;
                let records = self.store.find(FindQuery { limit: find.limit }).await?;
                reply(&records)
            }
            methods::GET => {
                let id: String = args(body)?;
                match self.store.get(&id).await? {
                    Some(record) => reply(&record),
                    None => Err(PersistenceError::NotFound(format!("log entry {}", id)).into()),
                }
            }
            methods::PING => {
                let () = args(body)?;
                reply(&"pong")
            }
            other => Err(MethodError::UnknownMethod(other.to_string())),
        }
    }
}

fn args<T: DeserializeOwned>(body: &[u8]) -> Result<T, MethodError> {
    protocol::decode(body).map_err(MethodError::BadArguments)
}

fn reply<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, MethodError> {
    protocol::encode_body(value).map_err(MethodError::Encode)
}
