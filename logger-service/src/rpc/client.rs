//! Client for the RPC transport.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::error::CallError;
use super::protocol::{self, FindArgs, RpcPayload, RpcRequest, RpcResponse, methods};
use crate::store::LogRecord;

/// One RPC connection. Calls are issued and answered in order.
pub struct RpcClient {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    next_seq: u64,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, CallError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, protocol::codec()),
            next_seq: 0,
        })
    }

    /// Invoke `method` with `args` and decode the reply.
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R, CallError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let seq = self.next_seq;
        self.next_seq += 1;

        let request = RpcRequest::new(seq, method, args)?;
        self.framed.send(protocol::encode(&request)?).await?;

        let frame = self.framed.next().await.ok_or(CallError::Closed)??;
        let response: RpcResponse = protocol::decode(&frame)?;
        if response.seq != seq {
            return Err(CallError::SequenceMismatch {
                expected: seq,
                got: response.seq,
            });
        }
        if let Some(message) = response.error {
            return Err(CallError::Remote(message));
        }
        Ok(protocol::decode(&response.body)?)
    }

    pub async fn log_info(
        &mut self,
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<String, CallError> {
        let payload = RpcPayload {
            name: name.into(),
            data: data.into(),
        };
        self.call(methods::LOG_INFO, &payload).await
    }

    pub async fn find(&mut self, limit: Option<u32>) -> Result<Vec<LogRecord>, CallError> {
        self.call(methods::FIND, &FindArgs { limit }).await
    }

    pub async fn get(&mut self, id: &str) -> Result<LogRecord, CallError> {
        self.call(methods::GET, &id.to_string()).await
    }

    pub async fn ping(&mut self) -> Result<String, CallError> {
        self.call(methods::PING, &()).await
    }
}
