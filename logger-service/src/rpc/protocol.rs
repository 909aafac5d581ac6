//! Wire protocol for the RPC transport.
//!
//! Every message is a length-prefixed frame (4-byte big-endian length)
//! holding a bincode-encoded [`RpcRequest`] or [`RpcResponse`]. The `body`
//! of each envelope is itself the bincode encoding of the method's argument
//! or reply, so the envelope can be decoded before the method is known.

use bincode::Options;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

/// Largest frame either side will accept.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;
/// Bytes reserved in every frame for the envelope around a body.
const ENVELOPE_OVERHEAD: usize = 64;
/// Largest encoded argument or reply; its envelope always fits in one frame.
pub const MAX_BODY_LENGTH: usize = MAX_FRAME_LENGTH - ENVELOPE_OVERHEAD;

/// Registered method names.
pub mod methods {
    pub const LOG_INFO: &str = "RPCServer.LogInfo";
    pub const FIND: &str = "RPCServer.Find";
    pub const GET: &str = "RPCServer.Get";
    pub const PING: &str = "RPCServer.Ping";
}

/// A call from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub seq: u64,
    pub method: String,
    pub body: Vec<u8>,
}

impl RpcRequest {
    pub fn new<A: Serialize>(seq: u64, method: &str, args: &A) -> bincode::Result<Self> {
        Ok(Self {
            seq,
            method: method.to_string(),
            body: encode_body(args)?,
        })
    }
}

/// The server's answer to one [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub seq: u64,
    pub error: Option<String>,
    pub body: Vec<u8>,
}

impl RpcResponse {
    pub fn ok(seq: u64, body: Vec<u8>) -> Self {
        Self {
            seq,
            error: None,
            body,
        }
    }

    pub fn error(seq: u64, message: impl Into<String>) -> Self {
        Self {
            seq,
            error: Some(message.into()),
            body: Vec::new(),
        }
    }
}

/// Argument of [`methods::LOG_INFO`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPayload {
    pub name: String,
    pub data: String,
}

/// Argument of [`methods::FIND`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FindArgs {
    pub limit: Option<u32>,
}

fn options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new().with_limit(limit as u64)
}

/// Frame codec shared by server and client.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Encode an envelope into a frame payload.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> bincode::Result<Bytes> {
    options(MAX_FRAME_LENGTH)
        .serialize(message)
        .map(Bytes::from)
}

/// Encode a method argument or reply, bounded by [`MAX_BODY_LENGTH`].
pub fn encode_body<T: Serialize + ?Sized>(value: &T) -> bincode::Result<Vec<u8>> {
    options(MAX_BODY_LENGTH).serialize(value)
}

/// Decode an envelope or a body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> bincode::Result<T> {
    options(MAX_FRAME_LENGTH).deserialize(bytes)
}
