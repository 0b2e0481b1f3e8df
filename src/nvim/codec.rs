//! MessagePack-RPC framing layer
//!
//! Neovim speaks MessagePack-RPC over its listen socket. There are no length
//! headers: each message is a single MessagePack array, so a frame ends where
//! the encoded value ends.
//!
//! Message shapes:
//! - request:      `[0, msgid, method, params]`
//! - response:     `[1, msgid, error, result]`
//! - notification: `[2, method, params]`

use bytes::{Buf, BufMut, BytesMut};
use rmpv::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Maximum frame size to prevent memory exhaustion
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64MB

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;
const NOTIFICATION: u64 = 2;

/// Error types for MessagePack-RPC framing
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid MessagePack data: {0}")]
    Decode(String),

    #[error("Failed to encode MessagePack value: {0}")]
    Encode(String),

    #[error("Invalid RPC message: {0}")]
    InvalidMessage(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// A single MessagePack-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Request {
        msgid: u64,
        method: String,
        params: Vec<Value>,
    },
    Response {
        msgid: u64,
        error: Value,
        result: Value,
    },
    Notification {
        method: String,
        params: Vec<Value>,
    },
}

impl RpcMessage {
    /// Convert into the wire array representation
    pub fn into_value(self) -> Value {
        match self {
            RpcMessage::Request {
                msgid,
                method,
                params,
            } => Value::Array(vec![
                Value::from(REQUEST),
                Value::from(msgid),
                Value::from(method),
                Value::Array(params),
            ]),
            RpcMessage::Response {
                msgid,
                error,
                result,
            } => Value::Array(vec![Value::from(RESPONSE), Value::from(msgid), error, result]),
            RpcMessage::Notification { method, params } => Value::Array(vec![
                Value::from(NOTIFICATION),
                Value::from(method),
                Value::Array(params),
            ]),
        }
    }

    /// Parse the wire array representation
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Array(mut parts) = value else {
            return Err(CodecError::InvalidMessage(format!(
                "expected array, got {value}"
            )));
        };

        let kind = parts
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| CodecError::InvalidMessage("missing message type".to_string()))?;

        match (kind, parts.len()) {
            (REQUEST, 4) => {
                let params = take_params(parts.pop())?;
                let method = take_method(parts.pop())?;
                let msgid = take_msgid(parts.pop())?;
                Ok(RpcMessage::Request {
                    msgid,
                    method,
                    params,
                })
            }
            (RESPONSE, 4) => {
                let result = parts.pop().unwrap_or(Value::Nil);
                let error = parts.pop().unwrap_or(Value::Nil);
                let msgid = take_msgid(parts.pop())?;
                Ok(RpcMessage::Response {
                    msgid,
                    error,
                    result,
                })
            }
            (NOTIFICATION, 3) => {
                let params = take_params(parts.pop())?;
                let method = take_method(parts.pop())?;
                Ok(RpcMessage::Notification { method, params })
            }
            (kind, len) => Err(CodecError::InvalidMessage(format!(
                "unsupported message type {kind} with {len} elements"
            ))),
        }
    }
}

fn take_msgid(value: Option<Value>) -> Result<u64, CodecError> {
    value
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or_else(|| CodecError::InvalidMessage("msgid must be an unsigned integer".to_string()))
}

fn take_method(value: Option<Value>) -> Result<String, CodecError> {
    match value {
        Some(Value::String(s)) => s
            .into_str()
            .ok_or_else(|| CodecError::InvalidMessage("method is not valid UTF-8".to_string())),
        _ => Err(CodecError::InvalidMessage(
            "method must be a string".to_string(),
        )),
    }
}

fn take_params(value: Option<Value>) -> Result<Vec<Value>, CodecError> {
    match value {
        Some(Value::Array(params)) => Ok(params),
        Some(Value::Nil) | None => Ok(Vec::new()),
        Some(other) => Err(CodecError::InvalidMessage(format!(
            "params must be an array, got {other}"
        ))),
    }
}

/// Codec turning a byte stream into [`RpcMessage`] frames and back
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgpackRpcCodec;

impl Decoder for MsgpackRpcCodec {
    type Item = RpcMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = io::Cursor::new(&src[..]);
        match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                src.advance(consumed);
                trace!("MsgpackRpcCodec: Decoded frame ({} bytes)", consumed);
                RpcMessage::from_value(value).map(Some)
            }
            Err(rmpv::decode::Error::InvalidMarkerRead(e))
            | Err(rmpv::decode::Error::InvalidDataRead(e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                trace!(
                    "MsgpackRpcCodec: Incomplete frame - {} bytes buffered",
                    src.len()
                );
                Ok(None)
            }
            Err(e) => Err(CodecError::Decode(e.to_string())),
        }
    }
}

impl Encoder<RpcMessage> for MsgpackRpcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &item.into_value())
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        if buf.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(buf.len());
        dst.put_slice(&buf);
        Ok(())
    }
}
