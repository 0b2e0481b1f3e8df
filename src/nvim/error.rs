use std::time::Duration;
use thiserror::Error;

use crate::nvim::codec::CodecError;

/// Errors raised while talking to a Neovim session
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Framing error: {0}")]
    Codec(#[from] CodecError),

    #[error("Neovim returned an error for {method}: {message}")]
    Remote { method: String, message: String },

    #[error("Unexpected response to {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    #[error("Request {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Request {method} was cancelled")]
    Cancelled { method: String },

    #[error("Connection to Neovim is closed")]
    Disconnected,
}

impl RpcError {
    pub fn unexpected(method: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            detail: detail.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RpcError::Cancelled { .. })
    }
}
