use thiserror::Error;

use crate::nvim::RpcError;

/// Failures inside the refresh step. These never fail a request; the
/// refresher reports them as warnings and collection proceeds.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to run git: {0}")]
    GitSpawn(#[source] std::io::Error),

    #[error("git diff exited with {status}: {stderr}")]
    GitFailed { status: String, stderr: String },

    #[error("Filetype filter failed: {0}")]
    Filter(#[source] RpcError),

    #[error("Filetype filter returned malformed output: {0}")]
    FilterDecode(String),

    #[error("Script protocol mismatch: expected version {expected}, got {actual}")]
    ProtocolVersion { expected: u32, actual: u32 },

    #[error("Reload failed: {0}")]
    Reload(#[source] RpcError),

    #[error("Refresh was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Failed to list Neovim buffers: {0}")]
    ListBuffers(#[source] RpcError),

    #[error("Diagnostics collection was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to encode diagnostics as JSON: {0}")]
    Json(#[from] serde_json::Error),
}
