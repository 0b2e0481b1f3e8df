//! Collection of current diagnostics from every named buffer

use rmpv::Value;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, instrument, warn};

use crate::diagnostics::error::CollectError;
use crate::diagnostics::types::{DiagnosticItem, FileDiagnostics, RawDiagnostic};
use crate::log_timing;
use crate::nvim::api::{self, BufferId};
use crate::nvim::scripts;
use crate::nvim::{RemoteSession, RpcError};

/// Per-buffer failure; the buffer is skipped
#[derive(Debug, thiserror::Error)]
enum BufferError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("malformed diagnostics payload: {0}")]
    Decode(String),
}

/// Gather diagnostics in buffer enumeration order.
///
/// `files` restricts the result to buffers with those exact names; `None`
/// means every named buffer. Only a failure to enumerate buffers is fatal.
#[instrument(name = "collect", skip_all, fields(filtered = files.is_some()))]
pub async fn collect(
    session: &dyn RemoteSession,
    files: Option<&[String]>,
    cancel: &CancellationToken,
) -> Result<Vec<FileDiagnostics>, CollectError> {
    let start = Instant::now();
    let wanted: Option<HashSet<&str>> =
        files.map(|files| files.iter().map(String::as_str).collect());

    let buffers = api::list_buffers(session).await.map_err(|e| {
        if e.is_cancelled() {
            CollectError::Cancelled
        } else {
            CollectError::ListBuffers(e)
        }
    })?;
    debug!("Session has {} buffers", buffers.len());

    let mut results = Vec::new();
    let mut total = 0;
    for buffer in buffers {
        if cancel.is_cancelled() {
            return Err(CollectError::Cancelled);
        }

        match collect_buffer(session, buffer, wanted.as_ref()).await {
            Ok(Some(entry)) => {
                total += entry.diagnostics.len();
                results.push(entry);
            }
            Ok(None) => {}
            Err(BufferError::Rpc(e)) if e.is_cancelled() => return Err(CollectError::Cancelled),
            Err(e) => warn!("Skipping buffer {}: {}", buffer, e),
        }
    }

    info!(
        files = results.len(),
        diagnostics = total,
        "Collected diagnostics"
    );
    log_timing!(Level::DEBUG, "collect", start.elapsed());
    Ok(results)
}

async fn collect_buffer(
    session: &dyn RemoteSession,
    buffer: BufferId,
    wanted: Option<&HashSet<&str>>,
) -> Result<Option<FileDiagnostics>, BufferError> {
    if !api::buffer_is_valid(session, buffer).await? {
        return Ok(None);
    }
    let name = api::buffer_name(session, buffer).await?;
    if name.is_empty() {
        return Ok(None);
    }
    if wanted.is_some_and(|wanted| !wanted.contains(name.as_str())) {
        return Ok(None);
    }

    let value = session
        .exec_lua(scripts::BUFFER_DIAGNOSTICS, vec![Value::from(buffer)])
        .await?;
    let payload = api::optional_string("nvim_exec_lua", value)?;
    let raw = decode_payload(payload.as_deref().unwrap_or(""))?;

    let diagnostics: Vec<DiagnosticItem> = raw
        .into_iter()
        .filter_map(|record| match DiagnosticItem::try_from(record) {
            Ok(item) => Some(item),
            Err(reason) => {
                debug!("Dropping diagnostic in {}: {}", name, reason);
                None
            }
        })
        .collect();

    if diagnostics.is_empty() {
        return Ok(None);
    }
    Ok(Some(FileDiagnostics {
        file: name,
        diagnostics,
    }))
}

/// Decode the JSON text of `vim.diagnostic.get()`.
///
/// An empty Lua table encodes as `{}`; an absent result as `null` or "".
/// Entries that are not objects are dropped individually.
fn decode_payload(text: &str) -> Result<Vec<RawDiagnostic>, BufferError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let value: JsonValue =
        serde_json::from_str(text).map_err(|e| BufferError::Decode(e.to_string()))?;

    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Object(map) if map.is_empty() => Ok(Vec::new()),
        JsonValue::Array(entries) => Ok(entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawDiagnostic>(entry) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    debug!("Dropping undecodable diagnostic entry: {}", e);
                    None
                }
            })
            .collect()),
        other => Err(BufferError::Decode(format!(
            "expected a list of diagnostics, got {other}"
        ))),
    }
}
