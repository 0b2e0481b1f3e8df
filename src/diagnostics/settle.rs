//! Waiting for language servers to publish fresh diagnostics
//!
//! Reload and `didSave` are scheduled inside Neovim's event loop and there is
//! no completion signal, so collection waits after a reload. The fixed policy
//! sleeps; the polling policy watches a per-buffer stamp and stops once it
//! holds still. A buffer with an attached language server only counts as
//! settled after diagnostics were published for it since the reload, so an
//! idle stamp from a server that has not answered yet is not mistaken for a
//! quiet one.

use rmpv::Value;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SettlePolicy;
use crate::nvim::api;
use crate::nvim::{RemoteSession, RpcError};
use crate::nvim::scripts;

/// One loaded target buffer, as reported by `DIAGNOSTIC_STAMP`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct BufferStamp {
    bufnr: i64,
    changedtick: i64,
    diagnostics: u64,
    /// Diagnostic updates since the last reload
    published: u64,
    /// A language server is attached
    attached: bool,
}

impl BufferStamp {
    fn awaiting_publish(&self) -> bool {
        self.attached && self.published == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Fixed wait completed
    Waited(Duration),
    /// The stamp was unchanged for the required number of polls
    Stable { polls: u32 },
    /// The polling budget ran out first
    TimedOut { polls: u32 },
    /// The stamp could not be read; stopped waiting
    Unavailable,
    Cancelled,
}

pub async fn settle(
    session: &dyn RemoteSession,
    policy: &SettlePolicy,
    targets: &[String],
    cancel: &CancellationToken,
) -> SettleOutcome {
    match *policy {
        SettlePolicy::Fixed(duration) => {
            debug!("Waiting {:?} for language servers to settle", duration);
            tokio::select! {
                _ = cancel.cancelled() => SettleOutcome::Cancelled,
                _ = sleep(duration) => SettleOutcome::Waited(duration),
            }
        }
        SettlePolicy::Poll {
            interval,
            quiet_polls,
            timeout,
        } => poll_until_stable(session, interval, quiet_polls, timeout, targets, cancel).await,
    }
}

async fn poll_until_stable(
    session: &dyn RemoteSession,
    interval: Duration,
    quiet_polls: u32,
    timeout: Duration,
    targets: &[String],
    cancel: &CancellationToken,
) -> SettleOutcome {
    let deadline = Instant::now() + timeout;
    let files = Value::Array(targets.iter().map(|file| Value::from(file.as_str())).collect());
    let mut previous: Option<Vec<BufferStamp>> = None;
    let mut quiet = 0;
    let mut polls = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Diagnostics still changing after {} polls", polls);
            return SettleOutcome::TimedOut { polls };
        }
        tokio::select! {
            _ = cancel.cancelled() => return SettleOutcome::Cancelled,
            _ = sleep(interval.min(remaining)) => {}
        }

        let stamp = match read_stamp(session, files.clone()).await {
            Ok(stamp) => stamp,
            Err(e) if e.is_cancelled() => return SettleOutcome::Cancelled,
            Err(e) => {
                warn!("Failed to read diagnostic stamp, collecting now: {}", e);
                return SettleOutcome::Unavailable;
            }
        };
        polls += 1;

        if previous.as_ref() == Some(&stamp) {
            quiet += 1;
            let pending: Vec<i64> = stamp
                .iter()
                .filter(|buffer| buffer.awaiting_publish())
                .map(|buffer| buffer.bufnr)
                .collect();
            if quiet >= quiet_polls {
                if pending.is_empty() {
                    debug!("Diagnostics settled after {} polls", polls);
                    return SettleOutcome::Stable { polls };
                }
                debug!("Waiting for first diagnostics in buffers {:?}", pending);
            }
        } else {
            quiet = 0;
            previous = Some(stamp);
        }
    }
}

async fn read_stamp(
    session: &dyn RemoteSession,
    files: Value,
) -> Result<Vec<BufferStamp>, RpcError> {
    let value = session
        .exec_lua(scripts::DIAGNOSTIC_STAMP, vec![files])
        .await?;
    let text = api::optional_string("nvim_exec_lua", value)?.unwrap_or_default();
    decode_stamp(&text)
}

/// An empty Lua list encodes as `{}`
fn decode_stamp(text: &str) -> Result<Vec<BufferStamp>, RpcError> {
    match text.trim() {
        "" | "{}" | "null" => Ok(Vec::new()),
        text => serde_json::from_str(text)
            .map_err(|e| RpcError::unexpected("nvim_exec_lua", format!("malformed stamp: {e}"))),
    }
}
