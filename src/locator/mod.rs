//! Session location and identity validation
//!
//! A session belongs to a workspace when its `getcwd()` equals the workspace
//! path exactly. The override address is returned as soon as it answers, and
//! must then pass [`validate`]; discovered candidates are only returned when
//! they already match.

pub mod discovery;

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::nvim::api;
use crate::nvim::{Connector, RemoteSession};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("No Neovim session matches workspace {workspace} ({tried} candidates tried)")]
    Connection { workspace: String, tried: usize },

    #[error("Neovim cwd mismatch: expected {expected}, got {actual}")]
    Validation { expected: String, actual: String },

    #[error("Session lookup was cancelled")]
    Cancelled,
}

/// A connected session together with the cwd it reported
pub struct LocatedSession {
    pub session: Box<dyn RemoteSession>,
    pub cwd: String,
    pub via_override: bool,
}

impl std::fmt::Debug for LocatedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocatedSession")
            .field("address", &self.session.address())
            .field("cwd", &self.cwd)
            .field("via_override", &self.via_override)
            .finish()
    }
}

pub struct SessionLocator {
    connector: Arc<dyn Connector>,
    config: DiscoveryConfig,
}

impl SessionLocator {
    pub fn new(connector: Arc<dyn Connector>, config: DiscoveryConfig) -> Self {
        Self { connector, config }
    }

    /// Find the session for `workspace`.
    ///
    /// Every connection opened for a non-matching candidate is closed before
    /// returning. The returned session is owned by the caller.
    pub async fn locate(
        &self,
        workspace: &str,
        cancel: &CancellationToken,
    ) -> Result<LocatedSession, LocateError> {
        let candidates = discovery::discover_candidates(&self.config);
        let mut tried = 0;

        for address in &candidates {
            if cancel.is_cancelled() {
                return Err(LocateError::Cancelled);
            }
            tried += 1;

            let via_override = self.config.override_address.as_deref() == Some(address.as_str());
            info!("Trying Neovim session at {}", address);

            let Some((session, cwd)) = self.dial_candidate(address, cancel).await? else {
                continue;
            };

            if via_override || cwd == workspace {
                info!(address = %address, cwd = %cwd, via_override, "Attached to Neovim session");
                return Ok(LocatedSession {
                    session,
                    cwd,
                    via_override,
                });
            }

            debug!("Session at {} has cwd {}, wanted {}", address, cwd, workspace);
            session.close().await;
        }

        Err(LocateError::Connection {
            workspace: workspace.to_string(),
            tried,
        })
    }

    /// Dial and ask for the cwd. `None` means "try the next candidate".
    async fn dial_candidate(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<(Box<dyn RemoteSession>, String)>, LocateError> {
        let session = match self.connector.dial(address, cancel).await {
            Ok(session) => session,
            Err(e) if e.is_cancelled() => return Err(LocateError::Cancelled),
            Err(e) => {
                warn!("Dial failed for {}: {}", address, e);
                return Ok(None);
            }
        };

        match api::get_cwd(session.as_ref()).await {
            Ok(cwd) => Ok(Some((session, cwd))),
            Err(e) => {
                session.close().await;
                if e.is_cancelled() {
                    return Err(LocateError::Cancelled);
                }
                warn!("Failed to read cwd from {}: {}", address, e);
                Ok(None)
            }
        }
    }
}

/// Accept the located session only if its cwd equals `workspace` exactly.
/// The session is closed on mismatch.
pub async fn validate(
    located: LocatedSession,
    workspace: &str,
) -> Result<Box<dyn RemoteSession>, LocateError> {
    if located.cwd == workspace {
        return Ok(located.session);
    }
    located.session.close().await;
    Err(LocateError::Validation {
        expected: workspace.to_string(),
        actual: located.cwd,
    })
}
