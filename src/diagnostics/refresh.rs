//! Best-effort refresh of diagnostics for the target files
//!
//! Targets are either the caller's files (restricted to the workspace) or the
//! files git reports as changed, narrowed to the filetypes an attached
//! language server handles. The refresher reloads them in Neovim and asks
//! language servers to re-check them. Nothing here fails a request: every
//! problem ends up in the returned [`RefreshReport`].

use rmpv::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, instrument, warn};

use crate::config::{CapPolicy, RefreshConfig};
use crate::diagnostics::changes::ChangeSource;
use crate::diagnostics::error::RefreshError;
use crate::log_timing;
use crate::nvim::RemoteSession;
use crate::nvim::api;
use crate::nvim::scripts::{self, SupportedFiles};

/// Caller-supplied files after the workspace check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedFiles {
    /// Whether the caller asked for specific files at all
    pub requested: bool,
    /// Requested files inside the workspace, in request order
    pub files: Vec<String>,
    /// Requested files rejected as outside the workspace
    pub rejected: usize,
}

impl ScopedFiles {
    /// Keep the files whose path starts with `workspace` (component-wise,
    /// no canonicalization)
    pub fn new(workspace: &str, requested: &[String]) -> Self {
        let root = Path::new(workspace);
        let mut files = Vec::new();
        let mut rejected = 0;

        for file in requested {
            if Path::new(file).starts_with(root) {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            } else {
                warn!("File {} is outside workspace {}, skipping", file, workspace);
                rejected += 1;
            }
        }

        Self {
            requested: !requested.is_empty(),
            files,
            rejected,
        }
    }

    /// Collection filter: `None` means every buffer
    pub fn collection_filter(&self) -> Option<&[String]> {
        self.requested.then_some(self.files.as_slice())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Explicit,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Reload and save notifications were issued for the targets
    Reloaded,
    /// Nothing was reloaded, by decision
    Skipped { reason: String },
    /// Nothing (or not everything) was reloaded because a step failed
    Failed { reason: String },
}

/// What a refresh did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub source: TargetSource,
    /// Files handed to the reload script, or that would have been
    pub targets: Vec<String>,
    pub rejected_outside: usize,
    pub unsupported: usize,
    pub capped: bool,
    pub outcome: RefreshOutcome,
}

impl RefreshReport {
    fn new(source: TargetSource, rejected_outside: usize) -> Self {
        Self {
            source,
            targets: Vec::new(),
            rejected_outside,
            unsupported: 0,
            capped: false,
            outcome: RefreshOutcome::Skipped {
                reason: "no target files".to_string(),
            },
        }
    }

    pub fn reloaded(&self) -> bool {
        self.outcome == RefreshOutcome::Reloaded
    }

    fn skip(mut self, reason: impl Into<String>) -> Self {
        self.outcome = RefreshOutcome::Skipped {
            reason: reason.into(),
        };
        self
    }

    fn fail(mut self, error: RefreshError) -> Self {
        self.outcome = RefreshOutcome::Failed {
            reason: error.to_string(),
        };
        self
    }
}

pub struct DiagnosticsRefresher {
    changes: Arc<dyn ChangeSource>,
    config: RefreshConfig,
}

impl DiagnosticsRefresher {
    pub fn new(changes: Arc<dyn ChangeSource>, config: RefreshConfig) -> Self {
        Self { changes, config }
    }

    #[instrument(name = "refresh", skip_all, fields(workspace = %workspace))]
    pub async fn refresh(
        &self,
        session: &dyn RemoteSession,
        workspace: &str,
        scoped: &ScopedFiles,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let start = Instant::now();
        let report = if scoped.requested {
            self.refresh_explicit(session, scoped, cancel).await
        } else {
            self.refresh_inferred(session, workspace, cancel).await
        };

        match &report.outcome {
            RefreshOutcome::Reloaded => info!(
                targets = report.targets.len(),
                capped = report.capped,
                "Reloaded files and notified language servers"
            ),
            RefreshOutcome::Skipped { reason } => info!("Refresh skipped: {}", reason),
            RefreshOutcome::Failed { reason } => {
                warn!("Refresh failed, using existing diagnostics: {}", reason)
            }
        }
        log_timing!(Level::DEBUG, "refresh", start.elapsed());
        report
    }

    async fn refresh_explicit(
        &self,
        session: &dyn RemoteSession,
        scoped: &ScopedFiles,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let report = RefreshReport::new(TargetSource::Explicit, scoped.rejected);
        if scoped.files.is_empty() {
            return report.skip("no requested file is inside the workspace");
        }
        self.reload(session, scoped.files.clone(), report, cancel).await
    }

    async fn refresh_inferred(
        &self,
        session: &dyn RemoteSession,
        workspace: &str,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let mut report = RefreshReport::new(TargetSource::Inferred, 0);

        let changed = tokio::select! {
            _ = cancel.cancelled() => Err(RefreshError::Cancelled),
            changed = self.changes.changed_files(Path::new(workspace)) => changed,
        };
        let changed: Vec<String> = match changed {
            Ok(paths) => paths
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            Err(e) => return report.fail(e),
        };
        debug!("{} changed files before filetype filtering", changed.len());
        if changed.is_empty() {
            return report.skip("no changed files");
        }

        let supported = match self.filter_supported(session, changed).await {
            Ok(supported) => supported,
            Err(e) => return report.fail(e),
        };
        report.unsupported = supported.unsupported;
        if supported.unsupported > 0 {
            debug!(
                "{} changed files have no attached language server",
                supported.unsupported
            );
        }
        if supported.supported.is_empty() {
            return report.skip("no changed file is handled by a language server");
        }

        self.reload(session, supported.supported, report, cancel).await
    }

    async fn filter_supported(
        &self,
        session: &dyn RemoteSession,
        files: Vec<String>,
    ) -> Result<SupportedFiles, RefreshError> {
        let args = vec![
            string_array(files),
            string_array(self.config.ambiguous_extensions.clone()),
        ];
        let value = session
            .exec_lua(scripts::FILTER_SUPPORTED_FILES, args)
            .await
            .map_err(RefreshError::Filter)?;
        let text = api::optional_string("nvim_exec_lua", value)
            .map_err(RefreshError::Filter)?
            .ok_or_else(|| RefreshError::FilterDecode("script returned nil".to_string()))?;

        let supported: SupportedFiles = serde_json::from_str(&text)
            .map_err(|e| RefreshError::FilterDecode(e.to_string()))?;
        if supported.version != scripts::SCRIPT_PROTOCOL_VERSION {
            return Err(RefreshError::ProtocolVersion {
                expected: scripts::SCRIPT_PROTOCOL_VERSION,
                actual: supported.version,
            });
        }
        Ok(supported)
    }

    /// Apply the cap, then reload
    async fn reload(
        &self,
        session: &dyn RemoteSession,
        mut targets: Vec<String>,
        mut report: RefreshReport,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let max = self.config.max_files;
        if targets.len() > max {
            report.capped = true;
            match self.config.cap_policy {
                CapPolicy::Skip => {
                    let reason = format!("too many files to reload ({} > {})", targets.len(), max);
                    report.targets = targets;
                    return report.skip(reason);
                }
                CapPolicy::Truncate => {
                    warn!("Reloading only the first {} of {} files", max, targets.len());
                    targets.truncate(max);
                }
            }
        }

        if cancel.is_cancelled() {
            report.targets = targets;
            return report.fail(RefreshError::Cancelled);
        }

        let result = session
            .exec_lua(scripts::RELOAD_AND_NOTIFY, vec![string_array(targets.clone())])
            .await;
        report.targets = targets;
        match result {
            Ok(_) => {
                report.outcome = RefreshOutcome::Reloaded;
                report
            }
            Err(e) => report.fail(RefreshError::Reload(e)),
        }
    }
}

fn string_array(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::from).collect())
}
