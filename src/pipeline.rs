//! The `read-lints` request pipeline
//!
//! `Idle → Locating → Validating → Refreshing → Collecting → Formatting → Done`,
//! with `Error` reachable from every stage except `Refreshing`. The located
//! session is closed on every path out of the pipeline.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info_span, warn};
use uuid::Uuid;

use crate::config::{OutputMode, ServerConfig, SettlePolicy};
use crate::diagnostics::changes::ChangeSource;
use crate::diagnostics::refresh::{DiagnosticsRefresher, ScopedFiles};
use crate::diagnostics::settle::{self, SettleOutcome};
use crate::diagnostics::{collector, format};
use crate::error::ReadLintsError;
use crate::locator::{self, SessionLocator};
use crate::log_timing;
use crate::nvim::{Connector, RemoteSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Locating,
    Validating,
    Refreshing,
    Collecting,
    Formatting,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Locating => "locating",
            Stage::Validating => "validating",
            Stage::Refreshing => "refreshing",
            Stage::Collecting => "collecting",
            Stage::Formatting => "formatting",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct StageTracker {
    current: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Stage::Idle,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = %self.current, to = %next, "Stage transition");
        self.current = next;
    }
}

/// A validated `read-lints` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintRequest {
    pub workspace: String,
    pub files: Vec<String>,
}

impl LintRequest {
    pub fn new(workspace: String, files: Vec<String>) -> Result<Self, ReadLintsError> {
        if workspace.trim().is_empty() {
            return Err(ReadLintsError::MissingWorkspace);
        }
        if !Path::new(&workspace).is_absolute() {
            return Err(ReadLintsError::RelativeWorkspace(workspace));
        }
        Ok(Self { workspace, files })
    }
}

pub struct DiagnosticsPipeline {
    locator: SessionLocator,
    refresher: DiagnosticsRefresher,
    settle: SettlePolicy,
    output: OutputMode,
}

impl DiagnosticsPipeline {
    pub fn new(
        locator: SessionLocator,
        refresher: DiagnosticsRefresher,
        settle: SettlePolicy,
        output: OutputMode,
    ) -> Self {
        Self {
            locator,
            refresher,
            settle,
            output,
        }
    }

    pub fn from_config(
        config: &ServerConfig,
        connector: Arc<dyn Connector>,
        changes: Arc<dyn ChangeSource>,
    ) -> Self {
        Self::new(
            SessionLocator::new(connector, config.discovery.clone()),
            DiagnosticsRefresher::new(changes, config.refresh.clone()),
            config.settle,
            config.output,
        )
    }

    /// Run one request end to end and return the rendered diagnostics
    pub async fn run(
        &self,
        request: &LintRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ReadLintsError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("read_lints", %request_id, workspace = %request.workspace);

        async move {
            let start = Instant::now();
            let mut stage = StageTracker::new();
            let result = self.execute(request, cancel, &mut stage).await;
            match &result {
                Ok(_) => stage.advance(Stage::Done),
                Err(e) => {
                    warn!("Request failed in stage {}: {}", stage.current, e);
                    stage.advance(Stage::Error);
                }
            }
            log_timing!(Level::DEBUG, "read_lints", start.elapsed());
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &LintRequest,
        cancel: &CancellationToken,
        stage: &mut StageTracker,
    ) -> Result<String, ReadLintsError> {
        stage.advance(Stage::Locating);
        let located = self.locator.locate(&request.workspace, cancel).await?;

        stage.advance(Stage::Validating);
        let session = locator::validate(located, &request.workspace).await?;

        let result = self
            .with_session(session.as_ref(), request, cancel, stage)
            .await;
        session.close().await;
        result
    }

    async fn with_session(
        &self,
        session: &dyn RemoteSession,
        request: &LintRequest,
        cancel: &CancellationToken,
        stage: &mut StageTracker,
    ) -> Result<String, ReadLintsError> {
        stage.advance(Stage::Refreshing);
        let scoped = ScopedFiles::new(&request.workspace, &request.files);
        let report = self
            .refresher
            .refresh(session, &request.workspace, &scoped, cancel)
            .await;
        debug!(
            source = ?report.source,
            targets = report.targets.len(),
            rejected_outside = report.rejected_outside,
            unsupported = report.unsupported,
            capped = report.capped,
            "Refresh finished"
        );
        if report.reloaded() {
            let outcome = settle::settle(session, &self.settle, &report.targets, cancel).await;
            if outcome != SettleOutcome::Cancelled {
                debug!(?outcome, "Settle finished");
            }
        }

        stage.advance(Stage::Collecting);
        if cancel.is_cancelled() {
            return Err(ReadLintsError::Cancelled);
        }
        let results = collector::collect(session, scoped.collection_filter(), cancel).await?;

        stage.advance(Stage::Formatting);
        Ok(format::render(&results, self.output)?)
    }
}
