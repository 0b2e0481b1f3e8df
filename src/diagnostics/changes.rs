//! Changed-file detection for inferred refresh targets

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::diagnostics::error::RefreshError;

/// Source of "files changed in this workspace"
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Absolute paths of changed files under `workspace`
    async fn changed_files(&self, workspace: &Path) -> Result<Vec<PathBuf>, RefreshError>;
}

/// Uncommitted changes (staged and unstaged) against `HEAD`, via git
#[derive(Debug, Clone)]
pub struct GitDiff {
    git: String,
}

impl Default for GitDiff {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitDiff {
    pub fn new(git: impl Into<String>) -> Self {
        Self { git: git.into() }
    }
}

#[async_trait]
impl ChangeSource for GitDiff {
    async fn changed_files(&self, workspace: &Path) -> Result<Vec<PathBuf>, RefreshError> {
        // --relative scopes the diff to the workspace and prints paths relative to it
        let output = Command::new(&self.git)
            .args([
                "diff",
                "--name-only",
                "--relative",
                "--diff-filter=d",
                "-z",
                "HEAD",
            ])
            .current_dir(workspace)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RefreshError::GitSpawn)?;

        if !output.status.success() {
            return Err(RefreshError::GitFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let files = parse_name_list(workspace, &output.stdout);
        debug!("git diff reported {} changed files", files.len());
        Ok(files)
    }
}

/// Split NUL-separated relative names and anchor them at `workspace`
fn parse_name_list(workspace: &Path, stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|byte| *byte == 0)
        .map(String::from_utf8_lossy)
        .filter(|name| !name.trim().is_empty())
        .map(|name| workspace.join(name.as_ref()))
        .collect()
}
