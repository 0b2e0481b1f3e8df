//! Test doubles for the diagnostics pipeline

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::diagnostics::changes::ChangeSource;
use crate::diagnostics::error::RefreshError;

/// Change source with a canned answer; records the workspaces it was asked about
#[derive(Debug, Clone)]
pub struct FakeChangeSource {
    files: Result<Vec<PathBuf>, String>,
    queried: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeChangeSource {
    pub fn with_files(files: &[&str]) -> Self {
        Self {
            files: Ok(files.iter().map(PathBuf::from).collect()),
            queried: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            files: Err(stderr.to_string()),
            queried: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queried(&self) -> Vec<PathBuf> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeSource for FakeChangeSource {
    async fn changed_files(&self, workspace: &Path) -> Result<Vec<PathBuf>, RefreshError> {
        self.queried.lock().unwrap().push(workspace.to_path_buf());
        self.files.clone().map_err(|stderr| RefreshError::GitFailed {
            status: "exit status: 128".to_string(),
            stderr,
        })
    }
}
