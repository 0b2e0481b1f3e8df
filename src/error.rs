//! Request-level errors of the `read-lints` tool

use rmcp::ErrorData;
use thiserror::Error;

use crate::diagnostics::error::{CollectError, FormatError};
use crate::locator::LocateError;

#[derive(Debug, Error)]
pub enum ReadLintsError {
    #[error("workspace is required")]
    MissingWorkspace,

    #[error("workspace must be an absolute path, got {0}")]
    RelativeWorkspace(String),

    #[error("failed to attach to Neovim: {0}")]
    Locate(#[from] LocateError),

    #[error("failed to collect diagnostics: {0}")]
    Collect(#[from] CollectError),

    #[error("failed to render diagnostics: {0}")]
    Format(#[from] FormatError),

    #[error("request was cancelled")]
    Cancelled,
}

impl From<ReadLintsError> for ErrorData {
    fn from(error: ReadLintsError) -> Self {
        match &error {
            ReadLintsError::MissingWorkspace
            | ReadLintsError::RelativeWorkspace(_)
            | ReadLintsError::Locate(LocateError::Validation { .. }) => {
                ErrorData::invalid_params(error.to_string(), None)
            }
            _ => ErrorData::internal_error(error.to_string(), None),
        }
    }
}
