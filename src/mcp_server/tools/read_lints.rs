//! The `read-lints` tool

use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::pipeline::{DiagnosticsPipeline, LintRequest};

/// Read the current LSP diagnostics of a running Neovim session.
///
/// The session is the one whose working directory equals `workspace`. Before
/// collecting, the target files are reloaded from disk and attached language
/// servers are told they were saved, so results reflect what is on disk:
///
/// - with `files`: those files (only the ones inside `workspace`) are
///   refreshed, and only their diagnostics are returned
/// - without `files`: files changed according to `git diff HEAD` are
///   refreshed, and diagnostics of every open buffer are returned
///
/// Output is either `file:line:col: SEVERITY: message` lines or grouped JSON,
/// depending on server configuration.
#[derive(Debug, ::serde::Deserialize, ::serde::Serialize)]
pub struct ReadLintsTool {
    /// Absolute workspace path; must equal Neovim's `getcwd()`
    #[serde(default)]
    pub workspace: String,

    /// Optional absolute file paths to refresh and report
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl ReadLintsTool {
    #[instrument(name = "read_lints", skip(self, pipeline, cancel), fields(files = self.files.len()))]
    pub async fn call_tool(
        &self,
        pipeline: &DiagnosticsPipeline,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        let request = LintRequest::new(self.workspace.clone(), self.files.clone())?;
        let output = pipeline.run(&request, cancel).await?;
        if output.is_empty() {
            info!("No diagnostics reported for {}", request.workspace);
        }
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}
