//! Neovim diagnostics MCP Server Handler
//!
//! Implements the rmcp 0.12 ServerHandler trait manually, with explicit tool
//! listing and routing by tool name.

use rmcp::{
    ErrorData,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    service::RoleServer,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use super::tools::read_lints::ReadLintsTool;
use crate::log_mcp_message;
use crate::log_timing;
use crate::pipeline::DiagnosticsPipeline;

type JsonObject = serde_json::Map<String, serde_json::Value>;

pub const READ_LINTS_TOOL: &str = "read-lints";

/// Routes MCP tool calls to the diagnostics pipeline
#[derive(Clone)]
pub struct LintServerHandler {
    pipeline: Arc<DiagnosticsPipeline>,
}

impl LintServerHandler {
    pub fn new(pipeline: DiagnosticsPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Handle read-lints tool call
    async fn handle_read_lints(
        &self,
        arguments: String,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        let start = Instant::now();
        log_mcp_message!(Level::INFO, "incoming", READ_LINTS_TOOL, &arguments);

        let params: ReadLintsTool = serde_json::from_str(&arguments).map_err(|e| {
            ErrorData::invalid_params(format!("Failed to parse arguments: {}", e), None)
        })?;

        let result = params.call_tool(&self.pipeline, &cancel).await;

        match &result {
            Ok(result) => log_mcp_message!(Level::INFO, "outgoing", READ_LINTS_TOOL, result),
            Err(error) => log_mcp_message!(Level::WARN, "outgoing", READ_LINTS_TOOL, error),
        }
        log_timing!(Level::DEBUG, READ_LINTS_TOOL, start.elapsed());

        result
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: String,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        match name {
            READ_LINTS_TOOL => self.handle_read_lints(arguments, cancel).await,
            _ => Err(ErrorData::invalid_params(
                format!("Unknown tool: {}", name),
                None,
            )),
        }
    }
}

/// Tools advertised by this server
pub fn tool_definitions() -> Vec<Tool> {
    fn to_json_object(value: serde_json::Value) -> Arc<JsonObject> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(JsonObject::new()),
        }
    }

    vec![Tool::new(
        READ_LINTS_TOOL,
        "Read current LSP diagnostics (errors, warnings, hints) from the running Neovim session whose working directory is the workspace. Target files are reloaded from disk and language servers are notified before collecting. Without `files`, files changed since HEAD (git) are refreshed and all open buffers are reported.",
        to_json_object(serde_json::json!({
            "type": "object",
            "properties": {
                "workspace": {
                    "type": "string",
                    "description": "Absolute workspace path. Must equal the Neovim session's current working directory."
                },
                "files": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional absolute file paths inside the workspace. Limits refresh and output to these files."
                }
            },
            "required": ["workspace"]
        })),
    )]
}

impl ServerHandler for LintServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Neovim LSP diagnostics MCP Server - Reads lint and compiler diagnostics from an already running Neovim instance. Call read-lints with the absolute workspace path that Neovim was started in.".into()
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    #[allow(refining_impl_trait)]
    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Pin<Box<dyn Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_>> {
        let tools = tool_definitions();

        Box::pin(async move {
            Ok(ListToolsResult {
                tools,
                ..Default::default()
            })
        })
    }

    #[allow(refining_impl_trait)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult, ErrorData>> + Send + '_>> {
        let name = request.name.clone();
        // Convert Option<JsonObject> to String for JSON parsing
        let arguments = match request.arguments {
            Some(obj) => serde_json::to_string(&obj).unwrap_or_else(|_| "{}".to_string()),
            None => "{}".to_string(),
        };
        let cancel = context.ct.clone();
        let handler = self.clone();

        Box::pin(async move { handler.dispatch(name.as_ref(), arguments, cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::diagnostics::testing::FakeChangeSource;
    use crate::nvim::testing::{FakeBuffer, FakeConnector, FakeNeovim};
    use rmcp::model::{ErrorCode, RawContent, RawTextContent};
    use std::time::Duration;
    use tempfile::TempDir;

    const ADDRESS: &str = "127.0.0.1:7777";

    fn handler(session: &FakeNeovim, tmp: &TempDir) -> LintServerHandler {
        let config = ServerConfig::builder()
            .override_address(Some(ADDRESS.to_string()))
            .tmp_dir(tmp.path())
            .scan_system_dirs(false)
            .settle_duration(Duration::ZERO)
            .build()
            .unwrap();
        let connector = FakeConnector::new().with_session(session.clone());
        LintServerHandler::new(DiagnosticsPipeline::from_config(
            &config,
            Arc::new(connector),
            Arc::new(FakeChangeSource::with_files(&[])),
        ))
    }

    fn text(result: &CallToolResult) -> String {
        match result.content.first().map(|c| &c.raw) {
            Some(RawContent::Text(RawTextContent { text, .. })) => text.clone(),
            _ => panic!("Expected TextContent in call_result"),
        }
    }

    #[test]
    fn test_tool_definitions() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, READ_LINTS_TOOL);
        assert_eq!(
            tools[0].input_schema.get("required"),
            Some(&serde_json::json!(["workspace"]))
        );
    }

    #[tokio::test]
    async fn test_read_lints_call() {
        let tmp = TempDir::new().unwrap();
        let session = FakeNeovim::new(ADDRESS, "/repo").with_buffer(
            FakeBuffer::named(1, "/repo/a.go").with_diagnostics(
                r#"[{"lnum":4,"col":2,"severity":1,"message":"undefined: foo"}]"#,
            ),
        );

        let result = handler(&session, &tmp)
            .dispatch(
                READ_LINTS_TOOL,
                r#"{"workspace":"/repo","files":["/repo/a.go"]}"#.to_string(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(text(&result), "/repo/a.go:5:3: ERROR: undefined: foo");
    }

    #[tokio::test]
    async fn test_blank_workspace_rejected_before_connecting() {
        let tmp = TempDir::new().unwrap();
        let session = FakeNeovim::new(ADDRESS, "/repo");

        let err = handler(&session, &tmp)
            .dispatch(
                READ_LINTS_TOOL,
                r#"{"workspace":"   "}"#.to_string(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let tmp = TempDir::new().unwrap();
        let session = FakeNeovim::new(ADDRESS, "/repo");

        let err = handler(&session, &tmp)
            .dispatch(
                READ_LINTS_TOOL,
                r#"{"workspace":"/repo","files":"a.go"}"#.to_string(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Failed to parse arguments"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let tmp = TempDir::new().unwrap();
        let session = FakeNeovim::new(ADDRESS, "/repo");

        let err = handler(&session, &tmp)
            .dispatch("search_symbols", "{}".to_string(), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Unknown tool"));
    }
}
