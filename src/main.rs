mod config;
mod diagnostics;
mod error;
mod locator;
mod logging;
mod mcp_server;
mod nvim;
mod pipeline;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use config::{CapPolicy, OutputMode, ServerConfig, SettleMode};
use diagnostics::GitDiff;
use logging::{LogConfig, init_logging};
use mcp_server::LintServerHandler;
use nvim::SocketConnector;
use pipeline::DiagnosticsPipeline;

use rmcp::service::serve_server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{stdin, stdout};
use tracing::info;

/// CLI arguments for the Neovim diagnostics MCP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Neovim RPC address tried before discovery (overrides NVIM_LISTEN_ADDRESS env var)
    #[arg(long, value_name = "ADDR")]
    address: Option<String>,

    /// Temporary directory scanned for Neovim sockets (overrides TMPDIR env var)
    #[arg(long, value_name = "DIR")]
    tmp_dir: Option<PathBuf>,

    /// Only scan TMPDIR and XDG_RUNTIME_DIR for sockets, not /tmp and OS-wide locations
    #[arg(long)]
    no_system_dirs: bool,

    /// Maximum number of files reloaded per request (overrides NVIM_MCP_MAX_FILES env var)
    #[arg(long, value_name = "N")]
    max_files: Option<usize>,

    /// Behaviour when the reload target set exceeds --max-files
    #[arg(long, value_name = "POLICY", default_value = "skip")]
    cap_policy: CapPolicy,

    /// Output format: text or json (overrides NVIM_MCP_OUTPUT env var)
    #[arg(long, value_name = "FORMAT")]
    output: Option<OutputMode>,

    /// Wait after reloading before diagnostics are read, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = config::DEFAULT_SETTLE_MS)]
    settle_ms: u64,

    /// Settle strategy: fixed sleep or poll until diagnostics stop changing
    #[arg(long, value_name = "MODE", default_value = "fixed")]
    settle_mode: SettleMode,

    /// Timeout for each Neovim RPC call, in seconds
    #[arg(long, value_name = "SECS", default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Extension whose filetype detection is never cached (repeatable)
    #[arg(long = "ambiguous-ext", value_name = "EXT")]
    ambiguous_ext: Vec<String>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides MCP_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Resolve the override address from CLI args and environment
fn resolve_address(address_arg: Option<String>) -> Option<String> {
    // Priority: CLI arg > NVIM_LISTEN_ADDRESS env var > none
    address_arg.or_else(|| env_var("NVIM_LISTEN_ADDRESS"))
}

fn resolve_tmp_dir(tmp_dir_arg: Option<PathBuf>) -> PathBuf {
    tmp_dir_arg
        .or_else(|| env_var("TMPDIR").map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir)
}

fn resolve_max_files(max_files_arg: Option<usize>) -> Result<usize, config::ConfigError> {
    match (max_files_arg, env_var("NVIM_MCP_MAX_FILES")) {
        (Some(max_files), _) => Ok(max_files),
        (None, Some(value)) => value.trim().parse().map_err(|_| {
            config::ConfigError::invalid("NVIM_MCP_MAX_FILES", &value, "expected a positive integer")
        }),
        (None, None) => Ok(config::DEFAULT_MAX_FILES),
    }
}

fn resolve_output(output_arg: Option<OutputMode>) -> Result<OutputMode, config::ConfigError> {
    match (output_arg, env_var("NVIM_MCP_OUTPUT")) {
        (Some(output), _) => Ok(output),
        (None, Some(value)) => value.parse(),
        (None, None) => Ok(OutputMode::default()),
    }
}

fn build_config(args: Args) -> Result<ServerConfig, config::ConfigError> {
    let mut builder = ServerConfig::builder()
        .override_address(resolve_address(args.address))
        .tmp_dir(resolve_tmp_dir(args.tmp_dir))
        .runtime_dir(env_var("XDG_RUNTIME_DIR").map(PathBuf::from))
        .scan_system_dirs(!args.no_system_dirs)
        .max_files(resolve_max_files(args.max_files)?)
        .cap_policy(args.cap_policy)
        .output(resolve_output(args.output)?)
        .settle_duration(Duration::from_millis(args.settle_ms))
        .settle_mode(args.settle_mode)
        .request_timeout(Duration::from_secs(args.request_timeout_secs));

    if !args.ambiguous_ext.is_empty() {
        builder = builder.ambiguous_extensions(args.ambiguous_ext);
    }

    builder.build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with configuration from env vars and CLI args
    let log_config = LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Starting Neovim diagnostics MCP Server (override address: {:?}, tmp dir: {}, output: {:?})",
        config.discovery.override_address,
        config.discovery.tmp_dir.display(),
        config.output
    );

    let pipeline = DiagnosticsPipeline::from_config(
        &config,
        Arc::new(SocketConnector::new(config.request_timeout)),
        Arc::new(GitDiff::default()),
    );
    let handler = LintServerHandler::new(pipeline);

    // Create stdio transport
    let transport = (stdin(), stdout());

    info!("Neovim diagnostics MCP Server ready and listening for requests");

    let server = serve_server(handler, transport).await?;

    // Wait for server to finish
    let quit_reason = server.waiting().await?;
    info!("Server shutdown: {:?}", quit_reason);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("nvim-lsp-mcp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_system_dirs_scanned_by_default() {
        let config = build_config(parse(&["--tmp-dir", "/tmp/x"])).unwrap();
        assert!(config.discovery.scan_system_dirs);
    }

    #[test]
    fn test_no_system_dirs_flag() {
        let config = build_config(parse(&["--tmp-dir", "/tmp/x", "--no-system-dirs"])).unwrap();
        assert!(!config.discovery.scan_system_dirs);
        assert_eq!(config.discovery.tmp_dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_flags_build_validated_config() {
        let config = build_config(parse(&[
            "--cap-policy",
            "truncate",
            "--settle-mode",
            "poll",
            "--settle-ms",
            "500",
            "--ambiguous-ext",
            "h",
            "--ambiguous-ext",
            ".inc",
        ]))
        .unwrap();
        assert_eq!(config.refresh.cap_policy, CapPolicy::Truncate);
        assert!(matches!(
            config.settle,
            config::SettlePolicy::Poll { timeout, .. } if timeout == Duration::from_millis(500)
        ));
        assert_eq!(config.refresh.ambiguous_extensions, vec!["h", "inc"]);

        assert!(build_config(parse(&["--settle-ms", "999999"])).is_err());
    }
}
