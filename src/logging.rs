//! Diagnostics for the server itself, never written to stdout

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `nvim_lsp_mcp::nvim=trace`
    pub level: String,
    /// Append logs here instead of stderr
    pub file_path: Option<PathBuf>,
    pub json_format: bool,
    /// Suffix the log file name with the process id
    pub unique_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            json_format: false,
            unique_file: false,
        }
    }
}

impl LogConfig {
    /// `RUST_LOG`, `MCP_LOG_FILE`, `MCP_LOG_JSON`, `MCP_LOG_UNIQUE`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name).is_some_and(|value| matches!(value.trim(), "1" | "true"))
        };
        Self {
            level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            file_path: lookup("MCP_LOG_FILE").map(PathBuf::from),
            json_format: flag("MCP_LOG_JSON"),
            unique_file: flag("MCP_LOG_UNIQUE"),
        }
    }

    /// CLI values win over the environment
    pub fn with_overrides(mut self, level: Option<String>, file_path: Option<PathBuf>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if let Some(file_path) = file_path {
            self.file_path = Some(file_path);
        }
        self
    }

    /// File actually written, with the pid suffix applied when requested
    pub fn resolved_file(&self) -> Option<PathBuf> {
        let path = self.file_path.as_ref()?;
        Some(if self.unique_file {
            unique_log_path(path, std::process::id())
        } else {
            path.clone()
        })
    }
}

/// Insert the process id before the extension: `server.log` -> `server.<pid>.log`
fn unique_log_path(path: &Path, pid: u32) -> PathBuf {
    let Some(stem) = path.file_stem() else {
        return path.to_path_buf();
    };
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    let unique_filename = if extension.is_empty() {
        format!("{}.{}", stem.to_string_lossy(), pid)
    } else {
        format!("{}.{}.{}", stem.to_string_lossy(), pid, extension)
    };
    path.with_file_name(unique_filename)
}

/// Install the global subscriber.
///
/// stdout carries the MCP protocol, so without a log file everything goes to
/// stderr. Log files are opened in append mode.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("info"))?;

    let (writer, ansi) = match config.resolved_file() {
        Some(file_path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;
            (BoxMakeWriter::new(file), false)
        }
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);
    if config.json_format {
        subscriber
            .with(fmt::layer().json().with_writer(writer).with_ansi(false))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }

    Ok(())
}

/// One line per MCP tool call or result
#[macro_export]
macro_rules! log_mcp_message {
    ($level:expr, $direction:expr, $tool:expr, $data:expr) => {
        tracing::event!(
            $level,
            direction = $direction,
            tool = $tool,
            data = ?$data,
            "MCP message"
        )
    };
}

/// One line per Neovim RPC request or response
#[macro_export]
macro_rules! log_rpc_message {
    ($level:expr, $direction:expr, $method:expr, $data:expr) => {
        tracing::event!(
            $level,
            direction = $direction,
            rpc_method = $method,
            data = ?$data,
            "RPC message"
        );
    };
}

#[macro_export]
macro_rules! log_timing {
    ($level:expr, $operation:expr, $duration:expr) => {
        tracing::event!(
            $level,
            operation = $operation,
            elapsed_ms = $duration.as_millis(),
            "Timing"
        );
    };
}
