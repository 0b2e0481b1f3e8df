//! Server configuration
//!
//! All knobs are resolved once at startup (CLI > environment > default) into a
//! [`ServerConfig`] that is handed to the locator and the diagnostics pipeline.
//! Nothing below reads the environment mid-request.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default cap on files reloaded by one refresh
pub const DEFAULT_MAX_FILES: usize = 100;

/// Default settle interval after a reload (3 seconds)
pub const DEFAULT_SETTLE_MS: u64 = 3000;

/// Maximum settle interval (1 minute)
pub const MAX_SETTLE_MS: u64 = 60_000;

/// Default timeout for individual RPC calls (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum timeout for individual RPC calls (5 minutes)
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Interval between diagnostic stamp polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Consecutive unchanged stamps required before diagnostics count as settled
pub const DEFAULT_QUIET_POLLS: u32 = 2;

/// Extensions shared by several filetypes; never cached during detection
pub const DEFAULT_AMBIGUOUS_EXTENSIONS: &[&str] =
    &["h", "m", "pl", "v", "inc", "conf", "cfg", "tpl"];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Option Enums
// ============================================================================

/// Rendering of the collected diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// `file:line:col: SEVERITY: message` lines
    #[default]
    Text,
    /// Grouped JSON with zero-based positions
    Json,
}

impl FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid("output", s, "expected 'text' or 'json'")),
        }
    }
}

/// What to do when the refresh target set exceeds the file cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
    /// Skip the reload entirely
    #[default]
    Skip,
    /// Reload only the first `max_files` targets
    Truncate,
}

impl FromStr for CapPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "truncate" => Ok(Self::Truncate),
            _ => Err(ConfigError::invalid(
                "cap-policy",
                s,
                "expected 'skip' or 'truncate'",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettleMode {
    #[default]
    Fixed,
    Poll,
}

impl FromStr for SettleMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "poll" => Ok(Self::Poll),
            _ => Err(ConfigError::invalid(
                "settle-mode",
                s,
                "expected 'fixed' or 'poll'",
            )),
        }
    }
}

/// How long to wait after a reload before collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a constant duration
    Fixed(Duration),
    /// Poll the diagnostic stamp until it stops changing
    Poll {
        interval: Duration,
        quiet_polls: u32,
        timeout: Duration,
    },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(DEFAULT_SETTLE_MS))
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Inputs for session discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Address tried before any discovered socket
    pub override_address: Option<String>,
    /// Generic temporary directory (`TMPDIR` or the OS default)
    pub tmp_dir: PathBuf,
    /// Per-user runtime directory (`XDG_RUNTIME_DIR`)
    pub runtime_dir: Option<PathBuf>,
    /// Also scan the OS-wide socket locations (`/var/folders`, `/run/user`)
    pub scan_system_dirs: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            override_address: None,
            tmp_dir: std::env::temp_dir(),
            runtime_dir: None,
            scan_system_dirs: true,
        }
    }
}

/// Inputs for the refresh step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub max_files: usize,
    pub cap_policy: CapPolicy,
    pub ambiguous_extensions: Vec<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            cap_policy: CapPolicy::default(),
            ambiguous_extensions: DEFAULT_AMBIGUOUS_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub discovery: DiscoveryConfig,
    pub refresh: RefreshConfig,
    pub settle: SettlePolicy,
    pub output: OutputMode,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            refresh: RefreshConfig::default(),
            settle: SettlePolicy::default(),
            output: OutputMode::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for ServerConfig with validation and defaults
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    override_address: Option<String>,
    tmp_dir: Option<PathBuf>,
    runtime_dir: Option<PathBuf>,
    scan_system_dirs: Option<bool>,
    max_files: Option<usize>,
    cap_policy: Option<CapPolicy>,
    ambiguous_extensions: Option<Vec<String>>,
    settle_duration: Option<Duration>,
    settle_mode: Option<SettleMode>,
    output: Option<OutputMode>,
    request_timeout: Option<Duration>,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address tried before discovery; blank values are ignored
    pub fn override_address(mut self, address: Option<String>) -> Self {
        self.override_address = address.filter(|address| !address.trim().is_empty());
        self
    }

    pub fn tmp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(path.into());
        self
    }

    pub fn runtime_dir(mut self, path: Option<PathBuf>) -> Self {
        self.runtime_dir = path;
        self
    }

    pub fn scan_system_dirs(mut self, enabled: bool) -> Self {
        self.scan_system_dirs = Some(enabled);
        self
    }

    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    pub fn cap_policy(mut self, policy: CapPolicy) -> Self {
        self.cap_policy = Some(policy);
        self
    }

    pub fn ambiguous_extensions(mut self, extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ambiguous_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Fixed wait, or the polling budget in poll mode
    pub fn settle_duration(mut self, duration: Duration) -> Self {
        self.settle_duration = Some(duration);
        self
    }

    pub fn settle_mode(mut self, mode: SettleMode) -> Self {
        self.settle_mode = Some(mode);
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = Some(output);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();

        let max_files = self.max_files.unwrap_or(DEFAULT_MAX_FILES);
        if max_files == 0 {
            return Err(ConfigError::invalid(
                "max-files",
                max_files,
                "must be greater than zero",
            ));
        }

        let settle_duration = self
            .settle_duration
            .unwrap_or(Duration::from_millis(DEFAULT_SETTLE_MS));
        if settle_duration > Duration::from_millis(MAX_SETTLE_MS) {
            return Err(ConfigError::invalid(
                "settle-ms",
                settle_duration.as_millis(),
                format!("must not exceed {MAX_SETTLE_MS}"),
            ));
        }

        let request_timeout = self.request_timeout.unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero()
            || request_timeout > Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS)
        {
            return Err(ConfigError::invalid(
                "request-timeout-secs",
                request_timeout.as_secs(),
                format!("must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"),
            ));
        }

        let ambiguous_extensions = match self.ambiguous_extensions {
            Some(extensions) => Self::normalize_extensions(extensions)?,
            None => defaults.refresh.ambiguous_extensions,
        };

        let settle = match self.settle_mode.unwrap_or_default() {
            SettleMode::Fixed => SettlePolicy::Fixed(settle_duration),
            SettleMode::Poll => SettlePolicy::Poll {
                interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                quiet_polls: DEFAULT_QUIET_POLLS,
                timeout: settle_duration,
            },
        };

        Ok(ServerConfig {
            discovery: DiscoveryConfig {
                override_address: self.override_address,
                tmp_dir: self.tmp_dir.unwrap_or(defaults.discovery.tmp_dir),
                runtime_dir: self.runtime_dir,
                scan_system_dirs: self
                    .scan_system_dirs
                    .unwrap_or(defaults.discovery.scan_system_dirs),
            },
            refresh: RefreshConfig {
                max_files,
                cap_policy: self.cap_policy.unwrap_or_default(),
                ambiguous_extensions,
            },
            settle,
            output: self.output.unwrap_or_default(),
            request_timeout,
        })
    }

    /// Accept `h` and `.h`; reject blanks
    fn normalize_extensions(extensions: Vec<String>) -> Result<Vec<String>, ConfigError> {
        extensions
            .into_iter()
            .map(|ext| {
                let trimmed = ext.trim().trim_start_matches('.');
                if trimmed.is_empty() {
                    Err(ConfigError::invalid(
                        "ambiguous-ext",
                        format!("{ext:?}"),
                        "extension cannot be empty",
                    ))
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect()
    }
}
