//! Test utilities and global setup
//!
//! Provides centralized test logging configuration.

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG`, defaulting to debug for this crate and info for
    /// the async runtime. Output goes through the test writer so it is only
    /// shown for failing tests.
    ///
    /// ```bash
    /// RUST_LOG=nvim_lsp_mcp::diagnostics=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info,rmcp=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok();
        });
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        tracing::debug!("test logging initialized");
    }
}

/// Auto-initialize test logging for every test in the invoking module
#[cfg(all(test, feature = "test-logging"))]
#[macro_export]
macro_rules! setup_test_logging {
    () => {
        #[ctor::ctor]
        fn init_test_logging() {
            $crate::test_utils::logging::init();
        }
    };
}

/// Helpers for tests that drive a real headless Neovim
#[cfg(all(test, feature = "nvim-integration-tests"))]
pub mod integration {
    use std::path::{Path, PathBuf};
    use std::process::Stdio;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::process::{Child, Command};

    /// Neovim binary for integration tests (`NVIM_PATH` or `nvim`)
    pub fn nvim_path() -> String {
        std::env::var("NVIM_PATH").unwrap_or_else(|_| "nvim".to_string())
    }

    /// A headless Neovim listening on a socket inside a temporary workspace
    pub struct HeadlessNvim {
        _temp_dir: TempDir,
        pub workspace: PathBuf,
        pub address: String,
        child: Child,
    }

    impl HeadlessNvim {
        pub async fn start() -> Result<Self, std::io::Error> {
            let temp_dir = TempDir::new()?;
            let workspace = temp_dir.path().join("workspace");
            std::fs::create_dir_all(&workspace)?;
            let socket = temp_dir.path().join("nvim.sock");
            let address = socket.to_string_lossy().into_owned();

            let child = Command::new(nvim_path())
                .args(["--headless", "--clean", "--listen", &address])
                .current_dir(&workspace)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;

            for _ in 0..50 {
                if socket.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if !socket.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("nvim did not create {}", socket.display()),
                ));
            }

            Ok(Self {
                _temp_dir: temp_dir,
                workspace,
                address,
                child,
            })
        }

        pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, std::io::Error> {
            let path = self.workspace.join(name);
            std::fs::write(&path, contents)?;
            Ok(path)
        }

        pub fn workspace(&self) -> &Path {
            &self.workspace
        }
    }

    impl Drop for HeadlessNvim {
        fn drop(&mut self) {
            let _ = self.child.start_kill();
        }
    }
}
