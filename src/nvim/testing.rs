//! Fake Neovim sessions for testing
//!
//! [`FakeNeovim`] answers the handful of API calls and Lua scripts the
//! diagnostics pipeline issues, and records every call so tests can assert on
//! what was (or was not) sent. Clones share their buffers and call log.
//! Every [`FakeConnector::dial`] hands out a fresh connection with its own
//! closed flag; [`FakeNeovim::is_closed`] reports the most recent one.

use async_trait::async_trait;
use rmpv::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::nvim::error::RpcError;
use crate::nvim::scripts;
use crate::nvim::session::{Connector, RemoteSession};

/// One call received by a fake session
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    /// Script name for `nvim_exec_lua` calls
    pub script: Option<&'static str>,
    pub args: Vec<Value>,
}

/// A buffer inside a fake session
#[derive(Debug, Clone)]
pub struct FakeBuffer {
    pub id: i64,
    pub name: String,
    pub valid: bool,
    /// JSON text returned by the diagnostics script; `None` returns nil
    pub diagnostics: Option<String>,
    pub fail_name: bool,
    pub fail_diagnostics: bool,
}

impl FakeBuffer {
    pub fn named(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            valid: true,
            diagnostics: None,
            fail_name: false,
            fail_diagnostics: false,
        }
    }

    pub fn with_diagnostics(mut self, json: &str) -> Self {
        self.diagnostics = Some(json.to_string());
        self
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    pub fn failing_name(mut self) -> Self {
        self.fail_name = true;
        self
    }

    pub fn failing_diagnostics(mut self) -> Self {
        self.fail_diagnostics = true;
        self
    }
}

/// In-memory stand-in for a Neovim session
#[derive(Debug, Clone)]
pub struct FakeNeovim {
    address: String,
    cwd: Option<String>,
    buffers: Vec<FakeBuffer>,
    fail_list_buffers: bool,
    supported_extensions: Vec<String>,
    fail_filter: bool,
    fail_reload: bool,
    stamps: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Closed flag of this connection
    closed: Arc<AtomicBool>,
    /// Closed flag of the most recently opened connection
    latest: Arc<Mutex<Arc<AtomicBool>>>,
}

impl FakeNeovim {
    pub fn new(address: &str, cwd: &str) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        Self {
            address: address.to_string(),
            cwd: Some(cwd.to_string()),
            buffers: Vec::new(),
            fail_list_buffers: false,
            supported_extensions: Vec::new(),
            fail_filter: false,
            fail_reload: false,
            stamps: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: closed.clone(),
            latest: Arc::new(Mutex::new(closed)),
        }
    }

    /// A new connection to the same instance
    pub fn connect(&self) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        *self.latest.lock().unwrap() = closed.clone();
        Self {
            closed,
            ..self.clone()
        }
    }

    pub fn with_buffer(mut self, buffer: FakeBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    pub fn failing_cwd(mut self) -> Self {
        self.cwd = None;
        self
    }

    pub fn failing_buffer_list(mut self) -> Self {
        self.fail_list_buffers = true;
        self
    }

    /// Extensions whose files count as served by an attached language server
    pub fn supporting_extensions(mut self, extensions: &[&str]) -> Self {
        self.supported_extensions = extensions.iter().map(|ext| ext.to_string()).collect();
        self
    }

    pub fn failing_filter(mut self) -> Self {
        self.fail_filter = true;
        self
    }

    pub fn failing_reload(mut self) -> Self {
        self.fail_reload = true;
        self
    }

    /// Successive answers of the diagnostic stamp script; the last one repeats
    pub fn with_stamps(self, stamps: &[&str]) -> Self {
        {
            let mut queue = self.stamps.lock().unwrap();
            queue.extend(stamps.iter().map(|stamp| stamp.to_string()));
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn script_calls(&self, script: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.script == Some(script))
            .collect()
    }

    /// File lists passed to the reload script, one entry per invocation
    pub fn reloaded_files(&self) -> Vec<Vec<String>> {
        self.script_calls("RELOAD_AND_NOTIFY")
            .into_iter()
            .map(|call| string_list(call.args.first()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.latest.lock().unwrap().load(Ordering::SeqCst)
    }

    fn buffer(&self, args: &[Value]) -> Option<&FakeBuffer> {
        let id = args.first().and_then(Value::as_i64)?;
        self.buffers.iter().find(|buffer| buffer.id == id)
    }

    fn remote_error(method: &str, message: &str) -> RpcError {
        RpcError::Remote {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    fn exec_lua(&self, script: &'static str, args: &[Value]) -> Result<Value, RpcError> {
        let method = "nvim_exec_lua";
        match script {
            "BUFFER_DIAGNOSTICS" => {
                let buffer = self
                    .buffer(args)
                    .ok_or_else(|| Self::remote_error(method, "Invalid buffer id"))?;
                if buffer.fail_diagnostics {
                    return Err(Self::remote_error(method, "diagnostic.get failed"));
                }
                Ok(buffer
                    .diagnostics
                    .as_deref()
                    .map(Value::from)
                    .unwrap_or(Value::Nil))
            }
            "FILTER_SUPPORTED_FILES" => {
                if self.fail_filter {
                    return Err(Self::remote_error(method, "filetype detection failed"));
                }
                let files = string_list(args.first());
                let (supported, unsupported): (Vec<String>, Vec<String>) =
                    files.into_iter().partition(|file| {
                        Path::new(file)
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| self.supported_extensions.iter().any(|s| s == ext))
                    });
                let payload = serde_json::json!({
                    "version": scripts::SCRIPT_PROTOCOL_VERSION,
                    "supported": supported,
                    "unsupported": unsupported.len(),
                });
                Ok(Value::from(payload.to_string()))
            }
            "RELOAD_AND_NOTIFY" => {
                if self.fail_reload {
                    Err(Self::remote_error(method, "E37: No write since last change"))
                } else {
                    Ok(Value::Nil)
                }
            }
            "DIAGNOSTIC_STAMP" => {
                let mut stamps = self.stamps.lock().unwrap();
                let stamp = if stamps.len() > 1 {
                    stamps.pop_front()
                } else {
                    stamps.front().cloned()
                };
                Ok(Value::from(stamp.unwrap_or_else(|| "[]".to_string())))
            }
            _ => Err(Self::remote_error(method, "unknown script")),
        }
    }
}

#[async_trait]
impl RemoteSession for FakeNeovim {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let script = if method == "nvim_exec_lua" {
            args.first().and_then(Value::as_str).and_then(script_name)
        } else {
            None
        };
        let lua_args = match (script, args.get(1)) {
            (Some(_), Some(Value::Array(lua_args))) => lua_args.clone(),
            _ => args.clone(),
        };

        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            script,
            args: lua_args.clone(),
        });

        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Disconnected);
        }

        match method {
            "nvim_eval" => match (&self.cwd, args.first().and_then(Value::as_str)) {
                (Some(cwd), Some("getcwd()")) => Ok(Value::from(cwd.as_str())),
                _ => Err(Self::remote_error(method, "eval failed")),
            },
            "nvim_list_bufs" => {
                if self.fail_list_buffers {
                    return Err(Self::remote_error(method, "list failed"));
                }
                Ok(Value::Array(
                    self.buffers.iter().map(|buffer| ext_handle(buffer.id)).collect(),
                ))
            }
            "nvim_buf_is_valid" => Ok(Value::Boolean(
                self.buffer(&args).is_some_and(|buffer| buffer.valid),
            )),
            "nvim_buf_get_name" => match self.buffer(&args) {
                Some(buffer) if !buffer.fail_name => Ok(Value::from(buffer.name.as_str())),
                _ => Err(Self::remote_error(method, "Invalid buffer id")),
            },
            "nvim_exec_lua" => match script {
                Some(script) => self.exec_lua(script, &lua_args),
                None => Err(Self::remote_error(method, "unknown script")),
            },
            other => Err(Self::remote_error(other, "Invalid method")),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out fake sessions by address
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    sessions: HashMap<String, FakeNeovim>,
    dialed: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: FakeNeovim) -> Self {
        self.sessions.insert(session.address.clone(), session);
        self
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn dial(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RemoteSession>, RpcError> {
        if cancel.is_cancelled() {
            return Err(RpcError::Cancelled {
                method: "connect".to_string(),
            });
        }
        self.dialed.lock().unwrap().push(address.to_string());
        match self.sessions.get(address) {
            Some(session) => Ok(Box::new(session.connect())),
            None => Err(RpcError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such socket"),
            }),
        }
    }
}

fn script_name(code: &str) -> Option<&'static str> {
    [
        ("BUFFER_DIAGNOSTICS", scripts::BUFFER_DIAGNOSTICS),
        ("FILTER_SUPPORTED_FILES", scripts::FILTER_SUPPORTED_FILES),
        ("RELOAD_AND_NOTIFY", scripts::RELOAD_AND_NOTIFY),
        ("DIAGNOSTIC_STAMP", scripts::DIAGNOSTIC_STAMP),
    ]
    .into_iter()
    .find(|(_, source)| *source == code)
    .map(|(name, _)| name)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn ext_handle(id: i64) -> Value {
    let mut data = Vec::new();
    rmpv::encode::write_value(&mut data, &Value::from(id)).expect("encode handle");
    Value::Ext(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_dial_is_a_fresh_connection() {
        let neovim = FakeNeovim::new("addr", "/repo");
        let connector = FakeConnector::new().with_session(neovim.clone());
        let cancel = CancellationToken::new();

        let first = connector.dial("addr", &cancel).await.unwrap();
        first.close().await;
        assert!(neovim.is_closed());
        assert!(matches!(
            first.eval("getcwd()").await,
            Err(RpcError::Disconnected)
        ));

        let second = connector.dial("addr", &cancel).await.unwrap();
        assert!(!neovim.is_closed());
        assert_eq!(
            second.eval("getcwd()").await.unwrap().as_str(),
            Some("/repo")
        );
        assert_eq!(neovim.calls().len(), 2);
    }
}
