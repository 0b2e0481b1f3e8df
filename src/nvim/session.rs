//! Remote session abstraction
//!
//! [`RemoteSession`] is the narrow surface the diagnostics pipeline needs from
//! a Neovim instance: a generic RPC call plus expression evaluation and Lua
//! execution built on top of it. [`Connector`] turns an address into a live
//! session so that discovery can be exercised without real sockets.

use async_trait::async_trait;
use rmpv::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::nvim::client::NvimClient;
use crate::nvim::error::RpcError;

/// A connected remote Neovim session
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Address this session was dialled on
    fn address(&self) -> &str;

    /// Generic remote call
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError>;

    /// Evaluate a Vimscript expression
    async fn eval(&self, expression: &str) -> Result<Value, RpcError> {
        self.call("nvim_eval", vec![Value::from(expression)]).await
    }

    /// Execute a Lua chunk with positional arguments (`...` on the remote side)
    async fn exec_lua(&self, code: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.call("nvim_exec_lua", vec![Value::from(code), Value::Array(args)])
            .await
    }

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Dials remote sessions by address
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RemoteSession>, RpcError>;
}

/// Connector backed by real sockets
#[derive(Debug, Clone)]
pub struct SocketConnector {
    request_timeout: Duration,
}

impl SocketConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn dial(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RemoteSession>, RpcError> {
        let client = NvimClient::connect(address, self.request_timeout, cancel.clone()).await?;
        Ok(Box::new(client))
    }
}
