//! MessagePack-RPC client for a single Neovim connection
//!
//! One background task owns the socket. Outbound requests reach it through a
//! channel and responses are routed back to the waiting caller by msgid. Every
//! call is bounded by the configured request timeout and by the caller's
//! cancellation token; the connection stays closable after a cancelled call.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rmpv::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, trace, warn};

use crate::log_rpc_message;
use crate::nvim::codec::{MsgpackRpcCodec, RpcMessage};
use crate::nvim::error::RpcError;
use crate::nvim::session::RemoteSession;
use crate::nvim::transport::{self, RpcStream};

/// A request waiting for its response
struct PendingCall {
    method: String,
    reply: oneshot::Sender<Result<Value, RpcError>>,
}

type PendingCalls = Arc<Mutex<HashMap<u64, PendingCall>>>;

/// Client for one Neovim listen socket
pub struct NvimClient {
    /// Address the connection was opened on
    address: String,

    /// Channel feeding the IO task
    outbound: mpsc::UnboundedSender<RpcMessage>,

    /// Next request id
    next_msgid: AtomicU64,

    /// Requests waiting for a response
    pending: PendingCalls,

    /// Upper bound for a single call
    request_timeout: Duration,

    /// Caller-supplied cancellation
    cancel: CancellationToken,

    /// Stops the IO task
    shutdown: CancellationToken,

    io_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl NvimClient {
    /// Dial a listen address
    pub async fn connect(
        address: &str,
        request_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, RpcError> {
        debug!("Dialling Neovim at {}", address);

        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RpcError::Cancelled { method: "connect".to_string() });
            }
            result = tokio::time::timeout(request_timeout, transport::connect(address)) => {
                match result {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(source)) => {
                        return Err(RpcError::Connect { address: address.to_string(), source });
                    }
                    Err(_) => {
                        return Err(RpcError::Timeout {
                            method: "connect".to_string(),
                            timeout: request_timeout,
                        });
                    }
                }
            }
        };

        Ok(Self::from_stream(address, stream, request_timeout, cancel))
    }

    /// Wrap an already connected byte stream
    pub fn from_stream<S: RpcStream>(
        address: impl Into<String>,
        stream: S,
        request_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let address = address.into();
        let (outbound, outbound_receiver) = mpsc::unbounded_channel();
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let io_task = tokio::spawn(Self::run_io(
            stream,
            outbound_receiver,
            Arc::clone(&pending),
            shutdown.clone(),
            address.clone(),
        ));

        Self {
            address,
            outbound,
            next_msgid: AtomicU64::new(1),
            pending,
            request_timeout,
            cancel,
            shutdown,
            io_task: std::sync::Mutex::new(Some(io_task)),
        }
    }

    /// IO task: writes queued requests and dispatches inbound frames
    async fn run_io<S: RpcStream>(
        stream: S,
        mut outbound: mpsc::UnboundedReceiver<RpcMessage>,
        pending: PendingCalls,
        shutdown: CancellationToken,
        address: String,
    ) {
        let (mut sink, mut frames) = Framed::new(stream, MsgpackRpcCodec).split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    trace!("NvimClient[{}]: shutdown requested", address);
                    break;
                }
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = sink.send(message).await {
                        error!("NvimClient[{}]: failed to send message: {}", address, e);
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(message)) => {
                        let Some(reply) = Self::dispatch_inbound(message, &pending).await else {
                            continue;
                        };
                        if let Err(e) = sink.send(reply).await {
                            error!("NvimClient[{}]: failed to send reply: {}", address, e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("NvimClient[{}]: failed to read message: {}", address, e);
                        break;
                    }
                    None => {
                        debug!("NvimClient[{}]: connection closed by peer", address);
                        break;
                    }
                }
            }
        }

        if let Err(e) = sink.close().await {
            trace!("NvimClient[{}]: error while closing socket: {}", address, e);
        }

        let mut pending = pending.lock().await;
        for (_, call) in pending.drain() {
            let _ = call.reply.send(Err(RpcError::Disconnected));
        }
        trace!("NvimClient[{}]: IO task finished", address);
    }

    /// Route an inbound message; returns a reply when one must be sent
    async fn dispatch_inbound(message: RpcMessage, pending: &PendingCalls) -> Option<RpcMessage> {
        match message {
            RpcMessage::Response {
                msgid,
                error,
                result,
            } => {
                let call = pending.lock().await.remove(&msgid);
                match call {
                    Some(call) => {
                        log_rpc_message!(Level::TRACE, "incoming", &call.method, &result);
                        let outcome = if error.is_nil() {
                            Ok(result)
                        } else {
                            Err(RpcError::Remote {
                                message: remote_error_message(&error),
                                method: call.method,
                            })
                        };
                        if call.reply.send(outcome).is_err() {
                            debug!("Response receiver dropped for request {}", msgid);
                        }
                    }
                    None => debug!("Received response for unknown request {}", msgid),
                }
                None
            }
            RpcMessage::Notification { method, .. } => {
                trace!("Ignoring notification: {}", method);
                None
            }
            RpcMessage::Request { msgid, method, .. } => {
                warn!("Rejecting request from Neovim: {}", method);
                Some(RpcMessage::Response {
                    msgid,
                    error: Value::Array(vec![
                        Value::from(0),
                        Value::from(format!("{method} is not handled by this client")),
                    ]),
                    result: Value::Nil,
                })
            }
        }
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        if self.shutdown.is_cancelled() {
            return Err(RpcError::Disconnected);
        }

        let msgid = self.next_msgid.fetch_add(1, Ordering::SeqCst);
        let (reply, response) = oneshot::channel();
        self.pending.lock().await.insert(
            msgid,
            PendingCall {
                method: method.to_string(),
                reply,
            },
        );

        log_rpc_message!(Level::TRACE, "outgoing", method, &params);
        let message = RpcMessage::Request {
            msgid,
            method: method.to_string(),
            params,
        };
        if self.outbound.send(message).is_err() {
            self.pending.lock().await.remove(&msgid);
            return Err(RpcError::Disconnected);
        }

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled { method: method.to_string() }),
            received = tokio::time::timeout(self.request_timeout, response) => match received {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RpcError::Disconnected),
                Err(_) => Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout: self.request_timeout,
                }),
            },
        };

        if outcome.is_err() {
            self.pending.lock().await.remove(&msgid);
        }
        outcome
    }
}

#[async_trait]
impl RemoteSession for NvimClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.request(method, args).await
    }

    async fn close(&self) {
        self.shutdown.cancel();
        let handle = self.io_task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("NvimClient[{}]: IO task ended abnormally: {}", self.address, e);
            }
        }
    }
}

impl Drop for NvimClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Neovim reports errors as `[type, message]`
fn remote_error_message(error: &Value) -> String {
    match error {
        Value::Array(parts) => parts
            .iter()
            .find_map(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::String(s) => s.as_str().unwrap_or_default().to_string(),
        other => other.to_string(),
    }
}
