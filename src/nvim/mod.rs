//! Neovim remote session layer
//!
//! Layered the same way as any RPC client in this crate:
//!
//! - **Transport**: socket connection for a listen address
//! - **Codec**: MessagePack-RPC framing
//! - **Client**: request/response correlation with timeouts and cancellation
//! - **Session**: the [`RemoteSession`] abstraction and its [`Connector`]
//! - **Api / Scripts**: typed helpers and the embedded Lua protocol

pub mod api;
pub mod client;
pub mod codec;
pub mod error;
pub mod scripts;
pub mod session;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use error::RpcError;
pub use session::{Connector, RemoteSession, SocketConnector};
