//! Socket transport for Neovim listen addresses
//!
//! Neovim listens on either a TCP `host:port` pair or a local socket path
//! (Unix domain socket, or a named pipe on Windows). This module only knows how
//! to turn an address string into a connected byte stream.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

/// Byte stream usable by the RPC client
pub trait RpcStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RpcStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Kind of listen address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    /// TCP endpoint, e.g. `127.0.0.1:6666`
    Tcp(String),
    /// Local socket path or named pipe
    Local(String),
}

impl ListenAddress {
    /// Classify an address string
    pub fn parse(address: &str) -> Self {
        let looks_like_path = address.contains('/') || address.contains('\\');
        if !looks_like_path
            && (address.parse::<SocketAddr>().is_ok() || address.rsplit_once(':').is_some())
        {
            ListenAddress::Tcp(address.to_string())
        } else {
            ListenAddress::Local(address.to_string())
        }
    }
}

/// Connect to a Neovim listen address
pub async fn connect(address: &str) -> io::Result<Box<dyn RpcStream>> {
    match ListenAddress::parse(address) {
        ListenAddress::Tcp(addr) => {
            trace!("Connecting over TCP: {}", addr);
            let stream = tokio::net::TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        ListenAddress::Local(path) => connect_local(&path).await,
    }
}

#[cfg(unix)]
async fn connect_local(path: &str) -> io::Result<Box<dyn RpcStream>> {
    trace!("Connecting to Unix socket: {}", path);
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
async fn connect_local(path: &str) -> io::Result<Box<dyn RpcStream>> {
    trace!("Connecting to named pipe: {}", path);
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(pipe))
}
