//! MCP Server implementation module
//!
//! The server handler and the `read-lints` tool it exposes.

pub mod server;
pub mod tools {
    pub mod read_lints;
}

pub use server::LintServerHandler;
