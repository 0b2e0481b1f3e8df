//! Typed helpers over the raw [`RemoteSession`] primitives

use rmpv::Value;

use crate::nvim::error::RpcError;
use crate::nvim::session::RemoteSession;

/// Buffer handle as understood by the Neovim API
pub type BufferId = i64;

/// Current working directory of the remote process
pub async fn get_cwd(session: &dyn RemoteSession) -> Result<String, RpcError> {
    let value = session.eval("getcwd()").await?;
    expect_string("getcwd()", value)
}

/// All buffer handles, in Neovim's enumeration order
pub async fn list_buffers(session: &dyn RemoteSession) -> Result<Vec<BufferId>, RpcError> {
    let method = "nvim_list_bufs";
    let value = session.call(method, Vec::new()).await?;
    let Value::Array(items) = value else {
        return Err(RpcError::unexpected(method, format!("expected array, got {value}")));
    };
    items
        .iter()
        .map(|item| {
            decode_handle(item)
                .ok_or_else(|| RpcError::unexpected(method, format!("invalid buffer handle {item}")))
        })
        .collect()
}

pub async fn buffer_is_valid(
    session: &dyn RemoteSession,
    buffer: BufferId,
) -> Result<bool, RpcError> {
    let method = "nvim_buf_is_valid";
    let value = session.call(method, vec![Value::from(buffer)]).await?;
    value
        .as_bool()
        .ok_or_else(|| RpcError::unexpected(method, format!("expected boolean, got {value}")))
}

/// Full path of a buffer, empty for unnamed buffers
pub async fn buffer_name(
    session: &dyn RemoteSession,
    buffer: BufferId,
) -> Result<String, RpcError> {
    let method = "nvim_buf_get_name";
    let value = session.call(method, vec![Value::from(buffer)]).await?;
    expect_string(method, value)
}

/// Lua chunks return strings for JSON-encoded payloads; nil means "nothing"
pub fn optional_string(method: &str, value: Value) -> Result<Option<String>, RpcError> {
    match value {
        Value::Nil => Ok(None),
        other => expect_string(method, other).map(Some),
    }
}

fn expect_string(method: &str, value: Value) -> Result<String, RpcError> {
    match value {
        Value::String(s) => s
            .into_str()
            .ok_or_else(|| RpcError::unexpected(method, "string is not valid UTF-8")),
        other => Err(RpcError::unexpected(
            method,
            format!("expected string, got {other}"),
        )),
    }
}

/// Handles arrive as EXT values wrapping a MessagePack integer. Plain
/// integers are accepted as well.
pub fn decode_handle(value: &Value) -> Option<BufferId> {
    match value {
        Value::Ext(_, data) => rmpv::decode::read_value(&mut &data[..])
            .ok()
            .and_then(|inner| inner.as_i64()),
        other => other.as_i64(),
    }
}
