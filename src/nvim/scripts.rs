//! Lua scripts executed inside the Neovim session
//!
//! These chunks are a contract with Neovim's scripting surface. Each one
//! receives its inputs as positional arguments (`...`) and, where it returns
//! anything, returns a JSON string so decoding does not depend on how
//! MessagePack represents Lua tables. Bump [`SCRIPT_PROTOCOL_VERSION`] when an
//! input or output shape changes.

use serde::{Deserialize, Deserializer};

pub const SCRIPT_PROTOCOL_VERSION: u32 = 1;

/// Diagnostics for one buffer.
///
/// Input: `(bufnr: integer)`.
/// Output: JSON text of `vim.diagnostic.get(bufnr)`; an empty Lua table may
/// encode as `{}` and a missing result as `null` or an empty string.
pub const BUFFER_DIAGNOSTICS: &str = r#"
local bufnr = ...
return vim.json.encode(vim.diagnostic.get(bufnr))
"#;

/// Keep files whose detected filetype is served by an active LSP client.
///
/// Input: `(files: string[], ambiguous_exts: string[])`.
/// Output: JSON text `{"version": 1, "supported": string[], "unsupported": integer}`.
///
/// Detection uses the file name first and falls back to sniffing the file's
/// leading lines in a scratch buffer. Results are cached per extension, except
/// for extensions listed in `ambiguous_exts` which are detected every time.
pub const FILTER_SUPPORTED_FILES: &str = r#"
local files, ambiguous_exts = ...

local served = {}
local serves_all = false
for _, client in ipairs(vim.lsp.get_clients()) do
  local filetypes = client.config and client.config.filetypes
  if filetypes == nil then
    serves_all = true
  else
    for _, ft in ipairs(filetypes) do
      served[ft] = true
    end
  end
end

local ambiguous = {}
for _, ext in ipairs(ambiguous_exts or {}) do
  ambiguous[ext] = true
end

local function sniff(path)
  local ok, lines = pcall(vim.fn.readfile, path, "", 50)
  if not ok or lines == nil then
    return nil
  end
  local scratch = vim.api.nvim_create_buf(false, true)
  vim.api.nvim_buf_set_lines(scratch, 0, -1, false, lines)
  local ft = vim.filetype.match({ buf = scratch, filename = path })
  vim.api.nvim_buf_delete(scratch, { force = true })
  return ft
end

local cache = {}
local function detect(path)
  local ext = vim.fn.fnamemodify(path, ":e")
  local cacheable = ext ~= "" and not ambiguous[ext]
  if cacheable and cache[ext] ~= nil then
    return cache[ext] or nil
  end
  local ft = vim.filetype.match({ filename = path })
  if ft == nil or ft == "" then
    ft = sniff(path)
  end
  if cacheable then
    cache[ext] = ft or false
  end
  return ft
end

local supported = {}
local unsupported = 0
for _, path in ipairs(files) do
  local ft = detect(path)
  if ft ~= nil and ft ~= "" and (serves_all or served[ft]) then
    table.insert(supported, path)
  else
    unsupported = unsupported + 1
  end
end

return vim.json.encode({ version = 1, supported = supported, unsupported = unsupported })
"#;

/// Reload files from disk and tell attached language servers they were saved.
///
/// Input: `(files: string[])`.
/// Output: none.
///
/// Loaded buffers are reloaded with `edit!`, discarding unsaved changes in
/// the session. `textDocument/didSave` is sent from a scheduled callback, so
/// it happens after this call has returned.
///
/// Also maintains `_G.read_lints_published`, a per-buffer count of
/// `DiagnosticChanged` events, reset to zero for every reloaded target.
pub const RELOAD_AND_NOTIFY: &str = r#"
local files = ...

if _G.read_lints_published == nil then
  _G.read_lints_published = {}
  vim.api.nvim_create_autocmd("DiagnosticChanged", {
    callback = function(args)
      local published = _G.read_lints_published
      published[args.buf] = (published[args.buf] or 0) + 1
    end,
  })
end

-- Client methods became colon calls in 0.11
local modern = vim.fn.has("nvim-0.11") == 1
local function notify_saved(client, uri)
  local supported
  if modern then
    supported = client:supports_method("textDocument/didSave")
  else
    supported = client.supports_method("textDocument/didSave")
  end
  if not supported then
    return
  end
  local params = { textDocument = { uri = uri } }
  if modern then
    client:notify("textDocument/didSave", params)
  else
    client.notify("textDocument/didSave", params)
  end
end

for _, path in ipairs(files) do
  local bufnr = vim.fn.bufnr(path, true)
  if not vim.api.nvim_buf_is_loaded(bufnr) then
    vim.api.nvim_buf_call(bufnr, function()
      vim.cmd("silent! edit")
    end)
  else
    vim.api.nvim_buf_call(bufnr, function()
      vim.cmd("silent! edit!")
    end)
  end
  _G.read_lints_published[bufnr] = 0
  vim.schedule(function()
    for _, client in ipairs(vim.lsp.get_clients({ bufnr = bufnr })) do
      notify_saved(client, vim.uri_from_fname(path))
    end
  end)
end
"#;

/// Cheap fingerprint of diagnostic state for the target files.
///
/// Input: `(files: string[])`.
/// Output: JSON text
/// `[[bufnr, changedtick, diagnostic_count, published, attached], ...]` for
/// the target files that are loaded. `published` counts diagnostic updates
/// since the last reload; `attached` is true when a language server is
/// attached to the buffer.
pub const DIAGNOSTIC_STAMP: &str = r#"
local files = ...
local published = _G.read_lints_published or {}
local stamp = {}
for _, path in ipairs(files) do
  local bufnr = vim.fn.bufnr(path)
  if bufnr > 0 and vim.api.nvim_buf_is_loaded(bufnr) then
    table.insert(stamp, {
      bufnr,
      vim.api.nvim_buf_get_changedtick(bufnr),
      #vim.diagnostic.get(bufnr),
      published[bufnr] or 0,
      #vim.lsp.get_clients({ bufnr = bufnr }) > 0,
    })
  end
end
return vim.json.encode(stamp)
"#;

/// Output of [`FILTER_SUPPORTED_FILES`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupportedFiles {
    pub version: u32,
    #[serde(default, deserialize_with = "lua_list")]
    pub supported: Vec<String>,
    #[serde(default)]
    pub unsupported: usize,
}

/// An empty Lua table has no array part, so it may encode as `{}`
fn lua_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LuaList {
        List(Vec<String>),
        Table(serde_json::Map<String, serde_json::Value>),
    }

    match LuaList::deserialize(deserializer)? {
        LuaList::List(items) => Ok(items),
        LuaList::Table(table) if table.is_empty() => Ok(Vec::new()),
        LuaList::Table(_) => Err(serde::de::Error::custom("expected a list of paths")),
    }
}
