//! Rendering of collected diagnostics

use serde::Serialize;

use crate::config::OutputMode;
use crate::diagnostics::error::FormatError;
use crate::diagnostics::types::{DiagnosticItem, FileDiagnostics, Severity};

pub fn render(results: &[FileDiagnostics], mode: OutputMode) -> Result<String, FormatError> {
    match mode {
        OutputMode::Text => Ok(format_text(results)),
        OutputMode::Json => format_json(results),
    }
}

/// One `file:line:col: SEVERITY: message[ (source)][ [code]]` line per
/// diagnostic, positions one-based
pub fn format_text(results: &[FileDiagnostics]) -> String {
    results
        .iter()
        .flat_map(|entry| {
            entry
                .diagnostics
                .iter()
                .map(move |item| format_line(&entry.file, item))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_line(file: &str, item: &DiagnosticItem) -> String {
    let mut line = format!(
        "{}:{}:{}: {}: {}",
        file,
        u64::from(item.line) + 1,
        u64::from(item.col) + 1,
        item.severity.label(),
        item.message
    );
    if let Some(source) = &item.source {
        line.push_str(&format!(" ({source})"));
    }
    if let Some(code) = &item.code {
        line.push_str(&format!(" [{code}]"));
    }
    line
}

#[derive(Serialize)]
struct JsonFile<'a> {
    file: &'a str,
    diagnostics: Vec<JsonDiagnostic<'a>>,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: Severity,
    message: &'a str,
    source: Option<&'a str>,
    code: Option<&'a str>,
    line: u32,
    col: u32,
    end_line: Option<u32>,
    end_col: Option<u32>,
}

impl<'a> From<&'a DiagnosticItem> for JsonDiagnostic<'a> {
    fn from(item: &'a DiagnosticItem) -> Self {
        Self {
            severity: item.severity,
            message: &item.message,
            source: item.source.as_deref(),
            code: item.code.as_deref(),
            line: item.line,
            col: item.col,
            end_line: item.end_line,
            end_col: item.end_col,
        }
    }
}

/// Grouped JSON, positions zero-based as reported by Neovim
pub fn format_json(results: &[FileDiagnostics]) -> Result<String, FormatError> {
    let files: Vec<JsonFile<'_>> = results
        .iter()
        .map(|entry| JsonFile {
            file: &entry.file,
            diagnostics: entry.diagnostics.iter().map(JsonDiagnostic::from).collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&files)?)
}
