//! Diagnostic records
//!
//! [`RawDiagnostic`] mirrors one entry of `vim.diagnostic.get()` as decoded
//! from JSON, with every field optional. Converting it into a
//! [`DiagnosticItem`] validates the required fields; a record that fails
//! validation is dropped on its own without affecting its siblings.

use lsp_types::DiagnosticSeverity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Diagnostic severity, numbered as in LSP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// Map an LSP severity; values outside 1..=4 have no mapping
    pub fn from_lsp(severity: DiagnosticSeverity) -> Option<Self> {
        match severity {
            DiagnosticSeverity::ERROR => Some(Severity::Error),
            DiagnosticSeverity::WARNING => Some(Severity::Warning),
            DiagnosticSeverity::INFORMATION => Some(Severity::Info),
            DiagnosticSeverity::HINT => Some(Severity::Hint),
            _ => None,
        }
    }

    /// Label used in compiler-style output
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Hint => "HINT",
        }
    }
}

/// One validated diagnostic, zero-based positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticItem {
    pub severity: Severity,
    pub line: u32,
    pub col: u32,
    pub end_line: Option<u32>,
    pub end_col: Option<u32>,
    pub message: String,
    pub source: Option<String>,
    pub code: Option<String>,
}

/// Diagnostics of one named buffer, never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostics {
    pub file: String,
    pub diagnostics: Vec<DiagnosticItem>,
}

/// Entry of `vim.diagnostic.get()` before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiagnostic {
    #[serde(default)]
    pub severity: Option<Value>,
    #[serde(default)]
    pub lnum: Option<Value>,
    #[serde(default)]
    pub col: Option<Value>,
    #[serde(default)]
    pub end_lnum: Option<Value>,
    #[serde(default)]
    pub end_col: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub code: Option<Value>,
}

/// Why a raw record was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("missing severity")]
    MissingSeverity,
    #[error("unknown severity {0}")]
    UnknownSeverity(String),
    #[error("missing line")]
    MissingLine,
    #[error("invalid {field}: {value}")]
    InvalidPosition { field: &'static str, value: String },
    #[error("missing message")]
    MissingMessage,
}

impl TryFrom<RawDiagnostic> for DiagnosticItem {
    type Error = DropReason;

    fn try_from(raw: RawDiagnostic) -> Result<Self, Self::Error> {
        let severity = match raw.severity {
            None => return Err(DropReason::MissingSeverity),
            Some(value) => parse_severity(&value)
                .ok_or_else(|| DropReason::UnknownSeverity(value.to_string()))?,
        };

        let line = match raw.lnum {
            None => return Err(DropReason::MissingLine),
            Some(value) => position("lnum", &value)?,
        };
        let col = raw
            .col
            .map(|value| position("col", &value))
            .transpose()?
            .unwrap_or(0);
        let end_line = raw
            .end_lnum
            .map(|value| position("end_lnum", &value))
            .transpose()?;
        let end_col = raw
            .end_col
            .map(|value| position("end_col", &value))
            .transpose()?;

        let message = match raw.message {
            Some(Value::String(message)) if !message.is_empty() => message,
            _ => return Err(DropReason::MissingMessage),
        };

        let source = match raw.source {
            Some(Value::String(source)) if !source.trim().is_empty() => Some(source),
            _ => None,
        };

        Ok(DiagnosticItem {
            severity,
            line,
            col,
            end_line,
            end_col,
            message,
            source,
            code: raw.code.as_ref().and_then(code_text),
        })
    }
}

fn parse_severity(value: &Value) -> Option<Severity> {
    let lsp = match integral(value)? {
        1 => DiagnosticSeverity::ERROR,
        2 => DiagnosticSeverity::WARNING,
        3 => DiagnosticSeverity::INFORMATION,
        4 => DiagnosticSeverity::HINT,
        _ => return None,
    };
    Severity::from_lsp(lsp)
}

/// Integers and integral floats; JSON encoders may emit `4.0` for 4
fn integral(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    let float = value.as_f64()?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn position(field: &'static str, value: &Value) -> Result<u32, DropReason> {
    integral(value)
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| DropReason::InvalidPosition {
            field,
            value: value.to_string(),
        })
}

/// Codes render as text whatever their JSON type; blank codes count as absent
fn code_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(code) => code.clone(),
        Value::Number(_) => match integral(value) {
            Some(number) => number.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}
