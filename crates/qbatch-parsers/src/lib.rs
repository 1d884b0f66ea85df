//! Shared parsing utilities for batch scheduler output.
//!
//! This crate provides the text-level helpers used by every scheduler
//! adapter: decoding raw command output, splitting delimited rows,
//! memory and duration strings, and shell quoting.

pub mod memory;
pub mod time;

use thiserror::Error;

pub use memory::{parse_memory_kb, MemoryFormat};
pub use time::{
    format_duration, format_duration_qsub, format_duration_slurm, parse_duration_secs,
    parse_exit_code, parse_slurm_timestamp, DurationFormat,
};

/// Error type for strict parsing of scheduler values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid memory string: {0}")]
    InvalidMemory(String),
    #[error("Unknown memory units {unit} in {value}")]
    UnknownUnit { unit: String, value: String },
    #[error("Invalid time format: {0}")]
    InvalidDuration(String),
    #[error("Output is not valid UTF-8: {0}")]
    Encoding(String),
}

/// Decode raw command output to text.
///
/// Schedulers are expected to emit UTF-8 (or plain ASCII); anything else is
/// reported rather than silently replaced.
pub fn decode_output(bytes: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ParseError::Encoding(e.to_string()))
}

/// Filter helper for optional string fields.
/// Returns None if the string is empty or a placeholder value.
pub fn non_empty_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed == "-"
        || trimmed == "N/A"
        || trimmed == "Unknown"
        || trimmed == "(null)"
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a delimited line and validate the exact field count.
pub fn split_delimited<'a>(
    line: &'a str,
    separator: &str,
    expected: usize,
) -> Result<Vec<&'a str>, String> {
    let fields: Vec<&str> = line.split(separator).collect();
    if fields.len() != expected {
        return Err(format!(
            "Wrong number of fields. Found {}, expected {}: {}",
            fields.len(),
            expected,
            line
        ));
    }
    Ok(fields)
}

/// Minimal POSIX shell quoting for values interpolated into command lines.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@+,=".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
