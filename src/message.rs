//! JSON-RPC message gate and locally synthesised errors.
//!
//! The relay never interprets MCP methods.  It only checks that an input
//! line is a JSON object and whether it carries an `id` (request) or not
//! (notification).

use serde::Serialize;
use serde_json::{Map, Value};

/// JSON-RPC `Internal error`, used for every failure the relay reports itself.
pub(crate) const INTERNAL_ERROR: i64 = -32603;

/// An input line that passed the JSON-object gate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound<'a> {
    /// Carries an `id` key; the value (possibly `null`) is kept for error
    /// correlation.
    Request { id: Value, raw: &'a str },
    /// No `id` key: fire-and-forget.
    Notification { raw: &'a str },
}

impl<'a> Inbound<'a> {
    /// The trimmed line as it will be sent upstream.
    pub(crate) fn raw(&self) -> &'a str {
        match self {
            Self::Request { raw, .. } | Self::Notification { raw } => raw,
        }
    }
}

/// Why an input line was not treated as a message.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Rejected {
    #[error("unexpected input: {0}")]
    NotAnObject(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Classify one line of client input.
///
/// The line is trimmed first.  Anything that does not start with `{` or does
/// not parse as a JSON object is rejected.
pub(crate) fn classify(line: &str) -> Result<Inbound<'_>, Rejected> {
    let raw = line.trim();
    if !raw.starts_with('{') {
        return Err(Rejected::NotAnObject(raw.to_owned()));
    }
    let mut object: Map<String, Value> = serde_json::from_str(raw)?;
    Ok(match object.remove("id") {
        Some(id) => Inbound::Request { id, raw },
        None => Inbound::Notification { raw },
    })
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    jsonrpc: &'static str,
    id: Option<&'a Value>,
    error: ErrorObject<'a>,
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    code: i64,
    message: &'a str,
}

/// Build a JSON-RPC 2.0 error response with code [`INTERNAL_ERROR`].
///
/// `id` echoes the originating request's identifier; `None` serialises as
/// `null` for failures that cannot be correlated.
pub(crate) fn error_response(id: Option<&Value>, message: &str) -> Vec<u8> {
    let response = ErrorResponse {
        jsonrpc: "2.0",
        id,
        error: ErrorObject {
            code: INTERNAL_ERROR,
            message,
        },
    };
    // Serialising plain strings and an already-parsed `Value` cannot fail.
    serde_json::to_vec(&response).unwrap_or_default()
}

/// Uncorrelated error for failures outside any single request.
pub(crate) fn internal_error(message: &str) -> Vec<u8> {
    error_response(None, &format!("Internal error: {message}"))
}
