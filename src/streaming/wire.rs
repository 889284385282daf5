//! Control-channel wire format
//!
//! # TCP Protocol
//!
//! One connection carries exactly one exchange. There is no length prefix:
//! the client writes a single UTF-8 JSON object and the server answers with
//! either an outcome literal or a JSON telemetry object, then closes.
//!
//! ```text
//! client ──▶ {"command":"takeoff","alt":15.0}
//! client ◀── success            (or: failed)
//!
//! client ──▶ {"command":"get"}  (legacy: bare `get`)
//! client ◀── {"position":{...},"velocity":{...},...,"misc":{...}}
//! ```
//!
//! Outcome literals are compared for exact equality after trailing NUL bytes
//! are stripped, so the C-string form `success\0` is accepted.
//!
//! Because nothing frames a message, both sides read until the bytes form a
//! complete value. The `decode_*` functions return `Ok(None)` while the
//! input is still a valid prefix.

use crate::core::types::{Command, Response, Telemetry};
use crate::error::{Error, Result};

/// Literal sent when an action is accepted
pub const SUCCESS_LITERAL: &[u8] = b"success";

/// Literal sent when an action is declined
pub const FAILURE_LITERAL: &[u8] = b"failed";

/// Pre-JSON telemetry request still sent by older clients
pub const LEGACY_GET: &[u8] = b"get";

/// Requests larger than this are rejected
pub const MAX_REQUEST_SIZE: usize = 2048;

/// Responses larger than this are rejected
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024;

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Serialize a command for the wire
pub fn encode_command(cmd: &Command) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(cmd)?)
}

/// Parse a request received by the server
///
/// Returns `Ok(None)` while more bytes are needed.
pub fn decode_request(bytes: &[u8]) -> Result<Option<Command>> {
    let trimmed = trim_nul(bytes).trim_ascii();
    if trimmed == LEGACY_GET {
        return Ok(Some(Command::Get));
    }
    if trimmed.is_empty() || LEGACY_GET.starts_with(trimmed) {
        return Ok(None);
    }

    match serde_json::from_slice::<Command>(trimmed) {
        Ok(cmd) => Ok(Some(cmd)),
        Err(e) if e.is_eof() => Ok(None),
        Err(e) => Err(Error::Protocol(format!("Invalid request: {}", e))),
    }
}

/// Serialize a response for the wire
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    match response {
        Response::Success => Ok(SUCCESS_LITERAL.to_vec()),
        Response::Failure => Ok(FAILURE_LITERAL.to_vec()),
        Response::Telemetry(telemetry) => Ok(serde_json::to_vec(telemetry)?),
    }
}

/// Parse the response to `cmd`
///
/// Query commands expect a telemetry object (or the failure literal); action
/// commands expect an outcome literal. Returns `Ok(None)` while more bytes are
/// needed.
pub fn decode_response(cmd: &Command, bytes: &[u8]) -> Result<Option<Response>> {
    let trimmed = trim_nul(bytes);

    if trimmed == FAILURE_LITERAL {
        return Ok(Some(Response::Failure));
    }

    if cmd.is_query() {
        if FAILURE_LITERAL.starts_with(trimmed) {
            return Ok(None);
        }
        return match serde_json::from_slice::<Telemetry>(trimmed) {
            Ok(telemetry) => Ok(Some(Response::Telemetry(Box::new(telemetry)))),
            Err(e) if e.is_eof() => Ok(None),
            Err(e) => Err(Error::Protocol(format!(
                "Invalid telemetry for '{}': {}",
                cmd.name(),
                e
            ))),
        };
    }

    if trimmed == SUCCESS_LITERAL {
        return Ok(Some(Response::Success));
    }
    if SUCCESS_LITERAL.starts_with(trimmed) || FAILURE_LITERAL.starts_with(trimmed) {
        return Ok(None);
    }
    Err(Error::Protocol(format!(
        "Unexpected response to '{}': {:?}",
        cmd.name(),
        String::from_utf8_lossy(trimmed)
    )))
}
