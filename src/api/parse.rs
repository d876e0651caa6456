//! Newline-delimited JSON parsing of poll responses.

use crate::error::{NtfyError, Result};
use crate::types::Message;

/// Parse a poll response body.
///
/// Blank lines are ignored and non-message events (open, keepalive) are
/// skipped. Any line that fails to parse fails the whole body.
pub fn parse_messages(body: &str) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(line)
            .map_err(|e| NtfyError::Parse(format!("line {}: {}", index + 1, e)))?;
        if message.is_message() {
            messages.push(message);
        }
    }
    Ok(messages)
}

/// Parse a single-message response.
///
/// `Ok(None)` for an empty body or a body holding only non-message events.
pub fn parse_message(body: &str) -> Result<Option<Message>> {
    Ok(parse_messages(body)?.into_iter().next())
}
