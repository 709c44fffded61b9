//! Extraction of values embedded in HTML/JS page bodies.
//!
//! BambooHR inlines the interesting state as JS literals (`SESSION_USER=`,
//! `window.time_tracking = `, `CSRF_TOKEN = "`). We find the marker, then
//! read exactly one balanced expression after it instead of reaching for a
//! full HTML parser.

use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::BambooError;

/// Locate `marker` in `body` and return the one balanced expression that
/// immediately follows it: a quoted string (escapes honored), a `{…}`/`[…]`
/// structure (nesting and embedded strings honored), or a bare literal run.
pub fn find_balanced_value<'a>(marker: &str, body: &'a str) -> Result<&'a str, BambooError> {
    let Some(at) = body.find(marker) else {
        error!("Marker {:?} not found in page body", marker);
        return Err(BambooError::Scrape { marker: marker.to_string() });
    };
    let rest = &body[at + marker.len()..];

    match rest.bytes().next() {
        Some(b'"') | Some(b'\'') => quoted(marker, rest),
        Some(b'{') => delimited(marker, rest, b'{', b'}'),
        Some(b'[') => delimited(marker, rest, b'[', b']'),
        _ => Ok(bare(rest)),
    }
}

/// [`find_balanced_value`] followed by a JSON decode. An empty extraction is
/// treated as JSON `null`; a value that fails to decode is reported as a
/// scrape failure, since it means the page no longer carries what we expect.
pub fn find_json<T: DeserializeOwned>(marker: &str, body: &str) -> Result<T, BambooError> {
    let raw = find_balanced_value(marker, body)?;
    let raw = if raw.is_empty() { "null" } else { raw };
    serde_json::from_str(raw).map_err(|e| {
        error!("Value after marker {:?} is not valid JSON: {}", marker, e);
        BambooError::Scrape { marker: marker.to_string() }
    })
}

fn quoted<'a>(marker: &str, rest: &'a str) -> Result<&'a str, BambooError> {
    let bytes = rest.as_bytes();
    let quote = bytes[0];
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(&rest[..=i]),
            _ => i += 1,
        }
    }
    Err(BambooError::Scrape { marker: marker.to_string() })
}

fn delimited<'a>(marker: &str, rest: &'a str, open: u8, close: u8) -> Result<&'a str, BambooError> {
    let bytes = rest.as_bytes();
    let mut depth = 0usize;
    let mut in_string: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(quote) = in_string {
            if b == b'\\' {
                i += 1;
            } else if b == quote {
                in_string = None;
            }
        } else if b == b'"' || b == b'\'' {
            in_string = Some(b);
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Ok(&rest[..=i]);
            }
        }
        i += 1;
    }
    Err(BambooError::Scrape { marker: marker.to_string() })
}

fn bare(rest: &str) -> &str {
    let end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ';' | ',' | '}' | ']' | '<'))
        .unwrap_or(rest.len());
    &rest[..end]
}
