//! Success payload of a daemon reply.

use crate::error::{Error, Result};

/// Success payload of a single reply frame.
///
/// Every caller pattern-matches on this; the daemon decides the shape by the
/// status token of the reply:
/// - `0 <message>` → [`Payload::Text`] (or [`Payload::Bool`] for `0 errors`)
/// - `N <message>` with `N > 0` → [`Payload::Lines`] holding the `N` lines that follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text after the `0` status token.
    Text(String),
    /// A boolean acknowledgement.
    ///
    /// Produced for the zero-error BATCH summary `0 errors`.
    Bool(bool),
    /// Payload lines of a multi-line reply, in order.
    Lines(Vec<String>),
}

impl Payload {
    /// Borrow the text if this is a [`Payload::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Borrow the lines if this is a [`Payload::Lines`].
    pub fn as_lines(&self) -> Option<&[String]> {
        match self {
            Payload::Lines(lines) => Some(lines),
            _ => None,
        }
    }

    /// Take the text, failing with a protocol error for other shapes.
    pub fn into_text(self) -> Result<String> {
        match self {
            Payload::Text(text) => Ok(text),
            other => Err(Error::Protocol(format!(
                "expected a single-line reply, got {}",
                other.kind()
            ))),
        }
    }

    /// Take the lines of a multi-line reply.
    ///
    /// A single-line reply counts as zero payload lines, which is how the
    /// daemon answers list-like commands with nothing to report.
    pub fn into_lines(self) -> Result<Vec<String>> {
        match self {
            Payload::Lines(lines) => Ok(lines),
            Payload::Text(_) => Ok(Vec::new()),
            Payload::Bool(_) => Err(Error::Protocol(
                "expected a multi-line reply, got a boolean".into(),
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bool(_) => "a boolean",
            Payload::Lines(_) => "a multi-line reply",
        }
    }
}
