//! BATCH summary interpretation.
//!
//! After the terminator line the daemon answers the whole batch with one
//! frame: `0 errors` when every command was accepted, otherwise
//! `N errors` followed by `N` lines of `<command number> <message>`.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::payload::Payload;

/// Outcome of a BATCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every command in the batch was accepted.
    Success,
    /// Per-command failures, keyed by 1-based command number.
    Errors(BTreeMap<usize, String>),
}

impl BatchOutcome {
    /// Interpret the reply to a BATCH terminator.
    ///
    /// # Errors
    ///
    /// Returns `Error::BatchSummary` if a summary line is not
    /// `<digits> <message>`.
    pub fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Bool(_) | Payload::Text(_) => Ok(BatchOutcome::Success),
            Payload::Lines(lines) => {
                let mut errors = BTreeMap::new();
                for line in lines {
                    let (index, message) = parse_summary_line(&line)
                        .ok_or_else(|| Error::BatchSummary(line.clone()))?;
                    errors.insert(index, message.to_owned());
                }
                Ok(BatchOutcome::Errors(errors))
            }
        }
    }

    /// Returns true if no command failed.
    pub fn is_success(&self) -> bool {
        match self {
            BatchOutcome::Success => true,
            BatchOutcome::Errors(errors) => errors.is_empty(),
        }
    }

    /// Failures keyed by command number (empty on success).
    pub fn errors(&self) -> Option<&BTreeMap<usize, String>> {
        match self {
            BatchOutcome::Success => None,
            BatchOutcome::Errors(errors) => Some(errors),
        }
    }
}

fn parse_summary_line(line: &str) -> Option<(usize, &str)> {
    let (index, message) = line.split_once(' ')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((index.parse().ok()?, message))
}
