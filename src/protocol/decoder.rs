//! Incremental reply decoder.
//!
//! Bytes read from the socket are appended to a raw buffer. Complete
//! `\n`-terminated lines move into a line backlog, and frames are assembled
//! from the backlog once all of their lines are present:
//!
//! ```text
//! 0 PONG                      -> Frame::Simple("PONG")
//! -1 No such file             -> Frame::Error("No such file")
//! 2 Errors                    -> Frame::Multi(["1 bad thing", "2 other thing"])
//! 1 bad thing
//! 2 other thing
//! ```

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Status token of an error reply.
const ERROR_STATUS: &str = "-1";

/// One complete reply from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Status `-1`: the command failed with this message.
    Error(String),
    /// Status `0`: single-line reply.
    Simple(String),
    /// Status `N > 0`: the `N` lines following the status line.
    Multi(Vec<String>),
}

/// Parsed status line, before its payload lines are known to be present.
enum Status<'a> {
    Error(&'a str),
    Lines(usize, &'a str),
}

/// Decoder turning a byte stream into reply frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet terminated by a newline.
    buffer: Vec<u8>,
    /// Complete lines not yet consumed by a frame.
    lines: VecDeque<String>,
    /// Set when the head of `buffer` is a complete line that is not UTF-8.
    /// Line splitting stops there; the line is reported once it is reached.
    invalid_line: Option<String>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream and split off every complete line.
    ///
    /// The unterminated remainder stays buffered for the next call. A line
    /// that is not valid UTF-8 stops the splitting: it and everything after
    /// it stay in the raw buffer, and [`next_frame`](Self::next_frame)
    /// reports the violation once the frames before it are consumed.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.invalid_line.is_some() {
            return;
        }

        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', &self.buffer) {
            match simdutf8::compat::from_utf8(&self.buffer[start..end]) {
                Ok(line) => {
                    self.lines.push_back(line.to_owned());
                    start = end + 1;
                }
                Err(e) => {
                    self.invalid_line = Some(e.to_string());
                    break;
                }
            }
        }
        self.buffer.drain(..start);
    }

    /// Try to assemble the next frame from the line backlog.
    ///
    /// Returns `Ok(None)` when the head frame is incomplete; nothing is
    /// consumed in that case.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the head line is not a valid status line,
    /// or if the head frame runs into a line that is not valid UTF-8. The
    /// message carries everything still unconsumed for diagnostics.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(head) = self.lines.front() else {
            return self.incomplete();
        };

        let status = match parse_status(head) {
            Some(status) => status,
            None => {
                return Err(Error::Protocol(format!(
                    "malformed status line {:?}; unconsumed input:\n{}",
                    head,
                    self.unconsumed()
                )));
            }
        };

        let frame = match status {
            Status::Error(message) => Frame::Error(message.to_owned()),
            Status::Lines(0, message) => Frame::Simple(message.to_owned()),
            Status::Lines(count, _) => {
                if self.lines.len() - 1 < count {
                    return self.incomplete();
                }
                self.lines.pop_front();
                let payload = self.lines.drain(..count).collect();
                return Ok(Some(Frame::Multi(payload)));
            }
        };
        self.lines.pop_front();
        Ok(Some(frame))
    }

    /// The head frame needs lines that are not split off yet.
    fn incomplete(&self) -> Result<Option<Frame>> {
        match &self.invalid_line {
            Some(reason) => Err(Error::Protocol(format!(
                "reply line is not valid UTF-8 ({reason}); unconsumed input:\n{}",
                self.unconsumed()
            ))),
            None => Ok(None),
        }
    }

    /// Everything received but not yet consumed, lines first, then the
    /// unterminated remainder.
    pub fn unconsumed(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&String::from_utf8_lossy(&self.buffer));
        out
    }

    /// Number of complete lines waiting for a frame.
    pub fn buffered_lines(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if no bytes are buffered at all.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.buffer.is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lines.clear();
        self.invalid_line = None;
    }
}

/// Split a status line at the first space and classify its status token.
fn parse_status(line: &str) -> Option<Status<'_>> {
    let (token, rest) = line.split_once(' ')?;
    if token == ERROR_STATUS {
        return Some(Status::Error(rest));
    }
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let count = token.parse().ok()?;
    Some(Status::Lines(count, rest))
}
