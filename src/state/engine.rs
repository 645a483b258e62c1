//! Per-connection response engine.
//!
//! Couples the frame decoder with the pending queue: bytes go in, completed
//! requests come out. No I/O happens here.

use crate::error::{Error, Result};
use crate::protocol::decoder::FrameDecoder;

use super::pending::{Completion, PendingQueue};

/// Decoder and pending queue for one connection lifetime.
#[derive(Debug)]
pub struct ResponseEngine<C> {
    decoder: FrameDecoder,
    pending: PendingQueue<C>,
}

impl<C: Completion> ResponseEngine<C> {
    /// Create an engine with no buffered input and nothing pending.
    pub fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            pending: PendingQueue::new(),
        }
    }

    /// Register a request that has been (or is about to be) written.
    pub fn push(&mut self, command: impl Into<String>, completion: C) {
        self.pending.push(command, completion);
    }

    /// Feed bytes from the stream and complete every request whose frame
    /// is now whole.
    ///
    /// Returns the number of requests completed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` on a protocol violation. The connection must
    /// not be used afterwards; the caller rejects what is still pending with
    /// [`fail_all`](Self::fail_all).
    pub fn receive(&mut self, data: &[u8]) -> Result<usize> {
        self.decoder.feed(data);

        let mut resolved = 0;
        while let Some(frame) = self.decoder.next_frame()? {
            if self.pending.is_empty() {
                return Err(Error::Protocol(format!(
                    "unexpected reply {:?} with no request outstanding; unconsumed input: {:?}",
                    frame,
                    self.decoder.unconsumed()
                )));
            }
            self.pending.resolve(frame)?;
            resolved += 1;
        }
        Ok(resolved)
    }

    /// Reject every pending request and drop buffered input.
    pub fn fail_all(&mut self, make_error: impl FnMut() -> Error) {
        self.decoder.clear();
        self.pending.fail_all(make_error);
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Input received but not yet consumed by a frame.
    pub fn unconsumed(&self) -> String {
        self.decoder.unconsumed()
    }
}

impl<C: Completion> Default for ResponseEngine<C> {
    fn default() -> Self {
        Self::new()
    }
}
