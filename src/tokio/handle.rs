//! Completion handle for a submitted command.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::payload::Payload;

/// Sender half stored in the pending queue.
pub(crate) type Responder = oneshot::Sender<Result<Payload>>;

/// Resolves to the reply of one submitted command.
///
/// Created by [`Client::submit`](super::Client::submit). Dropping the handle
/// stops waiting without disturbing the reply order: the reply is still
/// consumed when its turn comes and then discarded.
#[derive(Debug)]
#[must_use = "the reply is discarded unless the handle is awaited"]
pub struct ResponseHandle {
    command: String,
    rx: oneshot::Receiver<Result<Payload>>,
}

impl ResponseHandle {
    pub(crate) fn new(command: &str) -> (Responder, Self) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            command: command.to_owned(),
            rx,
        };
        (tx, handle)
    }

    /// Command text this handle waits for.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Future for ResponseHandle {
    type Output = Result<Payload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without completing: the connection state went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
