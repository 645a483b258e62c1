//! Pending request queue.
//!
//! The daemon answers strictly in submission order, so the oldest pending
//! request always owns the next decoded frame.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::protocol::command::command_name;
use crate::protocol::decoder::Frame;

/// Receiver side of a request's outcome.
///
/// `complete` consumes the value, so a request can be completed at most once.
pub trait Completion {
    /// Deliver the outcome of the request.
    fn complete(self, result: Result<Payload>);
}

#[cfg(feature = "tokio")]
impl Completion for tokio::sync::oneshot::Sender<Result<Payload>> {
    fn complete(self, result: Result<Payload>) {
        if self.send(result).is_err() {
            tracing::trace!("reply discarded; caller stopped waiting");
        }
    }
}

/// A request written to the stream and not yet answered.
#[derive(Debug)]
pub struct PendingRequest<C> {
    /// Command text as submitted (for diagnostics)
    command: String,
    completion: C,
}

/// FIFO of outstanding requests.
#[derive(Debug)]
pub struct PendingQueue<C> {
    entries: VecDeque<PendingRequest<C>>,
}

impl<C: Completion> PendingQueue<C> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a request at the tail.
    pub fn push(&mut self, command: impl Into<String>, completion: C) {
        self.entries.push_back(PendingRequest {
            command: command.into(),
            completion,
        });
    }

    /// Complete the head request with a decoded frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if no request is waiting for the frame.
    pub fn resolve(&mut self, frame: Frame) -> Result<()> {
        let Some(request) = self.entries.pop_front() else {
            return Err(Error::Protocol(format!(
                "received {frame:?} with no request outstanding"
            )));
        };

        let result = match frame {
            Frame::Error(message) => Err(Error::Command {
                command: command_name(&request.command).to_owned(),
                message,
            }),
            Frame::Simple(message) if message.eq_ignore_ascii_case("errors") => {
                Ok(Payload::Bool(true))
            }
            Frame::Simple(message) => Ok(Payload::Text(message)),
            Frame::Multi(lines) => Ok(Payload::Lines(lines)),
        };
        tracing::trace!(
            command = command_name(&request.command),
            ok = result.is_ok(),
            "resolved"
        );
        request.completion.complete(result);
        Ok(())
    }

    /// Reject every outstanding request and empty the queue.
    pub fn fail_all(&mut self, mut make_error: impl FnMut() -> Error) {
        for request in self.entries.drain(..) {
            request.completion.complete(Err(make_error()));
        }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command text of the oldest outstanding request.
    pub fn head(&self) -> Option<&str> {
        self.entries.front().map(|r| r.command.as_str())
    }
}

impl<C: Completion> Default for PendingQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Completion recording outcomes into a shared log, tagged by a label.
    #[derive(Clone)]
    pub(crate) struct Recorder {
        pub label: &'static str,
        pub log: Rc<RefCell<Vec<(&'static str, Result<Payload>)>>>,
    }

    impl Completion for Recorder {
        fn complete(self, result: Result<Payload>) {
            self.log.borrow_mut().push((self.label, result));
        }
    }

    pub(crate) fn recorder(
        log: &Rc<RefCell<Vec<(&'static str, Result<Payload>)>>>,
        label: &'static str,
    ) -> Recorder {
        Recorder {
            label,
            log: Rc::clone(log),
        }
    }

    #[test]
    fn test_fifo_resolution() {
        let log = Rc::default();
        let mut queue = PendingQueue::new();
        queue.push("PING", recorder(&log, "a"));
        queue.push("STATS", recorder(&log, "b"));

        queue.resolve(Frame::Simple("PONG".into())).unwrap();
        queue
            .resolve(Frame::Multi(vec!["QueueLength: 0".into()]))
            .unwrap();

        let log = log.borrow();
        assert_eq!(log[0].0, "a");
        assert_eq!(log[0].1.as_ref().unwrap(), &Payload::Text("PONG".into()));
        assert_eq!(log[1].0, "b");
        assert_eq!(
            log[1].1.as_ref().unwrap(),
            &Payload::Lines(vec!["QueueLength: 0".into()])
        );
    }

    #[test]
    fn test_error_rejects_only_head() {
        let log = Rc::default();
        let mut queue = PendingQueue::new();
        queue.push("FLUSH /tmp/a.rrd", recorder(&log, "a"));
        queue.push("PING", recorder(&log, "b"));

        queue.resolve(Frame::Error("No such file".into())).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.head(), Some("PING"));

        let log = log.borrow();
        match &log[0].1 {
            Err(Error::Command { command, message }) => {
                assert_eq!(command, "FLUSH");
                assert_eq!(message, "No such file");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_errors_is_boolean() {
        let log = Rc::default();
        let mut queue = PendingQueue::new();
        queue.push("UPDATE a 1:1\n.", recorder(&log, "a"));
        queue.push("UPDATE b 1:1\n.", recorder(&log, "b"));

        queue.resolve(Frame::Simple("errors".into())).unwrap();
        queue.resolve(Frame::Simple("Errors".into())).unwrap();

        let log = log.borrow();
        assert_eq!(log[0].1.as_ref().unwrap(), &Payload::Bool(true));
        assert_eq!(log[1].1.as_ref().unwrap(), &Payload::Bool(true));
    }

    #[test]
    fn test_unmatched_frame() {
        let mut queue: PendingQueue<Recorder> = PendingQueue::new();
        let err = queue.resolve(Frame::Simple("PONG".into())).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_fail_all() {
        let log = Rc::default();
        let mut queue = PendingQueue::new();
        queue.push("PING", recorder(&log, "a"));
        queue.push("PING", recorder(&log, "b"));
        queue.push("PING", recorder(&log, "c"));

        queue.fail_all(|| Error::ConnectionClosed);

        assert!(queue.is_empty());
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert!(
            log.iter()
                .all(|(_, r)| matches!(r, Err(Error::ConnectionClosed)))
        );
    }
}
