//! Asynchronous rrdcached client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::payload::Payload;
use crate::protocol::command::{command_name, quote_path, write_batch_payload, write_command};
use crate::protocol::{BATCH, QUIT};
use crate::state::{BatchOutcome, ResponseEngine};
use crate::stats::Stats;

use super::handle::{Responder, ResponseHandle};
use super::stream::{BoxedReader, BoxedWriter, Connector, OptsConnector, Stream};

/// Pipelined rrdcached client.
///
/// Cloning is cheap; every clone shares one connection. Any number of tasks
/// may submit commands concurrently: requests are written in submission
/// order and each reply is routed to the oldest outstanding request.
///
/// The connection is opened on the first submission and reopened on the
/// first submission after it was torn down. There is no retry: a request
/// that was outstanding when the connection broke fails with
/// [`Error::ConnectionClosed`] or [`Error::Protocol`].
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    opts: Opts,
    connector: Box<dyn Connector>,
    shared: Mutex<Shared>,
    /// Serializes connection attempts.
    connect_lock: tokio::sync::Mutex<()>,
    /// Woken by `close()` to abandon an in-progress connect.
    cancel_connect: Notify,
    /// Shared by ordinary writes, exclusive while a BATCH is being written.
    write_gate: RwLock<()>,
    /// Held for the whole lifetime of a BATCH transaction.
    batch_gate: tokio::sync::Mutex<()>,
}

struct Shared {
    /// Bumped on every connect attempt and on `close()`.
    generation: u64,
    state: ConnState,
}

enum ConnState {
    Disconnected,
    Connecting,
    Connected(Connection),
}

/// One live stream with its reader and writer tasks.
struct Connection {
    generation: u64,
    engine: ResponseEngine<Responder>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed_tx: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn shutdown(mut self, make_error: impl FnMut() -> Error) {
        self.reader.abort();
        self.writer.abort();
        self.engine.fail_all(make_error);
        self.closed_tx.send_replace(true);
    }
}

impl Client {
    /// Create a client for the daemon described by `opts`.
    ///
    /// Does not connect; the first submission does.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let connector = OptsConnector::new(opts.clone());
        Ok(Self::with_connector(opts, connector))
    }

    /// Create a client and open its connection right away.
    pub async fn connect<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let client = Self::new(opts)?;
        client.ensure_connected().await?;
        Ok(client)
    }

    /// Create a client that opens streams through `connector`.
    ///
    /// Only the timeouts and buffer size of `opts` are used; the address
    /// is up to the connector.
    pub fn with_connector(opts: Opts, connector: impl Connector) -> Self {
        Self {
            inner: Arc::new(Inner {
                opts,
                connector: Box::new(connector),
                shared: Mutex::new(Shared {
                    generation: 0,
                    state: ConnState::Disconnected,
                }),
                connect_lock: tokio::sync::Mutex::new(()),
                cancel_connect: Notify::new(),
                write_gate: RwLock::new(()),
                batch_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Write a command and return a handle to its reply.
    ///
    /// The command is on its way to the daemon when this returns, so
    /// several commands can be submitted before any reply is awaited.
    /// While a BATCH is being written, this waits until the batch payload
    /// has been handed to the stream.
    ///
    /// The handle does not apply `command_timeout`; [`command`](Self::command) does.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUsage` for an empty command or an embedded newline
    /// - `Error::Io` if the connection cannot be opened
    /// - `Error::ConnectionClosed` if the connection went away meanwhile
    pub async fn submit(&self, command: &str) -> Result<ResponseHandle> {
        let mut bytes = Vec::with_capacity(command.len() + 1);
        write_command(&mut bytes, command)?;
        let command = command.strip_suffix('\n').unwrap_or(command);

        let _gate = self.inner.write_gate.read().await;
        let generation = self.ensure_connected().await?;
        self.inner.dispatch(generation, command, bytes)
    }

    /// Send a command and wait for its reply.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`submit`](Self::submit):
    /// - `Error::Command` if the daemon answered with `-1`
    /// - `Error::Timeout` if `command_timeout` expired; the request keeps its
    ///   place in the reply order and its reply is discarded on arrival
    pub async fn command(&self, command: &str) -> Result<Payload> {
        let handle = self.submit(command).await?;
        self.wait(handle).await
    }

    async fn wait(&self, handle: ResponseHandle) -> Result<Payload> {
        match self.inner.opts.command_timeout {
            Some(limit) => {
                let name = command_name(handle.command()).to_owned();
                tokio::time::timeout(limit, handle)
                    .await
                    .map_err(|_| Error::Timeout(name))?
            }
            None => handle.await,
        }
    }

    /// Run `commands` as one BATCH transaction.
    ///
    /// Batches are serialized: a second batch does not write its `BATCH`
    /// line until the first one's summary has arrived. Ordinary commands
    /// submitted while the batch is being written wait for its terminator
    /// line and are then pipelined after it.
    ///
    /// Dropping the returned future after `BATCH` went out but before the
    /// terminator closes the connection.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUsage` if `commands` is empty or holds an invalid line
    ///   (checked before anything is written)
    /// - `Error::Command` if the daemon refused to open the batch
    /// - `Error::BatchSummary` if the error summary is malformed
    pub async fn batch<I, S>(&self, commands: I) -> Result<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut payload = Vec::new();
        let count = write_batch_payload(&mut payload, commands)?;
        let mut open_line = Vec::with_capacity(BATCH.len() + 1);
        write_command(&mut open_line, BATCH)?;

        let _batch_permit = self.inner.batch_gate.lock().await;
        let write_permit = self.inner.write_gate.write().await;
        let generation = self.ensure_connected().await?;

        let opened = self.inner.dispatch(generation, BATCH, open_line)?;
        let mut guard = OpenBatch {
            inner: &self.inner,
            generation,
            armed: true,
        };
        match self.wait(opened).await {
            Ok(_) => {}
            Err(e @ Error::Command { .. }) => {
                // The daemon did not enter batch mode.
                guard.armed = false;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let text = String::from_utf8_lossy(&payload).into_owned();
        let summary = self.inner.dispatch(generation, &text, payload)?;
        guard.armed = false;
        drop(write_permit);
        tracing::trace!(generation, count, "batch payload written");

        BatchOutcome::from_payload(self.wait(summary).await?)
    }

    /// Send `QUIT` and wait for the daemon to close the stream.
    ///
    /// Outstanding requests are answered before the daemon closes; anything
    /// still pending afterwards fails with `Error::ConnectionClosed`. Does
    /// nothing if there is no connection.
    pub async fn quit(&self) -> Result<()> {
        let mut closed = {
            let mut bytes = Vec::with_capacity(QUIT.len() + 1);
            write_command(&mut bytes, QUIT)?;
            let _gate = self.inner.write_gate.read().await;
            let shared = self.inner.lock();
            let ConnState::Connected(conn) = &shared.state else {
                return Ok(());
            };
            if conn.writer_tx.send(bytes).is_err() {
                return Ok(());
            }
            tracing::debug!(generation = conn.generation, "QUIT sent");
            conn.closed_tx.subscribe()
        };

        match self.inner.opts.command_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, closed.wait_for(|closed| *closed))
                    .await
                    .is_err()
                {
                    self.close();
                    return Err(Error::Timeout(QUIT.into()));
                }
            }
            None => {
                let _ = closed.wait_for(|closed| *closed).await;
            }
        }
        Ok(())
    }

    /// Close the connection immediately.
    ///
    /// Rejects every outstanding request with `Error::ConnectionClosed` and
    /// abandons a connect in progress. The client stays usable; the next
    /// submission reconnects.
    pub fn close(&self) {
        let conn = {
            let mut shared = self.inner.lock();
            shared.generation += 1;
            match std::mem::replace(&mut shared.state, ConnState::Disconnected) {
                ConnState::Connected(conn) => Some(conn),
                ConnState::Connecting | ConnState::Disconnected => None,
            }
        };
        self.inner.cancel_connect.notify_waiters();
        if let Some(conn) = conn {
            tracing::debug!(generation = conn.generation, "closing connection");
            conn.shutdown(|| Error::ConnectionClosed);
        }
    }

    /// Returns true if a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected_generation().is_some()
    }

    /// Number of requests written and not yet answered.
    pub fn pending_count(&self) -> usize {
        match &self.inner.lock().state {
            ConnState::Connected(conn) => conn.engine.pending_len(),
            ConnState::Connecting | ConnState::Disconnected => 0,
        }
    }

    /// Returns true while a BATCH transaction is in progress.
    pub fn is_batch_open(&self) -> bool {
        self.inner.batch_gate.try_lock().is_err()
    }

    // === Commands ===

    /// Check that the daemon is alive.
    pub async fn ping(&self) -> Result<()> {
        let reply = self.command("PING").await?.into_text()?;
        if reply != "PONG" {
            return Err(Error::Protocol(format!("unexpected PING reply: {reply:?}")));
        }
        Ok(())
    }

    /// Fetch the daemon's counters.
    pub async fn stats(&self) -> Result<Stats> {
        let lines = self.command("STATS").await?.into_lines()?;
        Stats::parse(&lines)
    }

    /// Write the pending updates of one file to disk.
    pub async fn flush(&self, path: &str) -> Result<()> {
        self.command(&format!("FLUSH {}", quote_path(path))).await?;
        Ok(())
    }

    /// Write all pending updates to disk.
    pub async fn flush_all(&self) -> Result<()> {
        self.command("FLUSHALL").await?;
        Ok(())
    }

    /// Updates queued for a file and not yet written.
    pub async fn pending(&self, path: &str) -> Result<Vec<String>> {
        self.command(&format!("PENDING {}", quote_path(path)))
            .await?
            .into_lines()
    }

    /// Drop the queued updates of a file without writing them.
    pub async fn forget(&self, path: &str) -> Result<()> {
        self.command(&format!("FORGET {}", quote_path(path))).await?;
        Ok(())
    }

    /// Files in the write queue with the number of values waiting for each.
    pub async fn queue(&self) -> Result<Vec<(usize, String)>> {
        let lines = self.command("QUEUE").await?.into_lines()?;
        lines
            .into_iter()
            .map(|line| {
                line.split_once(' ')
                    .and_then(|(count, file)| Some((count.parse().ok()?, file.to_owned())))
                    .ok_or_else(|| Error::Protocol(format!("malformed QUEUE line: {line:?}")))
            })
            .collect()
    }

    /// Queue values for a file.
    ///
    /// Each value is a `timestamp:v1[:v2...]` string as accepted by rrdupdate.
    pub async fn update<S: AsRef<str>>(&self, path: &str, values: &[S]) -> Result<()> {
        if values.is_empty() {
            return Err(Error::InvalidUsage("UPDATE requires at least one value".into()));
        }
        let mut command = format!("UPDATE {}", quote_path(path));
        for value in values {
            command.push(' ');
            command.push_str(value.as_ref());
        }
        self.command(&command).await?;
        Ok(())
    }

    /// Timestamp of the first row of archive `rra` in a file.
    pub async fn first(&self, path: &str, rra: usize) -> Result<i64> {
        let reply = self
            .command(&format!("FIRST {} {rra}", quote_path(path)))
            .await?;
        parse_timestamp("FIRST", reply)
    }

    /// Timestamp of the last update of a file.
    pub async fn last(&self, path: &str) -> Result<i64> {
        let reply = self
            .command(&format!("LAST {}", quote_path(path)))
            .await?;
        parse_timestamp("LAST", reply)
    }

    /// Files below a directory of the daemon's base directory.
    pub async fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        let command = if recursive {
            format!("LIST RECURSIVE {}", quote_path(path))
        } else {
            format!("LIST {}", quote_path(path))
        };
        self.command(&command).await?.into_lines()
    }

    // === Connection management ===

    async fn ensure_connected(&self) -> Result<u64> {
        if let Some(generation) = self.inner.connected_generation() {
            return Ok(generation);
        }
        let _connecting = self.inner.connect_lock.lock().await;
        if let Some(generation) = self.inner.connected_generation() {
            return Ok(generation);
        }

        let cancelled = self.inner.cancel_connect.notified();
        let generation = {
            let mut shared = self.inner.lock();
            shared.generation += 1;
            shared.state = ConnState::Connecting;
            shared.generation
        };
        tracing::debug!(generation, "connecting");

        let result = tokio::select! {
            result = self.inner.open_stream() => result,
            () = cancelled => Err(Error::ConnectionClosed),
        };
        match result {
            Ok(stream) => self.inner.install(generation, stream),
            Err(e) => {
                tracing::debug!(generation, error = %e, "connect failed");
                self.inner.abandon_connect(generation);
                Err(e)
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connected_generation(&self) -> Option<u64> {
        match &self.lock().state {
            ConnState::Connected(conn) => Some(conn.generation),
            ConnState::Connecting | ConnState::Disconnected => None,
        }
    }

    async fn open_stream(&self) -> Result<Stream> {
        match self.opts.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connector.connect())
                .await
                .map_err(|_| Error::Timeout("connect".into()))?,
            None => self.connector.connect().await,
        }
    }

    /// Start the reader and writer tasks and publish the connection, unless
    /// `close()` ran while connecting.
    fn install(self: &Arc<Self>, generation: u64, stream: Stream) -> Result<u64> {
        let mut shared = self.lock();
        if shared.generation != generation || !matches!(shared.state, ConnState::Connecting) {
            return Err(Error::ConnectionClosed);
        }

        let (reader, writer) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        let reader = tokio::spawn(read_loop(
            Arc::downgrade(self),
            generation,
            reader,
            self.opts.read_buffer_size,
        ));
        let writer = tokio::spawn(write_loop(
            Arc::downgrade(self),
            generation,
            writer,
            writer_rx,
        ));

        shared.state = ConnState::Connected(Connection {
            generation,
            engine: ResponseEngine::new(),
            writer_tx,
            closed_tx,
            reader,
            writer,
        });
        tracing::debug!(generation, "connected");
        Ok(generation)
    }

    fn abandon_connect(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation == generation && matches!(shared.state, ConnState::Connecting) {
            shared.state = ConnState::Disconnected;
        }
    }

    /// Hand the bytes to the writer and enqueue the request in one step, so
    /// queue order always equals write order.
    fn dispatch(&self, generation: u64, command: &str, bytes: Vec<u8>) -> Result<ResponseHandle> {
        let mut shared = self.lock();
        let ConnState::Connected(conn) = &mut shared.state else {
            return Err(Error::ConnectionClosed);
        };
        if conn.generation != generation {
            return Err(Error::ConnectionClosed);
        }
        conn.writer_tx
            .send(bytes)
            .map_err(|_| Error::ConnectionClosed)?;
        let (responder, handle) = ResponseHandle::new(command);
        conn.engine.push(command, responder);
        tracing::trace!(generation, command = command_name(command), "submitted");
        Ok(handle)
    }

    /// Feed bytes read from connection `generation`.
    ///
    /// Returns false if that connection is no longer current.
    fn receive(&self, generation: u64, data: &[u8]) -> Result<bool> {
        let mut shared = self.lock();
        match &mut shared.state {
            ConnState::Connected(conn) if conn.generation == generation => {
                conn.engine.receive(data)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Tear down connection `generation` if it is still current.
    fn teardown(&self, generation: u64, make_error: impl FnMut() -> Error) -> bool {
        let conn = {
            let mut shared = self.lock();
            if !matches!(&shared.state, ConnState::Connected(conn) if conn.generation == generation)
            {
                return false;
            }
            match std::mem::replace(&mut shared.state, ConnState::Disconnected) {
                ConnState::Connected(conn) => conn,
                ConnState::Connecting | ConnState::Disconnected => return false,
            }
        };
        conn.shutdown(make_error);
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self
            .shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let ConnState::Connected(conn) =
            std::mem::replace(&mut shared.state, ConnState::Disconnected)
        {
            conn.shutdown(|| Error::ConnectionClosed);
        }
    }
}

/// Closes the connection if a BATCH is abandoned between its `BATCH` line
/// and its terminator; the daemon would otherwise read later commands as
/// part of the batch.
struct OpenBatch<'a> {
    inner: &'a Inner,
    generation: u64,
    armed: bool,
}

impl Drop for OpenBatch<'_> {
    fn drop(&mut self) {
        if self.armed && self.inner.teardown(self.generation, || Error::ConnectionClosed) {
            tracing::warn!(
                generation = self.generation,
                "batch abandoned before its terminator; connection closed"
            );
        }
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut reader: BoxedReader,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let violation = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(generation, "daemon closed the connection");
                break None;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(generation, error = %e, "read failed");
                break None;
            }
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match inner.receive(generation, &buf[..n]) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(generation, error = %e, "protocol violation; closing connection");
                break Some(match e {
                    Error::Protocol(message) => message,
                    other => other.to_string(),
                });
            }
        }
    };

    let Some(inner) = inner.upgrade() else {
        return;
    };
    match violation {
        Some(message) => inner.teardown(generation, || Error::Protocol(message.clone())),
        None => inner.teardown(generation, || Error::ConnectionClosed),
    };
}

async fn write_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut writer: BoxedWriter,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(generation, error = %e, "write failed; closing connection");
            if let Some(inner) = inner.upgrade() {
                inner.teardown(generation, || Error::ConnectionClosed);
            }
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(generation, error = %e, "shutdown of the write half failed");
    }
}

fn parse_timestamp(command: &str, reply: Payload) -> Result<i64> {
    let text = reply.into_text()?;
    text.trim().parse().map_err(|_| {
        Error::Protocol(format!("unexpected {command} reply: {text:?}"))
    })
}
