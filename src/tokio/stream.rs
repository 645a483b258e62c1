//! Async stream abstraction for tokio.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::error::{Error, Result};
use crate::opts::Opts;

/// Any duplex byte stream the client can run the protocol over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> AsyncStream for T {}

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Duplex byte stream connected to the daemon.
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
    /// Any other transport (in-process pipes, proxies, ...)
    Other(Box<dyn AsyncStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }

    pub fn from_io<T: AsyncStream>(io: T) -> Self {
        Self::Other(Box::new(io))
    }

    /// Split into independently owned read and write halves.
    pub(crate) fn into_split(self) -> (BoxedReader, BoxedWriter) {
        match self {
            Stream::Tcp(s) => {
                let (r, w) = s.into_split();
                (Box::new(r), Box::new(w))
            }
            Stream::Unix(s) => {
                let (r, w) = s.into_split();
                (Box::new(r), Box::new(w))
            }
            Stream::Other(s) => {
                let (r, w) = tokio::io::split(s);
                (Box::new(r), Box::new(w))
            }
        }
    }
}

/// Future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Stream>> + Send + 'a>>;

/// Opens a new stream to the daemon.
///
/// The client calls this lazily: on the first submission and on the first
/// submission after the previous connection was torn down.
pub trait Connector: Send + Sync + 'static {
    /// Open a stream.
    fn connect(&self) -> ConnectFuture<'_>;
}

/// Connects to the address in [`Opts`]: the unix socket if set, TCP otherwise.
#[derive(Debug, Clone)]
pub struct OptsConnector {
    opts: Opts,
}

impl OptsConnector {
    pub fn new(opts: Opts) -> Self {
        Self { opts }
    }
}

impl Connector for OptsConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            if let Some(socket_path) = &self.opts.socket {
                return Ok(Stream::unix(UnixStream::connect(socket_path).await?));
            }
            if self.opts.host.is_empty() {
                return Err(Error::InvalidUsage(
                    "neither socket nor host is set".into(),
                ));
            }
            let addr = format!("{}:{}", self.opts.host, self.opts.port);
            let tcp = TcpStream::connect(&addr).await?;
            tcp.set_nodelay(true)?;
            Ok(Stream::tcp(tcp))
        })
    }
}
