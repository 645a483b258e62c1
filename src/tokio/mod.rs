//! Asynchronous rrdcached client using Tokio.

mod client;
mod handle;
mod stream;

pub use client::Client;
pub use handle::ResponseHandle;
pub use stream::{AsyncStream, ConnectFuture, Connector, OptsConnector, Stream};
