//! A pipelined client for the rrdcached daemon protocol.
//!
//! # Features
//!
//! - **Pipelining**: any number of tasks share one connection; replies are
//!   matched to requests in submission order
//! - **Sans-I/O core**: frame decoding and reply correlation live in
//!   [`protocol`] and [`state`] and never touch a socket
//! - **BATCH transactions**: per-command failures reported by index
//! - **Lazy connection**: opened on first use, reopened after it breaks
//!
//! # Example
//!
//! ```no_run
//! use zero_rrdcached::tokio::Client;
//!
//! #[tokio::main]
//! async fn main() -> zero_rrdcached::Result<()> {
//!     let client = Client::new("unix:/run/rrdcached.sock")?;
//!
//!     client.ping().await?;
//!     client.update("load.rrd", &["N:0.42"]).await?;
//!
//!     let outcome = client
//!         .batch(["UPDATE a.rrd N:1", "UPDATE b.rrd N:2"])
//!         .await?;
//!     if let Some(errors) = outcome.errors() {
//!         for (index, message) in errors {
//!             eprintln!("command {index} failed: {message}");
//!         }
//!     }
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod opts;
pub mod payload;
pub mod protocol;
pub mod state;
pub mod stats;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use error::{Error, Result};
pub use opts::Opts;
pub use payload::Payload;
pub use state::BatchOutcome;
pub use stats::Stats;
