//! rrdcached wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `command`: Client → daemon request lines (encoding)
//! - `decoder`: Daemon → client reply frames (incremental parsing)

pub mod command;
pub mod decoder;

pub use command::{quote_path, write_batch_payload, write_command};
pub use decoder::{Frame, FrameDecoder};

/// Command that switches the daemon into bulk-load mode.
pub const BATCH: &str = "BATCH";

/// Line that ends a BATCH payload.
pub const BATCH_TERMINATOR: &str = ".";

/// Command asking the daemon to close the connection.
pub const QUIT: &str = "QUIT";
