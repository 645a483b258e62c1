//! Sans-I/O connection state.
//!
//! Nothing in this module touches a socket. The async client feeds it bytes
//! and hands it completions; everything protocol-related is decided here.

pub mod batch;
pub mod engine;
pub mod pending;

pub use batch::BatchOutcome;
pub use engine::ResponseEngine;
pub use pending::{Completion, PendingQueue};
