//! Daemon statistics (`STATS` reply).

use crate::error::{Error, Result};

/// Counters reported by the daemon's `STATS` command.
///
/// Each payload line has the form `Name: value`. Names this crate does not
/// know are kept in [`Stats::other`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of files waiting to be written
    pub queue_length: u64,
    /// Updates received since the daemon started
    pub updates_received: u64,
    /// FLUSH requests received
    pub flushes_received: u64,
    /// Updates written to disk
    pub updates_written: u64,
    /// Data sets written to disk
    pub data_sets_written: u64,
    /// Nodes in the daemon's file tree
    pub tree_nodes_number: u64,
    /// Depth of the daemon's file tree
    pub tree_depth: u64,
    /// Bytes written to the journal
    pub journal_bytes: u64,
    /// Journal rotations
    pub journal_rotate: u64,
    /// Unrecognized counters, in reply order
    pub other: Vec<(String, u64)>,
}

impl Stats {
    /// Parse the payload lines of a `STATS` reply.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if a line is not `Name: <unsigned integer>`.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let mut stats = Stats::default();
        for line in lines {
            let line = line.as_ref();
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Protocol(format!("malformed STATS line: {line:?}")))?;
            let value: u64 = value.trim().parse().map_err(|e| {
                Error::Protocol(format!("malformed STATS value in {line:?}: {e}"))
            })?;

            let name = name.trim();
            match name {
                "QueueLength" => stats.queue_length = value,
                "UpdatesReceived" => stats.updates_received = value,
                "FlushesReceived" => stats.flushes_received = value,
                "UpdatesWritten" => stats.updates_written = value,
                "DataSetsWritten" => stats.data_sets_written = value,
                "TreeNodesNumber" => stats.tree_nodes_number = value,
                "TreeDepth" => stats.tree_depth = value,
                "JournalBytes" => stats.journal_bytes = value,
                "JournalRotate" => stats.journal_rotate = value,
                _ => stats.other.push((name.to_owned(), value)),
            }
        }
        Ok(stats)
    }
}
