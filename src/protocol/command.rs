//! Request encoding.
//!
//! Every request is one `\n`-terminated line, except the BATCH payload which
//! is a run of command lines closed by a line holding only `.`.

use crate::error::{Error, Result};

/// Write a single command line.
///
/// One trailing newline is accepted and trimmed; any other newline would
/// make the daemon see more commands than the caller queued replies for.
///
/// # Errors
///
/// Returns `Error::InvalidUsage` for an empty command or an embedded newline.
pub fn write_command(buf: &mut Vec<u8>, command: &str) -> Result<()> {
    let command = command.strip_suffix('\n').unwrap_or(command);
    if command.trim().is_empty() {
        return Err(Error::InvalidUsage("empty command".into()));
    }
    if memchr::memchr(b'\n', command.as_bytes()).is_some() {
        return Err(Error::InvalidUsage(format!(
            "command contains an embedded newline: {command:?}"
        )));
    }
    buf.extend_from_slice(command.as_bytes());
    buf.push(b'\n');
    Ok(())
}

/// Write the body of a BATCH: every command on its own line, then the
/// terminator line.
///
/// Returns the number of commands written.
///
/// # Errors
///
/// Returns `Error::InvalidUsage` if there are no commands, or if any command
/// is empty, contains a newline, or is itself the terminator.
pub fn write_batch_payload<I, S>(buf: &mut Vec<u8>, commands: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut count = 0;
    for command in commands {
        let command = command.as_ref();
        if command.trim_end_matches('\n') == super::BATCH_TERMINATOR {
            return Err(Error::InvalidUsage(
                "batch command cannot be the terminator line".into(),
            ));
        }
        write_command(buf, command)?;
        count += 1;
    }
    if count == 0 {
        return Err(Error::InvalidUsage("batch requires at least one command".into()));
    }
    buf.extend_from_slice(super::BATCH_TERMINATOR.as_bytes());
    buf.push(b'\n');
    Ok(count)
}

/// Escape a file name for use as a command argument.
///
/// The daemon splits arguments on spaces and honours backslash escapes.
pub fn quote_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '\\' || c == ' ' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Leading whitespace-delimited token of a command, used to tag errors.
pub fn command_name(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}
