//! Line-oriented decoder for the agent's event stream.

use std::fmt;
use std::io::{BufRead, Read};

use anyhow::{Context, Result};
use tracing::debug;

use super::event::Event;

/// Longest line accepted before the stream is considered broken (1 MiB).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A single line exceeded [`MAX_LINE_BYTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTooLongError {
    pub limit: usize,
}

impl fmt::Display for LineTooLongError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event line exceeds {} bytes", self.limit)
    }
}

impl std::error::Error for LineTooLongError {}

/// Lazily decodes one [`Event`] per non-blank line.
///
/// Lines that are not valid event records are skipped. Reading stops for good
/// after end-of-stream or the first I/O error.
pub struct EventParser<R> {
    reader: R,
    done: bool,
    skipped: u64,
}

impl<R: BufRead> EventParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
            skipped: 0,
        }
    }

    /// Number of non-blank lines that failed to decode so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let limit = (MAX_LINE_BYTES + 1) as u64;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .context("read event stream")?;
        if n == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(LineTooLongError {
                limit: MAX_LINE_BYTES,
            }
            .into());
        }
        Ok(Some(line))
    }
}

impl<R: BufRead> Iterator for EventParser<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Event>(&line) {
                Ok(event) => return Some(Ok(event)),
                Err(err) => {
                    self.skipped += 1;
                    debug!(err = %err, len = line.len(), "skipping malformed event line");
                }
            }
        }
        None
    }
}
