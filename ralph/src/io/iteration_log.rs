//! Raw per-iteration event logs (`.ralph/logs/<timestamp>.jsonl`).
//!
//! Each log is a verbatim copy of the bytes the agent wrote to stdout. It is
//! the durable audit trail, independent of the rendered transcript.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// An open raw log for one iteration.
#[derive(Debug)]
pub struct IterationLog {
    path: PathBuf,
    file: File,
}

impl IterationLog {
    /// Create a new log named after `started_at`.
    ///
    /// Never overwrites: a second log in the same second gets a `-<n>` suffix.
    pub fn create(logs_dir: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(logs_dir)
            .with_context(|| format!("create logs dir {}", logs_dir.display()))?;
        let stem = started_at.format(TIMESTAMP_FORMAT).to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.jsonl")
            } else {
                format!("{stem}-{attempt}.jsonl")
            };
            let path = logs_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), "created iteration log");
                    return Ok(Self { path, file });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create log {}", path.display()));
                }
            }
        }
        Err(anyhow!(
            "no free log name for {stem} in {}",
            logs_dir.display()
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wrap `reader` so every byte read is also appended to this log.
    pub fn tee<'a, R: Read + ?Sized>(&'a mut self, reader: &'a mut R) -> TeeReader<'a, R> {
        TeeReader {
            inner: reader,
            log: &mut self.file,
            path: &self.path,
            failed: false,
        }
    }
}

/// Reader that copies everything it reads into the iteration log.
///
/// Log write failures are reported once and then ignored so the live stream
/// keeps flowing.
pub struct TeeReader<'a, R: ?Sized> {
    inner: &'a mut R,
    log: &'a mut File,
    path: &'a Path,
    failed: bool,
}

impl<R: Read + ?Sized> Read for TeeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 && !self.failed {
            // Flush per chunk so the log can be tailed while the agent runs.
            if let Err(err) = self.log.write_all(&buf[..n]).and_then(|()| self.log.flush()) {
                warn!(err = %err, path = %self.path.display(), "failed to write iteration log");
                self.failed = true;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, secs)
            .single()
            .expect("timestamp")
    }

    #[test]
    fn names_log_after_start_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = IterationLog::create(&temp.path().join("logs"), at(5)).expect("create");
        assert!(log.path().ends_with("logs/20250101-120005.jsonl"));
        assert!(log.path().is_file());
    }

    #[test]
    fn same_second_gets_suffix_instead_of_overwriting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = IterationLog::create(temp.path(), at(0)).expect("first");
        let second = IterationLog::create(temp.path(), at(0)).expect("second");
        let third = IterationLog::create(temp.path(), at(0)).expect("third");
        assert!(first.path().ends_with("20250101-120000.jsonl"));
        assert!(second.path().ends_with("20250101-120000-1.jsonl"));
        assert!(third.path().ends_with("20250101-120000-2.jsonl"));
    }

    #[test]
    fn tee_copies_bytes_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = IterationLog::create(temp.path(), at(1)).expect("create");
        let raw = b"{\"type\":\"system\"}\nnot json\n\n{\"type\":\"result\"}";
        let mut source = Cursor::new(raw.to_vec());

        let mut seen = Vec::new();
        log.tee(&mut source).read_to_end(&mut seen).expect("read");

        assert_eq!(seen, raw);
        assert_eq!(fs::read(log.path()).expect("read log"), raw);
    }
}
