//! Stale-iteration detection.
//!
//! An iteration is stale when the repository revision after it is the same as
//! the revision observed after the previous one. The loop aborts once
//! `max_stale` consecutive stale iterations have been seen.

/// Threshold used when the configured value is zero or negative.
pub const DEFAULT_MAX_STALE: u32 = 2;

/// Result of feeding one revision to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleCheck {
    pub abort: bool,
    pub stale_count: u32,
}

/// Tracks consecutive iterations with no new revision.
#[derive(Debug, Clone)]
pub struct StaleDetector {
    max_stale: u32,
    stale_count: u32,
    last_revision: Option<String>,
}

impl StaleDetector {
    pub fn new(max_stale: i64) -> Self {
        let max_stale = if max_stale <= 0 {
            DEFAULT_MAX_STALE
        } else {
            u32::try_from(max_stale).unwrap_or(u32::MAX)
        };
        Self {
            max_stale,
            stale_count: 0,
            last_revision: None,
        }
    }

    pub fn max_stale(&self) -> u32 {
        self.max_stale
    }

    /// Compare `revision` against the previous observation.
    ///
    /// The first call only seeds the baseline and never aborts.
    pub fn check(&mut self, revision: &str) -> StaleCheck {
        let Some(last) = self.last_revision.as_deref() else {
            self.last_revision = Some(revision.to_string());
            return StaleCheck {
                abort: false,
                stale_count: 0,
            };
        };

        if last == revision {
            self.stale_count += 1;
        } else {
            self.stale_count = 0;
            self.last_revision = Some(revision.to_string());
        }

        StaleCheck {
            abort: self.stale_count >= self.max_stale,
            stale_count: self.stale_count,
        }
    }
}
