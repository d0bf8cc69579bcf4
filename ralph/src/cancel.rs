//! Cooperative cancellation shared between the loop and the agent process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

/// Thread-safe cancellation flag.
///
/// Raised asynchronously (SIGINT), observed by the loop at iteration
/// boundaries and by the agent adapter, which kills its subprocess.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Route SIGINT into this token instead of terminating the process.
    pub fn register_sigint(&self) -> Result<()> {
        #[cfg(unix)]
        {
            signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.cancelled))
                .context("register SIGINT handler")?;
        }
        Ok(())
    }
}
