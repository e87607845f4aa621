//! Progress reporting and cooperative cancellation for long-running algorithms.
//!
//! Algorithms report progress through a callback and call
//! [`Progress::checkpoint`] at natural stopping points (the end of an
//! iteration, every few thousand settled nodes). A checkpoint fails with
//! [`SurfaceError::Cancelled`] once the shared cancel flag is raised or the
//! deadline has passed.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use sulcus::algo::progress::Progress;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! })
//! .with_cancel_flag(Arc::clone(&cancel));
//!
//! assert!(progress.checkpoint().is_ok());
//! cancel.store(true, Ordering::Relaxed);
//! assert!(progress.checkpoint().is_err());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SurfaceError};

/// A progress callback with an optional cancel flag and deadline.
///
/// The callback receives:
/// - `current`: Current step (0-based)
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            cancel: None,
            deadline: None,
        }
    }

    /// Poll `flag` at every checkpoint.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Stop at the first checkpoint after `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stop at the first checkpoint once `timeout` has elapsed from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress within a sub-range.
    ///
    /// Maps `[0, sub_total]` onto the slot `[range_current, range_current + 1]`
    /// of `range_total` steps, so nested stages (levels inside a cycle) share
    /// a single bar.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        range_current: usize,
        range_total: usize,
        message: &str,
    ) {
        if sub_total == 0 || range_total == 0 {
            return;
        }
        let sub_fraction = (sub_current.min(sub_total) * 1000) / sub_total;
        let effective = range_current * 1000 + sub_fraction;
        (self.callback)(effective, range_total * 1000, message);
    }

    /// True once cancellation was requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Fail with [`SurfaceError::Cancelled`] if the operation should stop.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        match self.stop_reason() {
            Some(reason) => Err(SurfaceError::Cancelled { reason }),
            None => Ok(()),
        }
    }

    fn stop_reason(&self) -> Option<&'static str> {
        if self
            .cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
        {
            return Some("cancel requested");
        }
        if self.deadline.map_or(false, |d| Instant::now() >= d) {
            return Some("deadline exceeded");
        }
        None
    }

    /// Create a no-op progress reporter that never cancels.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("cancellable", &self.cancel.is_some())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
