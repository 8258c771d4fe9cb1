//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes decode work (full extraction runs and
//! single-slot refreshes) and [`CancellationToken`] stops it cooperatively.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use movieprint::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let options = ExtractOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding the planned frames of a full run.
    FrameExtraction,
    /// Decoding a single scrubbed slot.
    SlotRefresh,
}

/// A snapshot of progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled
/// by [`ExtractOptions::with_batch_size`](crate::ExtractOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Frame number of the item just completed.
    pub current_frame: Option<u64>,
    /// Source timestamp of the item just completed.
    pub current_timestamp: Option<Duration>,
}

/// Receives progress updates.
///
/// Callbacks run on whichever thread completes the work, so
/// implementations must be [`Send`] and [`Sync`].
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` items and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards every report; used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared stop flag for decode work.
///
/// Clones share one flag. The extraction engine checks
/// [`is_cancelled`](CancellationToken::is_cancelled) before each per-frame
/// decode; decodes already running finish but their results are discarded.
///
/// # Example
///
/// ```
/// use movieprint::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// let run_token = token.clone();
/// token.cancel();
/// assert!(run_token.is_cancelled());
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop every run holding a clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts completed slots and forwards a [`ProgressInfo`] every
/// `batch_size` of them. Shared by reference between pool workers.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: u64,
    batch_size: u64,
    started: Instant,
    completed: AtomicU64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: u64,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            batch_size: batch_size.max(1),
            started: Instant::now(),
            completed: AtomicU64::new(0),
        }
    }

    /// Mark the slot decoded at `timestamp` as done.
    pub(crate) fn complete(&self, frame_number: u64, timestamp: Duration) {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done % self.batch_size == 0 {
            self.emit(done, Some(frame_number), Some(timestamp));
        }
    }

    /// Emit the closing report.
    pub(crate) fn finish(&self) {
        self.emit(self.completed.load(Ordering::Acquire), None, None);
    }

    fn emit(&self, done: u64, frame_number: Option<u64>, timestamp: Option<Duration>) {
        let elapsed = self.started.elapsed();
        let fraction = (self.total > 0).then(|| done as f64 / self.total as f64);
        let estimated_remaining = fraction
            .filter(|&fraction| fraction > 0.0)
            .map(|fraction| elapsed.mul_f64((1.0 - fraction).max(0.0) / fraction));

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: done,
            total: Some(self.total),
            percentage: fraction.map(|fraction| (fraction * 100.0) as f32),
            elapsed,
            estimated_remaining,
            current_frame: frame_number,
            current_timestamp: timestamp,
        });
    }
}
