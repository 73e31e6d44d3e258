//! Progress reporting and cancellation support.
//!
//! Segmentation and encoding are long-running. This module provides
//! [`ProgressCallback`] for observing them, [`CancellationToken`] for
//! aborting them cooperatively, and [`ProgressInfo`] snapshots.
//!
//! Cancellation is checked between frames and between scene intervals.
//! A cancelled encode never leaves a file at its final path.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scenegif::{
//!     CancellationToken, DetectorConfig, PipelineOptions, ProgressCallback,
//!     ProgressInfo, SceneGifError, VideoFile,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//!
//! let mut source = VideoFile::open("input.mp4")?;
//! let scenes = scenegif::segment_with_options(&mut source, &DetectorConfig::default(), &options)?;
//! # Ok::<(), SceneGifError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Scoring frames and declaring scene cuts.
    SceneDetection,
    /// Encoding one clip to GIF (progress counts output frames).
    GifEncoding,
    /// Rendering every scene of a job (progress counts scenes).
    SceneRendering,
    /// Merging GIF artifacts (progress counts written frames).
    GifCombining,
}

/// A snapshot of pipeline progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled
/// by [`PipelineOptions::with_batch_size`](crate::PipelineOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items (frames / scenes / artifacts) have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The media timestamp currently being processed, if any.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because scene rendering
/// reports from rayon worker threads.
///
/// Callbacks observe but cannot halt the operation. Use
/// [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an operation.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state: call [`cancel`](CancellationToken::cancel) from any
/// thread to stop every operation holding a clone.
///
/// # Example
///
/// ```
/// use scenegif::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks progress timing and emits callbacks every `batch_size` items.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one completed item and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, timestamp: Option<Duration>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(timestamp);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|total| {
                let remaining = total.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn tracker_reports_per_batch_and_on_finish() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut tracker =
            ProgressTracker::new(recorder.clone(), OperationType::GifEncoding, Some(5), 2);
        for _ in 0..5 {
            tracker.advance(None);
        }
        tracker.finish();

        let infos = recorder.0.lock().unwrap();
        let counts: Vec<u64> = infos.iter().map(|info| info.current).collect();
        assert_eq!(counts, vec![2, 4, 5]);
        assert_eq!(infos.last().unwrap().percentage, Some(100.0));
    }

    #[test]
    fn tracker_clamps_zero_batch_size() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut tracker =
            ProgressTracker::new(recorder.clone(), OperationType::SceneDetection, None, 0);
        tracker.advance(Some(Duration::from_secs(1)));
        let infos = recorder.0.lock().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].percentage, None);
    }
}
