//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, and worker-pool sizing through pipeline operations
//! without polluting every function signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scenegif::{CancellationToken, PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(10)
//!     .with_threads(4);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::SceneGifError;
use crate::progress::{CancellationToken, NoOpProgress, OperationType, ProgressCallback, ProgressTracker};

/// Operational settings shared by every pipeline stage.
///
/// A default-constructed value reports nothing, never cancels, and sizes
/// the worker pool to the available cores.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) threads: Option<usize>,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            threads: None,
        }
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Fire the progress callback every `batch_size` items (clamped to 1).
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Size the scene-rendering worker pool. `0` means available cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = (threads > 0).then_some(threads);
        self
    }

    /// The cancellation token, if one is attached.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Return [`SceneGifError::Cancelled`] if cancellation was requested.
    pub(crate) fn check_cancelled(&self) -> Result<(), SceneGifError> {
        if self.is_cancelled() {
            Err(SceneGifError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn tracker(&self, operation: OperationType, total: Option<u64>) -> ProgressTracker {
        ProgressTracker::new(self.progress.clone(), operation, total, self.batch_size)
    }

    /// Number of rayon workers to use for independent scene work.
    pub(crate) fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_inert() {
        let options = PipelineOptions::new();
        assert!(!options.is_cancelled());
        assert!(options.check_cancelled().is_ok());
        assert!(options.worker_count() >= 1);
        let debug = format!("{options:?}");
        assert!(debug.contains("has_cancellation: false"));
        assert!(debug.contains("batch_size: 1"));
    }

    #[test]
    fn zero_threads_means_automatic() {
        let options = PipelineOptions::new().with_threads(0);
        assert_eq!(options.threads, None);
        let options = PipelineOptions::new().with_threads(3);
        assert_eq!(options.worker_count(), 3);
    }

    #[test]
    fn cancelled_token_is_observed() {
        let token = CancellationToken::new();
        let options = PipelineOptions::new().with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(
            options.check_cancelled(),
            Err(SceneGifError::Cancelled)
        ));
    }
}
