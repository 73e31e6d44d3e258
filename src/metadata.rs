//! Video metadata types.
//!
//! Metadata is read once when a source is opened and cached for the
//! lifetime of the handle.

use std::time::Duration;

/// Native properties of a video source.
///
/// # Example
///
/// ```no_run
/// use scenegif::{FrameSource, VideoFile};
///
/// let source = VideoFile::open("input.mp4").unwrap();
/// let metadata = source.metadata();
/// println!("{}x{} @ {:.2} fps, {:?}", metadata.width, metadata.height,
///     metadata.frames_per_second, metadata.duration);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Estimated total number of frames, computed from duration and frame rate.
    pub frame_count: u64,
    /// Total duration. `Duration::ZERO` when the container does not report one.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"rawvideo"`).
    pub codec: String,
}

impl VideoMetadata {
    /// Duration of one frame at the native rate, if the rate is known.
    pub fn frame_period(&self) -> Option<Duration> {
        (self.frames_per_second > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / self.frames_per_second))
    }
}
