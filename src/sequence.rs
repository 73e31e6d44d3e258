//! In-memory [`FrameSource`].
//!
//! [`ImageSequence`] plays back a list of equally-sized RGB frames at a
//! constant frame rate. It is useful for frames produced elsewhere (screen
//! captures, renders) and for exercising the pipeline without a decoder.

use std::{path::PathBuf, sync::Arc, time::Duration};

use image::{RgbImage, imageops::FilterType};

use crate::{
    error::SceneGifError,
    metadata::VideoMetadata,
    progress::CancellationToken,
    source::{Flow, FrameHandler, FrameSource, SourceRef, TimeWindow, TimedFrame, WindowCursor},
};

/// Frames held in memory at a constant frame rate.
///
/// Frame `i` is presented at `i / fps` seconds and the sequence lasts
/// `len / fps` seconds. Clones share the frame buffer.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use scenegif::{FrameSource, ImageSequence};
///
/// let frames = vec![RgbImage::from_pixel(64, 36, Rgb([0, 0, 0])); 20];
/// let sequence = ImageSequence::new(frames, 10.0)?;
/// assert_eq!(sequence.metadata().duration.as_secs(), 2);
/// # Ok::<(), scenegif::SceneGifError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ImageSequence {
    frames: Arc<Vec<RgbImage>>,
    metadata: VideoMetadata,
    label: String,
}

impl ImageSequence {
    /// Wrap `frames` played back at `frames_per_second`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneGifError::SourceUnreadable`] for an empty sequence,
    /// a non-positive frame rate, zero-sized frames or frames of differing
    /// sizes.
    pub fn new(frames: Vec<RgbImage>, frames_per_second: f64) -> Result<Self, SceneGifError> {
        let label = "<memory>".to_string();
        let unreadable = |reason: &str| SceneGifError::SourceUnreadable {
            path: PathBuf::from(&label),
            reason: reason.to_string(),
        };

        let Some(first) = frames.first() else {
            return Err(unreadable("sequence has no frames"));
        };
        if !frames_per_second.is_finite() || frames_per_second <= 0.0 {
            return Err(unreadable("frame rate must be positive"));
        }
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(unreadable("frames have zero dimensions"));
        }
        if frames.iter().any(|frame| frame.dimensions() != (width, height)) {
            return Err(unreadable("frames differ in size"));
        }

        let metadata = VideoMetadata {
            width,
            height,
            frames_per_second,
            frame_count: frames.len() as u64,
            duration: Duration::from_secs_f64(frames.len() as f64 / frames_per_second),
            codec: "rawvideo".to_string(),
        };

        Ok(Self {
            frames: Arc::new(frames),
            metadata,
            label,
        })
    }

    /// Name this sequence for logs and error messages.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The label set with [`with_label`](ImageSequence::with_label).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`: empty sequences are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Presentation time of frame `index`.
    pub fn timestamp_of(&self, index: usize) -> Duration {
        Duration::from_secs_f64(index as f64 / self.metadata.frames_per_second)
    }
}

impl FrameSource for ImageSequence {
    fn identifier(&self) -> String {
        self.label.clone()
    }

    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn source_ref(&self) -> SourceRef {
        SourceRef::Memory(self.clone())
    }

    fn for_each_frame(
        &mut self,
        window: TimeWindow,
        output_size: Option<(u32, u32)>,
        cancellation: Option<&CancellationToken>,
        handler: &mut FrameHandler<'_>,
    ) -> Result<(), SceneGifError> {
        let native = (self.metadata.width, self.metadata.height);
        let target = output_size.unwrap_or(native);

        // One frame of lead-in so the cursor sees the frame on screen at `start`.
        let first = ((window.start.as_secs_f64() * self.metadata.frames_per_second).floor()
            as usize)
            .saturating_sub(1);

        let mut cursor = WindowCursor::new(window);
        for index in first..self.frames.len() {
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Err(SceneGifError::Cancelled);
            }

            let source = &self.frames[index];
            let image = if target == native {
                source.clone()
            } else {
                image::imageops::resize(source, target.0, target.1, FilterType::Triangle)
            };

            let frame = TimedFrame {
                index: index as u64,
                timestamp: self.timestamp_of(index),
                image,
            };
            if cursor.offer(frame, handler)? == Flow::Done {
                return Ok(());
            }
        }

        cursor.finish(handler)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn sequence(count: usize, fps: f64) -> ImageSequence {
        let frames = (0..count)
            .map(|index| RgbImage::from_pixel(8, 6, Rgb([index as u8, 0, 0])))
            .collect();
        ImageSequence::new(frames, fps).unwrap()
    }

    fn collect(
        sequence: &mut ImageSequence,
        window: TimeWindow,
        size: Option<(u32, u32)>,
    ) -> Vec<TimedFrame> {
        let mut frames = Vec::new();
        sequence
            .for_each_frame(window, size, None, &mut |frame| {
                frames.push(frame);
                Ok(())
            })
            .unwrap();
        frames
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(ImageSequence::new(Vec::new(), 10.0).is_err());
        assert!(ImageSequence::new(vec![RgbImage::new(2, 2)], 0.0).is_err());
        assert!(ImageSequence::new(vec![RgbImage::new(2, 2)], f64::NAN).is_err());
        assert!(ImageSequence::new(vec![RgbImage::new(0, 2)], 10.0).is_err());
        assert!(ImageSequence::new(vec![RgbImage::new(2, 2), RgbImage::new(3, 2)], 10.0).is_err());
    }

    #[test]
    fn metadata_follows_frame_rate() {
        let sequence = sequence(25, 10.0);
        assert_eq!(sequence.metadata().duration, Duration::from_millis(2500));
        assert_eq!(sequence.metadata().frame_count, 25);
        assert_eq!(sequence.timestamp_of(20), Duration::from_secs(2));
    }

    #[test]
    fn window_selects_frames_by_timestamp() {
        let mut sequence = sequence(30, 10.0);
        let frames = collect(
            &mut sequence,
            TimeWindow::between(Duration::from_secs(1), Duration::from_secs(2)),
            None,
        );
        let indices: Vec<u64> = frames.iter().map(|frame| frame.index).collect();
        assert_eq!(indices, (10..20).collect::<Vec<u64>>());
        assert_eq!(frames[0].timestamp, Duration::from_secs(1));
    }

    #[test]
    fn output_size_rescales_frames() {
        let mut sequence = sequence(3, 10.0);
        let frames = collect(&mut sequence, TimeWindow::full(), Some((4, 3)));
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|frame| frame.image.dimensions() == (4, 3)));
    }

    #[test]
    fn cancellation_stops_playback() {
        let mut sequence = sequence(3, 10.0);
        let token = CancellationToken::new();
        token.cancel();
        let result = sequence.for_each_frame(TimeWindow::full(), None, Some(&token), &mut |_| Ok(()));
        assert!(matches!(result, Err(SceneGifError::Cancelled)));
    }
}
