//! Frame sources.
//!
//! A [`FrameSource`] exposes a video as timestamped frames in presentation
//! order, plus its native [`VideoMetadata`]. Two implementations ship with
//! the crate: [`VideoFile`](crate::VideoFile), backed by FFmpeg, and
//! [`ImageSequence`](crate::ImageSequence), an in-memory sequence of frames
//! at a fixed rate.
//!
//! A source handle owns its decode cursor and is never shared between
//! threads. Work that runs in parallel keeps a [`SourceRef`] instead and
//! opens an independent handle per worker.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use image::RgbImage;

use crate::{
    error::SceneGifError, media::VideoFile, metadata::VideoMetadata,
    progress::CancellationToken, sequence::ImageSequence,
};

/// A decoded frame with its position on the source timeline.
#[derive(Debug, Clone)]
pub struct TimedFrame {
    /// Frame number at the native frame rate.
    pub index: u64,
    /// Presentation time measured from the start of the stream.
    pub timestamp: Duration,
    /// Pixel data, already scaled to the requested output size.
    pub image: RgbImage,
}

/// A span of the timeline to decode.
///
/// Delivery starts with the last frame at or before `start` (the frame
/// that is on screen at `start`) and continues with every frame strictly
/// before `end`. `end = None` decodes to the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: Duration,
    /// Exclusive end, or `None` for the rest of the stream.
    pub end: Option<Duration>,
}

impl TimeWindow {
    /// The whole timeline.
    pub fn full() -> Self {
        Self {
            start: Duration::ZERO,
            end: None,
        }
    }

    /// The span `[start, end)`.
    pub fn between(start: Duration, end: Duration) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }
}

/// Callback receiving frames from [`FrameSource::for_each_frame`].
pub type FrameHandler<'a> = dyn FnMut(TimedFrame) -> Result<(), SceneGifError> + 'a;

/// Frame-indexed, timestamped access to a video.
pub trait FrameSource {
    /// Human-readable identifier (usually the file path).
    fn identifier(&self) -> String;

    /// Native resolution, frame rate and duration.
    fn metadata(&self) -> &VideoMetadata;

    /// A locator that can open independent handles to the same video.
    fn source_ref(&self) -> SourceRef;

    /// Decode the frames of `window` in presentation order.
    ///
    /// Frames are scaled to `output_size` when given, otherwise delivered
    /// at native resolution. Cancellation is checked between frames.
    fn for_each_frame(
        &mut self,
        window: TimeWindow,
        output_size: Option<(u32, u32)>,
        cancellation: Option<&CancellationToken>,
        handler: &mut FrameHandler<'_>,
    ) -> Result<(), SceneGifError>;
}

/// A cloneable locator for a video, used to open independent handles.
#[derive(Debug, Clone)]
pub enum SourceRef {
    /// A file decoded with FFmpeg.
    Path(PathBuf),
    /// Frames held in memory.
    Memory(ImageSequence),
}

impl SourceRef {
    /// Open a fresh handle with its own decode cursor.
    pub fn open(&self) -> Result<Box<dyn FrameSource>, SceneGifError> {
        match self {
            SourceRef::Path(path) => Ok(Box::new(VideoFile::open(path)?)),
            SourceRef::Memory(sequence) => Ok(Box::new(sequence.clone())),
        }
    }

    /// Identifier used in error messages and logs.
    pub fn identifier(&self) -> String {
        match self {
            SourceRef::Path(path) => path.display().to_string(),
            SourceRef::Memory(sequence) => sequence.label().to_string(),
        }
    }
}

impl Display for SourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.identifier())
    }
}

impl From<PathBuf> for SourceRef {
    fn from(path: PathBuf) -> Self {
        SourceRef::Path(path)
    }
}

impl From<&Path> for SourceRef {
    fn from(path: &Path) -> Self {
        SourceRef::Path(path.to_path_buf())
    }
}

impl From<&str> for SourceRef {
    fn from(path: &str) -> Self {
        SourceRef::Path(PathBuf::from(path))
    }
}

impl From<ImageSequence> for SourceRef {
    fn from(sequence: ImageSequence) -> Self {
        SourceRef::Memory(sequence)
    }
}

/// Whether a decode loop should keep feeding frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Done,
}

/// Applies the [`TimeWindow`] delivery rule to a stream of frames.
///
/// Frames before `start` are held back; only the most recent one is kept so
/// it can open the window if no frame lands exactly on `start`.
pub(crate) struct WindowCursor {
    window: TimeWindow,
    pending: Option<TimedFrame>,
    opened: bool,
}

impl WindowCursor {
    pub(crate) fn new(window: TimeWindow) -> Self {
        Self {
            window,
            pending: None,
            opened: false,
        }
    }

    /// Feed the next frame in presentation order.
    pub(crate) fn offer(
        &mut self,
        frame: TimedFrame,
        handler: &mut FrameHandler<'_>,
    ) -> Result<Flow, SceneGifError> {
        if self.window.end.is_some_and(|end| frame.timestamp >= end) {
            self.finish(handler)?;
            return Ok(Flow::Done);
        }

        if frame.timestamp < self.window.start {
            self.pending = Some(frame);
            return Ok(Flow::Continue);
        }

        if !self.opened {
            self.opened = true;
            if frame.timestamp > self.window.start
                && let Some(pending) = self.pending.take()
            {
                handler(pending)?;
            }
        }

        handler(frame)?;
        Ok(Flow::Continue)
    }

    /// Signal end of stream. Emits the held-back frame if the window never
    /// opened.
    pub(crate) fn finish(&mut self, handler: &mut FrameHandler<'_>) -> Result<(), SceneGifError> {
        if !self.opened {
            self.opened = true;
            if let Some(pending) = self.pending.take() {
                handler(pending)?;
            }
        }
        Ok(())
    }
}
