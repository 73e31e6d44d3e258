//! FFmpeg-backed [`FrameSource`].
//!
//! [`VideoFile`] opens a container, selects the best video stream, caches
//! its [`VideoMetadata`] and decodes frames on demand. Every call to
//! [`FrameSource::for_each_frame`] builds a fresh decoder, seeks to the
//! keyframe at or before the window start and decodes forward.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::{
    conversion::{
        duration_to_micros, frame_to_rgb_buffer, pts_to_micros, pts_to_seconds,
        seconds_to_frame_number,
    },
    error::SceneGifError,
    metadata::VideoMetadata,
    progress::CancellationToken,
    source::{Flow, FrameHandler, FrameSource, SourceRef, TimeWindow, TimedFrame, WindowCursor},
};

/// FFmpeg's "no timestamp" sentinel (`AV_NOPTS_VALUE`).
const NO_TIMESTAMP: i64 = i64::MIN;

/// A video file opened for decoding.
///
/// # Example
///
/// ```no_run
/// use scenegif::{FrameSource, SceneGifError, TimeWindow, VideoFile};
///
/// let mut source = VideoFile::open("input.mp4")?;
/// source.for_each_frame(TimeWindow::full(), Some((160, 90)), None, &mut |frame| {
///     println!("frame {} at {:?}", frame.index, frame.timestamp);
///     Ok(())
/// })?;
/// # Ok::<(), SceneGifError>(())
/// ```
pub struct VideoFile {
    input_context: Input,
    stream_index: usize,
    metadata: VideoMetadata,
    path: PathBuf,
}

impl Debug for VideoFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoFile")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl VideoFile {
    /// Open a video file and read its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SceneGifError::SourceUnreadable`] if the file cannot be
    /// opened, has no video stream, or its decoder cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SceneGifError> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |reason: String| SceneGifError::SourceUnreadable {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening video source: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| unreadable(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| unreadable(error.to_string()))?;

        let container_micros = input_context.duration();

        let (stream_index, metadata) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or_else(|| unreadable("no video stream found".to_string()))?;
            let stream_index = stream.index();

            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| unreadable(format!("cannot create video decoder: {error}")))?;

            let frame_rate = stream.avg_frame_rate();
            let frames_per_second = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0
            {
                frame_rate.numerator() as f64 / frame_rate.denominator() as f64
            } else {
                let rate = stream.rate();
                if rate.denominator() != 0 {
                    rate.numerator() as f64 / rate.denominator() as f64
                } else {
                    0.0
                }
            };

            let duration = if container_micros > 0 {
                Duration::from_micros(container_micros as u64)
            } else if stream.duration() > 0 {
                Duration::from_secs_f64(pts_to_seconds(stream.duration(), stream.time_base()))
            } else {
                Duration::ZERO
            };

            let frame_count = if stream.frames() > 0 {
                stream.frames() as u64
            } else {
                (duration.as_secs_f64() * frames_per_second) as u64
            };

            let codec = decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            let metadata = VideoMetadata {
                width: decoder.width(),
                height: decoder.height(),
                frames_per_second,
                frame_count,
                duration,
                codec,
            };
            (stream_index, metadata)
        };

        if metadata.width == 0 || metadata.height == 0 {
            return Err(unreadable("video stream reports zero dimensions".to_string()));
        }

        log::debug!(
            "Opened {} ({}x{} @ {:.3} fps, {:?}, {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.duration,
            metadata.codec,
        );

        Ok(Self {
            input_context,
            stream_index,
            metadata,
            path,
        })
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoFile {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn source_ref(&self) -> SourceRef {
        SourceRef::Path(self.path.clone())
    }

    fn for_each_frame(
        &mut self,
        window: TimeWindow,
        output_size: Option<(u32, u32)>,
        cancellation: Option<&CancellationToken>,
        handler: &mut FrameHandler<'_>,
    ) -> Result<(), SceneGifError> {
        let stream_index = self.stream_index;
        let (time_base, start_pts, mut decoder) = {
            let stream = self.input_context.stream(stream_index).ok_or_else(|| {
                SceneGifError::SourceUnreadable {
                    path: self.path.clone(),
                    reason: "video stream is no longer available".to_string(),
                }
            })?;
            let start_pts = match stream.start_time() {
                NO_TIMESTAMP => 0,
                start => start,
            };
            let decoder = CodecContext::from_parameters(stream.parameters())?
                .decoder()
                .video()?;
            (stream.time_base(), start_pts, decoder)
        };

        let (target_width, target_height) =
            output_size.unwrap_or((self.metadata.width, self.metadata.height));
        let clock = StreamClock {
            time_base,
            start_pts,
            frames_per_second: self.metadata.frames_per_second,
        };

        // Always seek: a previous call may have left the demuxer at EOF.
        let seek_target = duration_to_micros(window.start) + pts_to_micros(start_pts, time_base);
        if let Err(error) = self.input_context.seek(seek_target, ..seek_target + 1) {
            log::debug!(
                "Seek to {:?} in {} failed ({error}), decoding from current position",
                window.start,
                self.path.display()
            );
        }

        let mut cursor = WindowCursor::new(window);
        let mut converter = RgbConverter::new(target_width, target_height);
        let mut decoded_frame = VideoFrame::empty();

        for (stream, packet) in self.input_context.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Err(SceneGifError::Cancelled);
            }

            decoder.send_packet(&packet)?;

            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                let frame = clock.timed_frame(&decoded_frame, &mut converter)?;
                if cursor.offer(frame, handler)? == Flow::Done {
                    return Ok(());
                }
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            let frame = clock.timed_frame(&decoded_frame, &mut converter)?;
            if cursor.offer(frame, handler)? == Flow::Done {
                return Ok(());
            }
        }

        cursor.finish(handler)
    }
}

/// Maps decoder timestamps onto the zero-based source timeline.
struct StreamClock {
    time_base: ffmpeg_next::Rational,
    start_pts: i64,
    frames_per_second: f64,
}

impl StreamClock {
    fn timed_frame(
        &self,
        decoded_frame: &VideoFrame,
        converter: &mut RgbConverter,
    ) -> Result<TimedFrame, SceneGifError> {
        let pts = decoded_frame
            .timestamp()
            .or_else(|| decoded_frame.pts())
            .unwrap_or(self.start_pts);
        let seconds = pts_to_seconds(pts - self.start_pts, self.time_base).max(0.0);

        Ok(TimedFrame {
            index: seconds_to_frame_number(seconds, self.frames_per_second),
            timestamp: Duration::from_secs_f64(seconds),
            image: converter.convert(decoded_frame)?,
        })
    }
}

/// Converts decoded frames to packed RGB at a fixed output size.
///
/// The scaler is rebuilt whenever the decoded format or size changes,
/// since some decoders switch pixel format mid-stream.
struct RgbConverter {
    target_width: u32,
    target_height: u32,
    scaler: Option<(ScalingContext, (Pixel, u32, u32))>,
    rgb_frame: VideoFrame,
}

impl RgbConverter {
    fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            scaler: None,
            rgb_frame: VideoFrame::empty(),
        }
    }

    fn convert(&mut self, decoded_frame: &VideoFrame) -> Result<RgbImage, SceneGifError> {
        let input = (
            decoded_frame.format(),
            decoded_frame.width(),
            decoded_frame.height(),
        );

        if self.scaler.as_ref().is_none_or(|(_, current)| *current != input) {
            let context = ScalingContext::get(
                input.0,
                input.1,
                input.2,
                Pixel::RGB24,
                self.target_width,
                self.target_height,
                ScalingFlags::BILINEAR,
            )?;
            self.scaler = Some((context, input));
        }

        let Some((scaler, _)) = self.scaler.as_mut() else {
            return Err(SceneGifError::FfmpegError(
                "scaler unavailable after initialisation".to_string(),
            ));
        };
        scaler.run(decoded_frame, &mut self.rgb_frame)?;

        let buffer = frame_to_rgb_buffer(&self.rgb_frame, self.target_width, self.target_height);
        RgbImage::from_raw(self.target_width, self.target_height, buffer).ok_or_else(|| {
            SceneGifError::FfmpegError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })
    }
}
