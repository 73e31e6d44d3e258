//! Clip extraction and resizing.
//!
//! [`extract`] turns one [`SceneInterval`] into a [`ClipHandle`], a lazily
//! decoded view of the source bounded to the interval. [`resize`] applies a
//! [`ResolutionPolicy`] to a handle. Neither step decodes anything; frames
//! are produced when the handle is encoded.
//!
//! # Example
//!
//! ```no_run
//! use scenegif::{ResolutionPolicy, SceneGifError, VideoFile};
//!
//! let mut source = VideoFile::open("input.mp4")?;
//! let scenes = scenegif::segment(&mut source, &Default::default())?;
//! let clip = scenegif::extract(&source, &scenes[0])?;
//! let clip = scenegif::resize(&clip, ResolutionPolicy::FixedHeight(480))?;
//! println!("{}x{}", clip.width(), clip.height());
//! # Ok::<(), SceneGifError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::{
    error::SceneGifError,
    progress::CancellationToken,
    scene::SceneInterval,
    source::{FrameHandler, FrameSource, SourceRef, TimeWindow},
};

/// How a clip's output resolution is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    /// Keep the native resolution.
    #[default]
    Original,
    /// Fixed height; the width follows the native aspect ratio.
    FixedHeight(u32),
    /// Fixed width; the height follows the native aspect ratio.
    FixedWidth(u32),
    /// Both dimensions as given. Distorts the image when the aspect ratio
    /// differs from the source.
    Explicit(u32, u32),
}

impl FromStr for ResolutionPolicy {
    type Err = SceneGifError;

    /// Parse `original`, `<N>p` (e.g. `720p`), `h<N>`, `w<N>` or `<W>x<H>`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        let invalid = || {
            SceneGifError::InvalidConfiguration(format!(
                "unknown resolution '{value}' (expected original, 720p, 480p, h<N>, w<N> or <W>x<H>)"
            ))
        };
        let number = |digits: &str| -> Result<u32, SceneGifError> {
            match digits.parse::<u32>() {
                Ok(0) | Err(_) => Err(invalid()),
                Ok(number) => Ok(number),
            }
        };

        if value == "original" {
            return Ok(ResolutionPolicy::Original);
        }
        if let Some(height) = value.strip_suffix('p') {
            return Ok(ResolutionPolicy::FixedHeight(number(height)?));
        }
        if let Some(height) = value.strip_prefix('h') {
            return Ok(ResolutionPolicy::FixedHeight(number(height)?));
        }
        if let Some(width) = value.strip_prefix('w') {
            return Ok(ResolutionPolicy::FixedWidth(number(width)?));
        }
        if let Some((width, height)) = value.split_once('x') {
            return Ok(ResolutionPolicy::Explicit(number(width)?, number(height)?));
        }
        Err(invalid())
    }
}

impl Display for ResolutionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ResolutionPolicy::Original => write!(f, "original"),
            ResolutionPolicy::FixedHeight(height) => write!(f, "h{height}"),
            ResolutionPolicy::FixedWidth(width) => write!(f, "w{width}"),
            ResolutionPolicy::Explicit(width, height) => write!(f, "{width}x{height}"),
        }
    }
}

/// A time-bounded, resolution-adjusted view of a source, not yet decoded.
#[derive(Debug, Clone)]
pub struct ClipHandle {
    source: SourceRef,
    interval: SceneInterval,
    width: u32,
    height: u32,
    native_width: u32,
    native_height: u32,
    native_fps: f64,
}

impl ClipHandle {
    /// Locator of the underlying source.
    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// The interval this clip covers, with its end clamped to the source
    /// duration.
    pub fn interval(&self) -> &SceneInterval {
        &self.interval
    }

    /// Output width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Output `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Native `(width, height)` of the source.
    pub fn native_dimensions(&self) -> (u32, u32) {
        (self.native_width, self.native_height)
    }

    /// Native frame rate of the source.
    pub fn native_fps(&self) -> f64 {
        self.native_fps
    }

    /// Decode the clip's frames at its output size.
    ///
    /// Opens a fresh handle on the source, so concurrent clips never share
    /// a decode cursor. Decode failures are reported as
    /// [`SceneGifError::ExtractionFailure`] for this clip's interval.
    pub fn for_each_frame(
        &self,
        cancellation: Option<&CancellationToken>,
        handler: &mut FrameHandler<'_>,
    ) -> Result<(), SceneGifError> {
        let scene_index = self.interval.index;
        let extraction = |reason: String| SceneGifError::ExtractionFailure {
            scene_index,
            reason,
        };

        let mut source = self.source.open().map_err(|error| match error {
            SceneGifError::SourceUnreadable { reason, .. } => extraction(reason),
            other => other,
        })?;

        source
            .for_each_frame(
                TimeWindow::between(self.interval.start, self.interval.end),
                Some((self.width, self.height)),
                cancellation,
                handler,
            )
            .map_err(|error| match error {
                SceneGifError::SourceUnreadable { reason, .. }
                | SceneGifError::FfmpegError(reason) => extraction(reason),
                other => other,
            })
    }
}

/// Bound `interval` of `source` into a clip handle.
///
/// The end is clamped to the source duration. Nothing is decoded.
///
/// # Errors
///
/// Returns [`SceneGifError::ExtractionFailure`] if the interval is empty or
/// starts at or beyond the end of the source.
pub fn extract<S: FrameSource + ?Sized>(
    source: &S,
    interval: &SceneInterval,
) -> Result<ClipHandle, SceneGifError> {
    let metadata = source.metadata();
    let failure = |reason: String| SceneGifError::ExtractionFailure {
        scene_index: interval.index,
        reason,
    };

    if interval.start >= interval.end {
        return Err(failure(format!(
            "interval [{:?}, {:?}) is empty",
            interval.start, interval.end
        )));
    }

    let mut bounded = *interval;
    if !metadata.duration.is_zero() {
        if interval.start >= metadata.duration {
            return Err(failure(format!(
                "start {:?} is beyond the source duration {:?}",
                interval.start, metadata.duration
            )));
        }
        bounded.end = interval.end.min(metadata.duration);
    }

    log::debug!(
        "Extracted scene {} of {} ({:?} to {:?})",
        bounded.index,
        source.identifier(),
        bounded.start,
        bounded.end
    );

    Ok(ClipHandle {
        source: source.source_ref(),
        interval: bounded,
        width: metadata.width,
        height: metadata.height,
        native_width: metadata.width,
        native_height: metadata.height,
        native_fps: metadata.frames_per_second,
    })
}

/// Apply `policy` to `handle`, returning a new handle.
///
/// Derived dimensions are computed from the native size and rounded to the
/// nearest even integer.
///
/// # Errors
///
/// Returns [`SceneGifError::EncodingFailure`] if either resulting dimension
/// is zero.
pub fn resize(handle: &ClipHandle, policy: ResolutionPolicy) -> Result<ClipHandle, SceneGifError> {
    let (native_width, native_height) = handle.native_dimensions();
    let aspect = f64::from(native_width) / f64::from(native_height);

    let (width, height) = match policy {
        ResolutionPolicy::Original => (native_width, native_height),
        ResolutionPolicy::FixedHeight(height) => {
            (round_to_even(f64::from(height) * aspect), height)
        }
        ResolutionPolicy::FixedWidth(width) => (width, round_to_even(f64::from(width) / aspect)),
        ResolutionPolicy::Explicit(width, height) => (width, height),
    };

    if width == 0 || height == 0 {
        return Err(SceneGifError::encoding(
            Some(handle.interval.index),
            format!(
                "resolution {policy} on a {native_width}x{native_height} source yields {width}x{height}"
            ),
        ));
    }

    Ok(ClipHandle {
        width,
        height,
        ..handle.clone()
    })
}

fn round_to_even(value: f64) -> u32 {
    ((value / 2.0).round() * 2.0) as u32
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::sequence::ImageSequence;

    fn source(width: u32, height: u32) -> ImageSequence {
        ImageSequence::new(vec![RgbImage::from_pixel(width, height, Rgb([0, 0, 0])); 20], 10.0)
            .unwrap()
    }

    fn interval(index: usize, start_ms: u64, end_ms: u64) -> SceneInterval {
        SceneInterval {
            index,
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn parses_resolution_policies() {
        assert_eq!("original".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::Original);
        assert_eq!("720p".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::FixedHeight(720));
        assert_eq!("480P".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::FixedHeight(480));
        assert_eq!("h360".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::FixedHeight(360));
        assert_eq!("w320".parse::<ResolutionPolicy>().unwrap(), ResolutionPolicy::FixedWidth(320));
        assert_eq!(
            "640x360".parse::<ResolutionPolicy>().unwrap(),
            ResolutionPolicy::Explicit(640, 360)
        );
        assert!("0p".parse::<ResolutionPolicy>().is_err());
        assert!("wide".parse::<ResolutionPolicy>().is_err());
        assert!("640x".parse::<ResolutionPolicy>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for policy in [
            ResolutionPolicy::Original,
            ResolutionPolicy::FixedHeight(480),
            ResolutionPolicy::FixedWidth(320),
            ResolutionPolicy::Explicit(100, 50),
        ] {
            assert_eq!(policy.to_string().parse::<ResolutionPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn fixed_height_rounds_width_to_even() {
        let clip = extract(&source(1920, 1080), &interval(0, 0, 1000)).unwrap();
        let resized = resize(&clip, ResolutionPolicy::FixedHeight(480)).unwrap();
        // 480 * 1920 / 1080 = 853.33, nearest even is 854.
        assert_eq!(resized.dimensions(), (854, 480));
    }

    #[test]
    fn fixed_width_derives_height() {
        let clip = extract(&source(1920, 1080), &interval(0, 0, 1000)).unwrap();
        let resized = resize(&clip, ResolutionPolicy::FixedWidth(320)).unwrap();
        assert_eq!(resized.dimensions(), (320, 180));
    }

    #[test]
    fn resize_is_relative_to_native_size() {
        let clip = extract(&source(1920, 1080), &interval(0, 0, 1000)).unwrap();
        let small = resize(&clip, ResolutionPolicy::Explicit(10, 10)).unwrap();
        let back = resize(&small, ResolutionPolicy::Original).unwrap();
        assert_eq!(back.dimensions(), (1920, 1080));
        let again = resize(&small, ResolutionPolicy::FixedHeight(480)).unwrap();
        assert_eq!(again.dimensions(), (854, 480));
    }

    #[test]
    fn degenerate_resize_is_an_encoding_failure() {
        let clip = extract(&source(1920, 1080), &interval(3, 0, 1000)).unwrap();
        let error = resize(&clip, ResolutionPolicy::FixedWidth(1)).unwrap_err();
        assert!(matches!(
            error,
            SceneGifError::EncodingFailure {
                scene_index: Some(3),
                ..
            }
        ));
        assert!(resize(&clip, ResolutionPolicy::Explicit(0, 10)).is_err());
    }

    #[test]
    fn extract_clamps_end_and_rejects_out_of_range_start() {
        let sequence = source(8, 8);
        let clip = extract(&sequence, &interval(1, 1500, 5000)).unwrap();
        assert_eq!(clip.interval().end, Duration::from_secs(2));

        let error = extract(&sequence, &interval(2, 2000, 3000)).unwrap_err();
        assert!(matches!(
            error,
            SceneGifError::ExtractionFailure { scene_index: 2, .. }
        ));
        assert!(extract(&sequence, &interval(4, 500, 500)).is_err());
    }

    #[test]
    fn clip_decodes_only_its_interval() {
        let frames = (0..20)
            .map(|index| RgbImage::from_pixel(8, 8, Rgb([index as u8, 0, 0])))
            .collect();
        let sequence = ImageSequence::new(frames, 10.0).unwrap();
        let clip = extract(&sequence, &interval(0, 500, 1000)).unwrap();
        let clip = resize(&clip, ResolutionPolicy::Explicit(4, 4)).unwrap();

        let mut seen = Vec::new();
        clip.for_each_frame(None, &mut |frame| {
            assert_eq!(frame.image.dimensions(), (4, 4));
            seen.push(frame.index);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![5, 6, 7, 8, 9]);
    }
}
