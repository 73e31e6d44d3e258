//! Scene segmentation.
//!
//! Splits a video into content-homogeneous [`SceneInterval`]s. Every sampled
//! frame is downscaled, converted to HSV, and compared with the previous
//! frame; the content-difference score is the weighted mean absolute
//! difference of the hue, saturation and value channels. A cut is declared
//! when the score exceeds the threshold and the current scene is at least
//! `min_scene_length` frames long.
//!
//! The resulting intervals always tile the whole timeline: the first starts
//! at zero, the last ends at the source duration, and each interval ends
//! where the next begins.
//!
//! # Example
//!
//! ```no_run
//! use scenegif::{DetectorConfig, SceneGifError, VideoFile};
//!
//! let mut source = VideoFile::open("input.mp4")?;
//! let config = DetectorConfig::new().threshold(30.0).min_scene_length(12);
//! for scene in scenegif::segment(&mut source, &config)? {
//!     println!("scene {}: {:.2}s – {:.2}s", scene.index, scene.start_seconds(), scene.end_seconds());
//! }
//! # Ok::<(), SceneGifError>(())
//! ```

use std::time::Duration;

use image::RgbImage;

use crate::{
    config::PipelineOptions,
    error::SceneGifError,
    progress::OperationType,
    source::{FrameSource, TimeWindow},
};

/// Frame width the automatic downscale factor aims for.
const AUTO_DOWNSCALE_TARGET_WIDTH: u32 = 256;

/// Relative weight of each HSV channel in the content-difference score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelWeights {
    /// Hue weight.
    pub hue: f64,
    /// Saturation weight.
    pub saturation: f64,
    /// Value (brightness) weight.
    pub value: f64,
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self {
            hue: 1.0,
            saturation: 1.0,
            value: 1.0,
        }
    }
}

impl ChannelWeights {
    fn total(&self) -> f64 {
        self.hue + self.saturation + self.value
    }
}

/// Scene detector settings.
///
/// The score range is 0–255 (hue differences top out at 180). The default
/// threshold of 27.0 catches hard cuts while ignoring camera motion and
/// lighting drift.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum content-difference score for a cut. Default: 27.0.
    pub threshold: f64,
    /// Minimum number of frames between two cuts. Default: 15.
    pub min_scene_length: u64,
    /// Integer factor applied to both dimensions before scoring.
    ///
    /// `None` picks `max(1, width / 256)`. Larger factors are faster but can
    /// miss cuts between visually similar shots.
    pub downscale_factor: Option<u32>,
    /// Channel weights for the score.
    pub weights: ChannelWeights,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 27.0,
            min_scene_length: 15,
            downscale_factor: None,
            weights: ChannelWeights::default(),
        }
    }
}

impl DetectorConfig {
    /// Create a detector configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cut threshold.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the minimum scene length in frames.
    pub fn min_scene_length(mut self, frames: u64) -> Self {
        self.min_scene_length = frames;
        self
    }

    /// Use a fixed downscale factor instead of the automatic one.
    pub fn downscale_factor(mut self, factor: u32) -> Self {
        self.downscale_factor = Some(factor);
        self
    }

    /// Set the channel weights.
    pub fn weights(mut self, weights: ChannelWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Check that every setting is within its accepted range.
    pub fn validate(&self) -> Result<(), SceneGifError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SceneGifError::InvalidConfiguration(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.downscale_factor == Some(0) {
            return Err(SceneGifError::InvalidConfiguration(
                "downscale factor must be at least 1".to_string(),
            ));
        }
        let weights = [self.weights.hue, self.weights.saturation, self.weights.value];
        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0)
            || self.weights.total() <= 0.0
        {
            return Err(SceneGifError::InvalidConfiguration(
                "channel weights must be non-negative and not all zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The downscale factor used for a source `width` pixels wide.
    pub fn effective_downscale(&self, width: u32) -> u32 {
        self.downscale_factor
            .unwrap_or_else(|| (width / AUTO_DOWNSCALE_TARGET_WIDTH).max(1))
    }
}

/// A contiguous span of the timeline judged visually homogeneous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneInterval {
    /// Zero-based ordinal within the segmentation.
    pub index: usize,
    /// Inclusive start.
    pub start: Duration,
    /// Exclusive end.
    pub end: Duration,
}

impl SceneInterval {
    /// Start in seconds.
    pub fn start_seconds(&self) -> f64 {
        self.start.as_secs_f64()
    }

    /// End in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.end.as_secs_f64()
    }

    /// Length of the interval.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// The decode window covering this interval.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::between(self.start, self.end)
    }
}

/// Segment `source` into scenes with default pipeline options.
///
/// See [`segment_with_options`].
pub fn segment<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &DetectorConfig,
) -> Result<Vec<SceneInterval>, SceneGifError> {
    segment_with_options(source, config, &PipelineOptions::default())
}

/// Segment `source` into scenes.
///
/// # Errors
///
/// - [`SceneGifError::InvalidConfiguration`] for an out-of-range config.
/// - [`SceneGifError::SourceUnreadable`] if decoding fails or yields no
///   frames. No partial result is returned.
/// - [`SceneGifError::NoScenesDetected`] if the timeline has zero length.
/// - [`SceneGifError::Cancelled`] if the options' token is cancelled.
pub fn segment_with_options<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &DetectorConfig,
    options: &PipelineOptions,
) -> Result<Vec<SceneInterval>, SceneGifError> {
    config.validate()?;

    let identifier = source.identifier();
    let metadata = source.metadata().clone();
    let factor = config.effective_downscale(metadata.width);
    let scoring_size = (
        (metadata.width / factor).max(1),
        (metadata.height / factor).max(1),
    );

    log::debug!(
        "Segmenting {} (threshold={}, min_scene_length={}, downscale={}, scoring at {}x{})",
        identifier,
        config.threshold,
        config.min_scene_length,
        factor,
        scoring_size.0,
        scoring_size.1,
    );

    let mut detector = CutDetector::new(config);
    let mut last_timestamp: Option<Duration> = None;
    let mut tracker = options.tracker(
        OperationType::SceneDetection,
        Some(metadata.frame_count).filter(|&count| count > 0),
    );

    source
        .for_each_frame(
            TimeWindow::full(),
            Some(scoring_size),
            options.cancellation(),
            &mut |frame| {
                detector.push(frame.timestamp, &frame.image);
                last_timestamp = Some(frame.timestamp);
                tracker.advance(Some(frame.timestamp));
                Ok(())
            },
        )
        .map_err(|error| match error {
            SceneGifError::FfmpegError(reason) => SceneGifError::SourceUnreadable {
                path: identifier.clone().into(),
                reason,
            },
            other => other,
        })?;
    tracker.finish();

    let Some(last_timestamp) = last_timestamp else {
        return Err(SceneGifError::SourceUnreadable {
            path: identifier.into(),
            reason: "no decodable video frames".to_string(),
        });
    };

    let end = if metadata.duration > Duration::ZERO {
        metadata.duration
    } else {
        last_timestamp + metadata.frame_period().unwrap_or_default()
    };

    let intervals = intervals_from_cuts(&detector.cuts, end);
    if intervals.is_empty() {
        return Err(SceneGifError::NoScenesDetected(format!(
            "{identifier} has a zero-length timeline"
        )));
    }

    log::debug!("Detected {} scene(s) in {}", intervals.len(), identifier);
    Ok(intervals)
}

/// Tile `[0, end)` with intervals split at `cuts`.
///
/// Cuts at zero, at or beyond `end`, or out of order are ignored.
pub(crate) fn intervals_from_cuts(cuts: &[Duration], end: Duration) -> Vec<SceneInterval> {
    if end.is_zero() {
        return Vec::new();
    }

    let mut boundaries = vec![Duration::ZERO];
    for &cut in cuts {
        if cut > *boundaries.last().unwrap_or(&Duration::ZERO) && cut < end {
            boundaries.push(cut);
        }
    }
    boundaries.push(end);

    boundaries
        .windows(2)
        .enumerate()
        .map(|(index, pair)| SceneInterval {
            index,
            start: pair[0],
            end: pair[1],
        })
        .collect()
}

/// Streaming cut detector over consecutive frames.
struct CutDetector<'a> {
    config: &'a DetectorConfig,
    previous: Option<HsvFrame>,
    position: u64,
    last_cut_position: u64,
    cuts: Vec<Duration>,
}

impl<'a> CutDetector<'a> {
    fn new(config: &'a DetectorConfig) -> Self {
        Self {
            config,
            previous: None,
            position: 0,
            last_cut_position: 0,
            cuts: Vec::new(),
        }
    }

    fn push(&mut self, timestamp: Duration, image: &RgbImage) {
        let current = HsvFrame::from_rgb(image);

        if let Some(previous) = &self.previous {
            let score = previous.score(&current, &self.config.weights);
            let scene_length = self.position - self.last_cut_position;
            if score > self.config.threshold && scene_length >= self.config.min_scene_length {
                log::debug!("Cut at {timestamp:?} (frame {}, score {score:.2})", self.position);
                self.cuts.push(timestamp);
                self.last_cut_position = self.position;
            }
        }

        self.previous = Some(current);
        self.position += 1;
    }
}

/// A frame split into 8-bit HSV planes (hue in 0..180).
struct HsvFrame {
    hue: Vec<u8>,
    saturation: Vec<u8>,
    value: Vec<u8>,
}

impl HsvFrame {
    fn from_rgb(image: &RgbImage) -> Self {
        let count = (image.width() as usize) * (image.height() as usize);
        let mut frame = Self {
            hue: Vec::with_capacity(count),
            saturation: Vec::with_capacity(count),
            value: Vec::with_capacity(count),
        };
        for pixel in image.pixels() {
            let [hue, saturation, value] = rgb_to_hsv(pixel.0);
            frame.hue.push(hue);
            frame.saturation.push(saturation);
            frame.value.push(value);
        }
        frame
    }

    fn score(&self, other: &HsvFrame, weights: &ChannelWeights) -> f64 {
        if self.hue.len() != other.hue.len() || self.hue.is_empty() {
            // Resolution changed mid-stream: treat as a full content change.
            return 255.0;
        }
        let weighted = weights.hue * mean_absolute_difference(&self.hue, &other.hue)
            + weights.saturation * mean_absolute_difference(&self.saturation, &other.saturation)
            + weights.value * mean_absolute_difference(&self.value, &other.value);
        weighted / weights.total()
    }
}

fn mean_absolute_difference(left: &[u8], right: &[u8]) -> f64 {
    let sum: u64 = left
        .iter()
        .zip(right)
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum();
    sum as f64 / left.len() as f64
}

/// Convert one RGB pixel to 8-bit HSV with hue halved into 0..180.
fn rgb_to_hsv([red, green, blue]: [u8; 3]) -> [u8; 3] {
    let max = red.max(green).max(blue);
    let min = red.min(green).min(blue);
    let delta = f64::from(max - min);

    let saturation = if max == 0 {
        0.0
    } else {
        255.0 * delta / f64::from(max)
    };

    let hue_degrees = if delta == 0.0 {
        0.0
    } else if max == red {
        60.0 * (f64::from(green) - f64::from(blue)) / delta
    } else if max == green {
        120.0 + 60.0 * (f64::from(blue) - f64::from(red)) / delta
    } else {
        240.0 + 60.0 * (f64::from(red) - f64::from(green)) / delta
    };
    let hue_degrees = if hue_degrees < 0.0 {
        hue_degrees + 360.0
    } else {
        hue_degrees
    };

    [
        ((hue_degrees / 2.0).round() as u32 % 180) as u8,
        saturation.round() as u8,
        max,
    ]
}

/// Content-difference score between two equally sized frames.
///
/// Both frames are converted to HSV; the result is the weighted mean of the
/// per-channel mean absolute differences.
pub fn content_score(previous: &RgbImage, current: &RgbImage, weights: &ChannelWeights) -> f64 {
    HsvFrame::from_rgb(previous).score(&HsvFrame::from_rgb(current), weights)
}
