//! GIF encoding of clips.
//!
//! [`encode`] samples a [`ClipHandle`] at a target frame rate and writes a
//! looping animated GIF. Output frame *k* shows the source frame nearest to
//! `start + k / fps`. The rate is capped at the source rate, so frames are
//! only ever dropped, never invented.
//!
//! By default one palette is learned from frames sampled across the whole
//! clip and shared by every output frame, which avoids colour flicker.
//! [`PaletteStrategy::PerFrame`] quantizes each frame independently.
//!
//! # Example
//!
//! ```no_run
//! use scenegif::{ResolutionPolicy, SceneGifError, VideoFile};
//!
//! let mut source = VideoFile::open("input.mp4")?;
//! let scenes = scenegif::segment(&mut source, &Default::default())?;
//! let clip = scenegif::resize(&scenegif::extract(&source, &scenes[0])?, ResolutionPolicy::FixedHeight(240))?;
//! let artifact = scenegif::encode(&clip, 10, "scene_001.gif")?;
//! println!("{} frames, {} ms each", artifact.frame_count, artifact.frame_durations_ms[0]);
//! # Ok::<(), SceneGifError>(())
//! ```

use std::{
    borrow::Cow,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use color_quant::NeuQuant;
use gif::{DecodeOptions, DisposalMethod, Encoder, Frame, Repeat};
use image::RgbImage;
use rayon::prelude::*;

use crate::{
    clip::ClipHandle,
    config::PipelineOptions,
    error::SceneGifError,
    progress::{CancellationToken, OperationType},
    staging::StagedFile,
};

/// How output frames are mapped to a 256-colour palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteStrategy {
    /// One palette learned from `sample_frames` frames spread evenly over
    /// the clip, shared by every frame.
    Global {
        /// Number of output frames sampled for the palette.
        sample_frames: usize,
    },
    /// A separate palette for every frame.
    PerFrame,
}

impl Default for PaletteStrategy {
    fn default() -> Self {
        PaletteStrategy::Global { sample_frames: 16 }
    }
}

/// Configuration for GIF encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifOptions {
    /// Palette strategy. Default: global, 16 sample frames.
    pub palette: PaletteStrategy,
    /// NeuQuant sampling factor, 1 (best) to 30 (fastest). Default: 10.
    pub quantizer_speed: i32,
    /// Maximum number of pixels fed to the global palette learner. Larger
    /// samples are thinned evenly. Default: 1,048,576.
    pub palette_pixel_budget: usize,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            palette: PaletteStrategy::default(),
            quantizer_speed: 10,
            palette_pixel_budget: 1 << 20,
        }
    }
}

impl GifOptions {
    /// Create a new [`GifOptions`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the palette strategy.
    pub fn palette(mut self, palette: PaletteStrategy) -> Self {
        self.palette = palette;
        self
    }

    /// Set the quantizer speed (1–30).
    pub fn quantizer_speed(mut self, speed: i32) -> Self {
        self.quantizer_speed = speed;
        self
    }

    /// Set the pixel budget of the global palette.
    pub fn palette_pixel_budget(mut self, pixels: usize) -> Self {
        self.palette_pixel_budget = pixels;
        self
    }

    /// Check that every setting is within its accepted range.
    pub fn validate(&self) -> Result<(), SceneGifError> {
        if !(1..=30).contains(&self.quantizer_speed) {
            return Err(SceneGifError::InvalidConfiguration(format!(
                "quantizer speed must be between 1 and 30, got {}",
                self.quantizer_speed
            )));
        }
        if self.palette == (PaletteStrategy::Global { sample_frames: 0 }) {
            return Err(SceneGifError::InvalidConfiguration(
                "global palette needs at least one sample frame".to_string(),
            ));
        }
        if self.palette_pixel_budget == 0 {
            return Err(SceneGifError::InvalidConfiguration(
                "palette pixel budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A GIF file on disk and its timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifArtifact {
    /// Location of the file.
    pub path: PathBuf,
    /// Number of frames.
    pub frame_count: usize,
    /// Display duration of each frame, in milliseconds.
    pub frame_durations_ms: Vec<u32>,
    /// Whether the animation loops forever.
    pub loop_forever: bool,
    /// Logical screen width.
    pub width: u32,
    /// Logical screen height.
    pub height: u32,
}

impl GifArtifact {
    /// Inspect an existing GIF file.
    ///
    /// # Errors
    ///
    /// Returns [`SceneGifError::SourceUnreadable`] if the file cannot be
    /// opened or is not a valid GIF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SceneGifError> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |reason: String| SceneGifError::SourceUnreadable {
            path: path.clone(),
            reason,
        };

        let file = File::open(&path).map_err(|error| unreadable(error.to_string()))?;
        let mut decoder = DecodeOptions::new()
            .read_info(BufReader::new(file))
            .map_err(|error| unreadable(error.to_string()))?;

        let mut frame_durations_ms = Vec::new();
        while let Some(frame) = decoder
            .read_next_frame()
            .map_err(|error| unreadable(error.to_string()))?
        {
            frame_durations_ms.push(u32::from(frame.delay) * 10);
        }

        Ok(Self {
            frame_count: frame_durations_ms.len(),
            frame_durations_ms,
            loop_forever: decoder.repeat() == Repeat::Infinite,
            width: u32::from(decoder.width()),
            height: u32::from(decoder.height()),
            path,
        })
    }

    /// Sum of all frame durations.
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.frame_durations_ms.iter().map(|&ms| u64::from(ms)).sum())
    }
}

/// Read the loop flag from the extensions ahead of the first frame.
pub(crate) fn loops_forever(path: &Path) -> Result<bool, SceneGifError> {
    let unreadable = |reason: String| SceneGifError::SourceUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|error| unreadable(error.to_string()))?;
    let mut decoder = DecodeOptions::new()
        .read_info(BufReader::new(file))
        .map_err(|error| unreadable(error.to_string()))?;
    decoder
        .next_frame_info()
        .map_err(|error| unreadable(error.to_string()))?;
    Ok(decoder.repeat() == Repeat::Infinite)
}

/// Encode `clip` at `fps` to `output_path` with default options.
///
/// See [`encode_with_options`].
pub fn encode<P: AsRef<Path>>(
    clip: &ClipHandle,
    fps: u32,
    output_path: P,
) -> Result<GifArtifact, SceneGifError> {
    encode_with_options(
        clip,
        fps,
        output_path,
        &GifOptions::default(),
        &PipelineOptions::default(),
    )
}

/// Encode `clip` at `fps` to `output_path`.
///
/// Every frame is shown for `round(100 / fps)` hundredths of a second and
/// the animation loops forever. The file appears at `output_path` only once
/// it is complete.
///
/// # Errors
///
/// - [`SceneGifError::EncodingFailure`] if `fps` is zero, the clip is
///   shorter than one output frame, or the GIF cannot be written.
/// - [`SceneGifError::ExtractionFailure`] if the clip cannot be decoded.
/// - [`SceneGifError::Cancelled`] if the options' token is cancelled.
pub fn encode_with_options<P: AsRef<Path>>(
    clip: &ClipHandle,
    fps: u32,
    output_path: P,
    gif_options: &GifOptions,
    options: &PipelineOptions,
) -> Result<GifArtifact, SceneGifError> {
    gif_options.validate()?;
    let scene_index = clip.interval().index;
    let failure = |reason: String| SceneGifError::encoding(Some(scene_index), reason);

    let plan = SamplingPlan::new(clip, fps)?;
    let (width, height) = clip.dimensions();
    let (Ok(gif_width), Ok(gif_height)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(failure(format!("{width}x{height} exceeds the GIF size limit")));
    };

    log::debug!(
        "Encoding scene {} to {} ({}x{}, {} frames at {:.3} fps, delay {} cs, {:?})",
        scene_index,
        output_path.as_ref().display(),
        width,
        height,
        plan.frame_count,
        plan.effective_fps,
        plan.delay,
        gif_options.palette,
    );

    let palette = match gif_options.palette {
        PaletteStrategy::Global { sample_frames } => Some(GlobalPalette::learn(
            clip,
            &plan,
            sample_frames,
            gif_options,
            options.cancellation(),
        )?),
        PaletteStrategy::PerFrame => None,
    };

    let mut staged = StagedFile::new(output_path)?;
    let mut tracker = options.tracker(OperationType::GifEncoding, Some(plan.frame_count as u64));
    {
        let global_colors = palette.as_ref().map_or(&[][..], |palette| &palette.colors[..]);
        let mut encoder = Encoder::new(
            BufWriter::new(staged.file_mut()),
            gif_width,
            gif_height,
            global_colors,
        )
        .map_err(|error| failure(error.to_string()))?;
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|error| failure(error.to_string()))?;

        let written = plan.resample(clip, options.cancellation(), &mut |_, timestamp, image| {
            let mut frame = match &palette {
                Some(palette) => palette.indexed_frame(gif_width, gif_height, image),
                None => Frame::from_rgb_speed(
                    gif_width,
                    gif_height,
                    image.as_raw(),
                    gif_options.quantizer_speed,
                ),
            };
            frame.delay = plan.delay;
            encoder
                .write_frame(&frame)
                .map_err(|error| failure(error.to_string()))?;
            tracker.advance(Some(timestamp));
            Ok(())
        })?;

        if written != plan.frame_count {
            return Err(failure(format!(
                "expected {} frames, produced {written}",
                plan.frame_count
            )));
        }

        let mut writer = encoder
            .into_inner()
            .map_err(|error| failure(error.to_string()))?;
        writer.flush()?;
    }
    tracker.finish();

    let path = staged.publish()?;
    Ok(GifArtifact {
        path,
        frame_count: plan.frame_count,
        frame_durations_ms: vec![plan.frame_duration_ms(); plan.frame_count],
        loop_forever: true,
        width,
        height,
    })
}

/// Output timeline of one encode.
#[derive(Debug, Clone, Copy)]
struct SamplingPlan {
    start: Duration,
    effective_fps: f64,
    frame_count: usize,
    delay: u16,
}

impl SamplingPlan {
    fn new(clip: &ClipHandle, fps: u32) -> Result<Self, SceneGifError> {
        let scene_index = clip.interval().index;
        if fps == 0 {
            return Err(SceneGifError::encoding(
                Some(scene_index),
                "frame rate must be positive",
            ));
        }

        let native_fps = clip.native_fps();
        let effective_fps = if native_fps > 0.0 {
            f64::from(fps).min(native_fps)
        } else {
            f64::from(fps)
        };

        let seconds = clip.interval().duration().as_secs_f64();
        // Tolerance for durations that land a hair under a whole frame.
        let frame_count = (seconds * effective_fps + 1e-6).floor() as usize;
        if frame_count == 0 {
            return Err(SceneGifError::encoding(
                Some(scene_index),
                format!("clip of {seconds:.3}s is shorter than one frame at {effective_fps:.3} fps"),
            ));
        }

        let delay = (100.0 / effective_fps).round().clamp(1.0, f64::from(u16::MAX)) as u16;

        Ok(Self {
            start: clip.interval().start,
            effective_fps,
            frame_count,
            delay,
        })
    }

    fn target(&self, output_index: usize) -> Duration {
        self.start + Duration::from_secs_f64(output_index as f64 / self.effective_fps)
    }

    fn frame_duration_ms(&self) -> u32 {
        u32::from(self.delay) * 10
    }

    /// Decode the clip and pass each output frame to `sink` in order.
    ///
    /// Returns the number of output frames produced.
    fn resample(
        &self,
        clip: &ClipHandle,
        cancellation: Option<&CancellationToken>,
        sink: &mut dyn FnMut(usize, Duration, &RgbImage) -> Result<(), SceneGifError>,
    ) -> Result<usize, SceneGifError> {
        let mut next = 0;
        let mut previous: Option<(Duration, RgbImage)> = None;

        clip.for_each_frame(cancellation, &mut |frame| {
            while next < self.frame_count {
                let target = self.target(next);
                if frame.timestamp < target {
                    break;
                }
                let nearest = match &previous {
                    Some((timestamp, image))
                        if target.saturating_sub(*timestamp) <= frame.timestamp - target =>
                    {
                        image
                    }
                    _ => &frame.image,
                };
                sink(next, target, nearest)?;
                next += 1;
            }
            previous = Some((frame.timestamp, frame.image));
            Ok(())
        })?;

        // Targets past the last decoded frame hold on it.
        if let Some((_, last)) = &previous {
            while next < self.frame_count {
                sink(next, self.target(next), last)?;
                next += 1;
            }
        }

        Ok(next)
    }

    /// Output indices spread evenly over the clip, first and last included.
    fn sample_indices(&self, sample_frames: usize) -> Vec<usize> {
        let samples = sample_frames.clamp(1, self.frame_count);
        if samples == 1 {
            return vec![self.frame_count / 2];
        }
        let mut indices: Vec<usize> = (0..samples)
            .map(|i| {
                ((i * (self.frame_count - 1)) as f64 / (samples - 1) as f64).round() as usize
            })
            .collect();
        indices.dedup();
        indices
    }
}

/// A palette learned once and shared by every frame of a clip.
struct GlobalPalette {
    quantizer: NeuQuant,
    colors: Vec<u8>,
}

impl GlobalPalette {
    fn learn(
        clip: &ClipHandle,
        plan: &SamplingPlan,
        sample_frames: usize,
        gif_options: &GifOptions,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Self, SceneGifError> {
        let wanted = plan.sample_indices(sample_frames);
        let mut samples = Vec::with_capacity(wanted.len());
        plan.resample(clip, cancellation, &mut |index, _, image| {
            if wanted.binary_search(&index).is_ok() {
                samples.push(image.clone());
            }
            Ok(())
        })?;

        let total_pixels: usize = samples
            .iter()
            .map(|image| (image.width() as usize) * (image.height() as usize))
            .sum();
        let step = total_pixels.div_ceil(gif_options.palette_pixel_budget).max(1);
        if step > 1 {
            log::debug!(
                "Palette sample of {total_pixels} pixels exceeds budget, keeping every {step}th"
            );
        }

        let mut rgba = Vec::with_capacity((total_pixels / step + 1) * 4);
        for pixel in samples.iter().flat_map(|image| image.pixels()).step_by(step) {
            rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
        }

        let quantizer = NeuQuant::new(gif_options.quantizer_speed, 256, &rgba);
        let colors = quantizer.color_map_rgb();
        Ok(Self { quantizer, colors })
    }

    fn indexed_frame(&self, width: u16, height: u16, image: &RgbImage) -> Frame<'static> {
        let indices: Vec<u8> = image
            .as_raw()
            .par_chunks_exact(3)
            .map(|pixel| self.quantizer.index_of(&[pixel[0], pixel[1], pixel[2], 255]) as u8)
            .collect();

        Frame {
            width,
            height,
            dispose: DisposalMethod::Keep,
            buffer: Cow::Owned(indices),
            ..Frame::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::{clip::extract, scene::SceneInterval, sequence::ImageSequence};

    fn clip(frame_count: usize, fps: f64, start_ms: u64, end_ms: u64) -> ClipHandle {
        let frames = (0..frame_count)
            .map(|index| RgbImage::from_pixel(8, 6, Rgb([(index * 10) as u8, 0, 0])))
            .collect();
        let sequence = ImageSequence::new(frames, fps).unwrap();
        let interval = SceneInterval {
            index: 0,
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
        };
        extract(&sequence, &interval).unwrap()
    }

    #[test]
    fn plan_caps_rate_at_source_fps() {
        let plan = SamplingPlan::new(&clip(20, 10.0, 0, 2000), 30).unwrap();
        assert_eq!(plan.effective_fps, 10.0);
        assert_eq!(plan.frame_count, 20);
        assert_eq!(plan.delay, 10);
        assert_eq!(plan.frame_duration_ms(), 100);
    }

    #[test]
    fn plan_rounds_delay() {
        let plan = SamplingPlan::new(&clip(60, 30.0, 0, 2000), 15).unwrap();
        assert_eq!(plan.frame_count, 30);
        assert_eq!(plan.delay, 7);
    }

    #[test]
    fn plan_rejects_zero_fps_and_short_clips() {
        assert!(SamplingPlan::new(&clip(20, 10.0, 0, 2000), 0).is_err());
        let error = SamplingPlan::new(&clip(20, 10.0, 0, 50), 10).unwrap_err();
        assert!(matches!(
            error,
            SceneGifError::EncodingFailure {
                scene_index: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn resample_picks_nearest_frames() {
        let clip = clip(20, 10.0, 500, 1500);
        let plan = SamplingPlan::new(&clip, 5).unwrap();
        let mut picked = Vec::new();
        let produced = plan
            .resample(&clip, None, &mut |index, target, image| {
                picked.push((index, target, image.get_pixel(0, 0)[0]));
                Ok(())
            })
            .unwrap();

        assert_eq!(produced, 5);
        let reds: Vec<u8> = picked.iter().map(|&(_, _, red)| red).collect();
        // Source frames 5, 7, 9, 11, 13 carry red = index * 10.
        assert_eq!(reds, vec![50, 70, 90, 110, 130]);
        assert_eq!(picked[1].1, Duration::from_millis(700));
    }

    #[test]
    fn sample_indices_span_clip() {
        let plan = SamplingPlan::new(&clip(20, 10.0, 0, 2000), 10).unwrap();
        assert_eq!(plan.sample_indices(3), vec![0, 10, 19]);
        assert_eq!(plan.sample_indices(1), vec![10]);
        assert_eq!(plan.sample_indices(100).len(), 20);
    }

    #[test]
    fn validate_rejects_bad_options() {
        assert!(GifOptions::new().validate().is_ok());
        assert!(GifOptions::new().quantizer_speed(0).validate().is_err());
        assert!(GifOptions::new().quantizer_speed(31).validate().is_err());
        assert!(
            GifOptions::new()
                .palette(PaletteStrategy::Global { sample_frames: 0 })
                .validate()
                .is_err()
        );
        assert!(GifOptions::new().palette_pixel_budget(0).validate().is_err());
    }
}
