//! Merging GIF artifacts.
//!
//! [`combine`] concatenates the frames of several GIFs into one looping
//! animation. Each source frame keeps its own display duration, so every
//! constituent scene plays back at its original speed. Frames are resized
//! to the first artifact's dimensions when they differ.
//!
//! # Example
//!
//! ```no_run
//! use scenegif::{GifArtifact, SceneGifError};
//!
//! let first = GifArtifact::open("scene_001.gif")?;
//! let third = GifArtifact::open("scene_003.gif")?;
//! let merged = scenegif::combine(&[first, third], "combined.gif")?;
//! println!("{} frames from {} sources", merged.artifact.frame_count, merged.sources.len());
//! # Ok::<(), SceneGifError>(())
//! ```

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use gif::{DisposalMethod, Encoder, Frame, Repeat};
use image::{
    AnimationDecoder, ImageDecoder, RgbaImage, codecs::gif::GifDecoder, imageops::FilterType,
};

use crate::{
    config::PipelineOptions,
    error::SceneGifError,
    gif::{GifArtifact, loops_forever},
    progress::OperationType,
    staging::StagedFile,
};

/// Configuration for [`combine_with_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineOptions {
    /// Minimum number of input artifacts. Default: 1.
    pub min_inputs: usize,
    /// NeuQuant sampling factor for the per-frame palettes, 1–30. Default: 10.
    pub quantizer_speed: i32,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            min_inputs: 1,
            quantizer_speed: 10,
        }
    }
}

impl CombineOptions {
    /// Create a new [`CombineOptions`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of inputs.
    pub fn min_inputs(mut self, count: usize) -> Self {
        self.min_inputs = count;
        self
    }

    /// Set the quantizer speed.
    pub fn quantizer_speed(mut self, speed: i32) -> Self {
        self.quantizer_speed = speed;
        self
    }

    /// Check that every setting is within its accepted range.
    pub fn validate(&self) -> Result<(), SceneGifError> {
        if self.min_inputs == 0 {
            return Err(SceneGifError::InvalidConfiguration(
                "minimum input count must be at least 1".to_string(),
            ));
        }
        if !(1..=30).contains(&self.quantizer_speed) {
            return Err(SceneGifError::InvalidConfiguration(format!(
                "quantizer speed must be between 1 and 30, got {}",
                self.quantizer_speed
            )));
        }
        Ok(())
    }
}

/// A merged GIF and the artifacts it was built from, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedGifArtifact {
    /// The merged file.
    pub artifact: GifArtifact,
    /// Paths of the source artifacts, in concatenation order.
    pub sources: Vec<PathBuf>,
}

/// A GIF decoded to full-canvas frames.
#[derive(Debug, Clone)]
pub struct DecodedGif {
    /// Logical screen width.
    pub width: u32,
    /// Logical screen height.
    pub height: u32,
    /// Composited frames in display order.
    pub frames: Vec<DecodedFrame>,
    /// Whether the animation loops forever.
    pub loop_forever: bool,
}

/// One composited frame of a [`DecodedGif`].
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// The whole canvas as displayed during this frame.
    pub image: RgbaImage,
    /// Display duration in milliseconds.
    pub duration_ms: u32,
}

/// Decode a GIF file into full-canvas RGBA frames.
///
/// Frame offsets and disposal methods are applied by `image`'s GIF
/// decoder, so each returned frame is what a player shows.
///
/// # Errors
///
/// Returns [`SceneGifError::SourceUnreadable`] if the file cannot be opened
/// or is not a valid GIF.
pub fn decode_gif<P: AsRef<Path>>(path: P) -> Result<DecodedGif, SceneGifError> {
    let path = path.as_ref();
    let unreadable = |reason: String| SceneGifError::SourceUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|error| unreadable(error.to_string()))?;
    let decoder =
        GifDecoder::new(BufReader::new(file)).map_err(|error| unreadable(error.to_string()))?;
    let (width, height) = decoder.dimensions();

    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|error| unreadable(error.to_string()))?
        .into_iter()
        .map(|frame| {
            let (numerator, denominator) = frame.delay().numer_denom_ms();
            DecodedFrame {
                duration_ms: numerator / denominator.max(1),
                image: frame.into_buffer(),
            }
        })
        .collect();

    Ok(DecodedGif {
        width,
        height,
        frames,
        loop_forever: loops_forever(path)?,
    })
}

/// Concatenate `artifacts` into one GIF at `output_path` with default
/// options.
///
/// See [`combine_with_options`].
pub fn combine<P: AsRef<Path>>(
    artifacts: &[GifArtifact],
    output_path: P,
) -> Result<CombinedGifArtifact, SceneGifError> {
    combine_with_options(
        artifacts,
        output_path,
        &CombineOptions::default(),
        &PipelineOptions::default(),
    )
}

/// Concatenate `artifacts` into one GIF at `output_path`.
///
/// Frames keep their own durations. The output has the first artifact's
/// dimensions and loops forever. Every output frame carries its own
/// palette.
///
/// # Errors
///
/// Returns [`SceneGifError::CombineFailure`] if there are fewer than
/// `min_inputs` artifacts, or any artifact cannot be decoded or has no
/// frames. Nothing is written to `output_path` on failure.
pub fn combine_with_options<P: AsRef<Path>>(
    artifacts: &[GifArtifact],
    output_path: P,
    combine_options: &CombineOptions,
    options: &PipelineOptions,
) -> Result<CombinedGifArtifact, SceneGifError> {
    combine_options.validate()?;
    let output_path = output_path.as_ref();

    if artifacts.is_empty() {
        return Err(SceneGifError::combine("no GIFs to combine"));
    }
    if artifacts.len() < combine_options.min_inputs {
        return Err(SceneGifError::combine(format!(
            "{} GIF(s) given, at least {} required",
            artifacts.len(),
            combine_options.min_inputs
        )));
    }

    log::debug!(
        "Combining {} GIF(s) into {}",
        artifacts.len(),
        output_path.display()
    );

    let first = decode_input(&artifacts[0])?;
    let (width, height) = (first.width, first.height);
    let mut pending = Some(first);
    let (Ok(gif_width), Ok(gif_height)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(SceneGifError::combine(format!(
            "{width}x{height} exceeds the GIF size limit"
        )));
    };

    let mut staged = StagedFile::new(output_path)?;
    let mut tracker = options.tracker(
        OperationType::GifCombining,
        Some(artifacts.iter().map(|artifact| artifact.frame_count as u64).sum()),
    );
    let mut frame_durations_ms = Vec::new();
    {
        let mut encoder = Encoder::new(
            BufWriter::new(staged.file_mut()),
            gif_width,
            gif_height,
            &[],
        )
        .map_err(|error| SceneGifError::combine(error.to_string()))?;
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|error| SceneGifError::combine(error.to_string()))?;

        for artifact in artifacts {
            options.check_cancelled()?;
            let decoded = match pending.take() {
                Some(first) => first,
                None => decode_input(artifact)?,
            };

            if (decoded.width, decoded.height) != (width, height) {
                log::debug!(
                    "Resizing frames of {} from {}x{} to {}x{}",
                    artifact.path.display(),
                    decoded.width,
                    decoded.height,
                    width,
                    height
                );
            }

            for frame in decoded.frames {
                options.check_cancelled()?;
                let image = if frame.image.dimensions() == (width, height) {
                    frame.image
                } else {
                    image::imageops::resize(&frame.image, width, height, FilterType::Triangle)
                };

                let mut pixels = image.into_raw();
                let mut output = Frame::from_rgba_speed(
                    gif_width,
                    gif_height,
                    &mut pixels,
                    combine_options.quantizer_speed,
                );
                output.delay = u16::try_from(frame.duration_ms / 10).unwrap_or(u16::MAX);
                output.dispose = DisposalMethod::Background;
                encoder
                    .write_frame(&output)
                    .map_err(|error| SceneGifError::combine(error.to_string()))?;

                frame_durations_ms.push(frame.duration_ms);
                tracker.advance(None);
            }
        }

        let mut writer = encoder
            .into_inner()
            .map_err(|error| SceneGifError::combine(error.to_string()))?;
        writer.flush()?;
    }
    tracker.finish();

    let path = staged.publish()?;
    Ok(CombinedGifArtifact {
        artifact: GifArtifact {
            path,
            frame_count: frame_durations_ms.len(),
            frame_durations_ms,
            loop_forever: true,
            width,
            height,
        },
        sources: artifacts.iter().map(|artifact| artifact.path.clone()).collect(),
    })
}

/// Decode one input, rejecting unreadable or empty GIFs.
fn decode_input(artifact: &GifArtifact) -> Result<DecodedGif, SceneGifError> {
    let decoded = decode_gif(&artifact.path).map_err(|error| {
        SceneGifError::combine(format!(
            "cannot decode {}: {error}",
            artifact.path.display()
        ))
    })?;
    if decoded.frames.is_empty() {
        return Err(SceneGifError::combine(format!(
            "{} has no frames",
            artifact.path.display()
        )));
    }
    Ok(decoded)
}
