//! # scenegif
//!
//! Split a video into scenes and turn each scene into a looping GIF, then
//! merge a chosen subset into one combined GIF.
//!
//! Scene cuts are found by comparing consecutive frames in HSV colour
//! space. Each scene is cut out of the source, optionally rescaled, and
//! encoded at a reduced frame rate with a shared palette. Decoding is
//! powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate; GIF
//! encoding and decoding use the [`gif`](https://crates.io/crates/gif)
//! crate.
//!
//! ## Quick Start
//!
//! ### Run the Whole Pipeline
//!
//! ```no_run
//! use scenegif::{DetectorConfig, GifOptions, Job, ResolutionPolicy};
//!
//! let mut job = Job::new("input.mp4", "gifs").unwrap();
//! job.segment(&DetectorConfig::default()).unwrap();
//! job.render(ResolutionPolicy::FixedHeight(480), 10, &GifOptions::default()).unwrap();
//! job.combine(&[0, 1]).unwrap();
//! ```
//!
//! ### Use the Stages Directly
//!
//! ```no_run
//! use scenegif::{DetectorConfig, ResolutionPolicy, VideoFile};
//!
//! let mut source = VideoFile::open("input.mp4").unwrap();
//! let scenes = scenegif::segment(&mut source, &DetectorConfig::default()).unwrap();
//!
//! let mut artifacts = Vec::new();
//! for scene in &scenes {
//!     let clip = scenegif::extract(&source, scene).unwrap();
//!     let clip = scenegif::resize(&clip, ResolutionPolicy::FixedWidth(320)).unwrap();
//!     let path = format!("scene_{}.gif", scene.index);
//!     artifacts.push(scenegif::encode(&clip, 12, path).unwrap());
//! }
//!
//! let merged = scenegif::combine(&artifacts, "all.gif").unwrap();
//! ```
//!
//! ### Work on Frames in Memory
//!
//! ```
//! use image::{Rgb, RgbImage};
//! use scenegif::{DetectorConfig, ImageSequence};
//!
//! let mut frames = vec![RgbImage::from_pixel(32, 18, Rgb([0, 0, 0])); 20];
//! frames.extend(vec![RgbImage::from_pixel(32, 18, Rgb([255, 255, 255])); 20]);
//! let mut sequence = ImageSequence::new(frames, 10.0).unwrap();
//!
//! let scenes = scenegif::segment(&mut sequence, &DetectorConfig::default()).unwrap();
//! assert_eq!(scenes.len(), 2);
//! ```
//!
//! ## Features
//!
//! - **Scene detection**: HSV content-difference scoring with a threshold,
//!   a minimum scene length and configurable downscaling
//! - **Gap-free intervals**: scenes always tile the timeline from zero to
//!   the source duration
//! - **Resolution policies**: original, fixed height, fixed width or an
//!   explicit (possibly distorting) size, with even-dimension rounding
//! - **Frame-rate reduction**: nearest-frame resampling, never above the
//!   source rate
//! - **Flicker-free palettes**: one palette learned across the clip,
//!   per-frame palettes on request
//! - **Timing-preserving merge**: combined GIFs keep every frame's own delay
//! - **Atomic output**: files are staged and renamed into place, so failed
//!   or cancelled work leaves nothing behind
//! - **Progress & cancellation**: cooperative callbacks and
//!   `CancellationToken` for long-running stages
//! - **Parallel rendering**: scenes encode on a bounded rayon pool
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system to decode
//! video files. [`ImageSequence`] works without them at runtime.

pub mod clip;
pub mod combine;
pub mod config;
mod conversion;
pub mod error;
pub mod ffmpeg;
pub mod gif;
pub mod job;
pub mod media;
pub mod metadata;
pub mod progress;
pub mod scene;
pub mod sequence;
pub mod source;
mod staging;

pub use clip::{ClipHandle, ResolutionPolicy, extract, resize};
pub use combine::{
    CombineOptions, CombinedGifArtifact, DecodedFrame, DecodedGif, combine, combine_with_options,
    decode_gif,
};
pub use config::PipelineOptions;
pub use error::SceneGifError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use crate::gif::{GifArtifact, GifOptions, PaletteStrategy, encode, encode_with_options};
pub use job::{COMBINED_FILE_NAME, Job, JobId, SceneOutcome, scene_file_name};
pub use media::VideoFile;
pub use metadata::VideoMetadata;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use scene::{
    ChannelWeights, DetectorConfig, SceneInterval, content_score, segment, segment_with_options,
};
pub use sequence::ImageSequence;
pub use source::{FrameHandler, FrameSource, SourceRef, TimeWindow, TimedFrame};
