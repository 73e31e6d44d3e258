//! Error types for the `scenegif` crate.
//!
//! This module defines [`SceneGifError`], the unified error type returned by
//! every fallible pipeline operation. Variants carry the stage and, where it
//! applies, the scene interval that failed so a caller can present a specific
//! message without extra bookkeeping.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `scenegif` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SceneGifError {
    /// The source video could not be opened or decoded.
    #[error("Failed to read video source {path}: {reason}")]
    SourceUnreadable {
        /// Path or identifier of the source.
        path: PathBuf,
        /// Underlying reason the source is unreadable.
        reason: String,
    },

    /// Segmentation produced no intervals.
    ///
    /// Segmentation always yields at least one interval for a decodable
    /// source, so this points at a deeper decode failure.
    #[error("No scenes detected: {0}")]
    NoScenesDetected(String),

    /// A single interval could not be extracted from the source.
    #[error("Failed to extract scene {scene_index}: {reason}")]
    ExtractionFailure {
        /// Ordinal of the interval that failed.
        scene_index: usize,
        /// What went wrong.
        reason: String,
    },

    /// A clip could not be resized or encoded to GIF.
    #[error("{}", encoding_message(*scene_index, reason))]
    EncodingFailure {
        /// Ordinal of the interval being encoded, if the clip came from one.
        scene_index: Option<usize>,
        /// What went wrong.
        reason: String,
    },

    /// Merging GIF artifacts failed. No merged file is left behind.
    #[error("Failed to combine GIFs: {reason}")]
    CombineFailure {
        /// What went wrong.
        reason: String,
    },

    /// A configuration value is out of its accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

fn encoding_message(scene_index: Option<usize>, reason: &str) -> String {
    match scene_index {
        Some(index) => format!("Failed to encode scene {index}: {reason}"),
        None => format!("Failed to encode clip: {reason}"),
    }
}

impl SceneGifError {
    /// Build an [`EncodingFailure`](SceneGifError::EncodingFailure).
    pub(crate) fn encoding(scene_index: Option<usize>, reason: impl Into<String>) -> Self {
        SceneGifError::EncodingFailure {
            scene_index,
            reason: reason.into(),
        }
    }

    /// Build a [`CombineFailure`](SceneGifError::CombineFailure).
    pub(crate) fn combine(reason: impl Into<String>) -> Self {
        SceneGifError::CombineFailure {
            reason: reason.into(),
        }
    }

    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            SceneGifError::SourceUnreadable { .. } | SceneGifError::FfmpegError(_) => "source",
            SceneGifError::NoScenesDetected(_) => "segment",
            SceneGifError::ExtractionFailure { .. } => "extract",
            SceneGifError::EncodingFailure { .. } => "encode",
            SceneGifError::CombineFailure { .. } => "combine",
            SceneGifError::InvalidConfiguration(_) => "configuration",
            SceneGifError::Cancelled => "cancelled",
            SceneGifError::IoError(_) => "io",
        }
    }

    /// The scene interval a per-interval failure refers to.
    pub fn scene_index(&self) -> Option<usize> {
        match self {
            SceneGifError::ExtractionFailure { scene_index, .. } => Some(*scene_index),
            SceneGifError::EncodingFailure { scene_index, .. } => *scene_index,
            _ => None,
        }
    }

    /// Attach a scene index to an encoding failure raised without one.
    pub(crate) fn for_scene(self, index: usize) -> Self {
        match self {
            SceneGifError::EncodingFailure {
                scene_index: None,
                reason,
            } => SceneGifError::EncodingFailure {
                scene_index: Some(index),
                reason,
            },
            other => other,
        }
    }
}

impl From<FfmpegError> for SceneGifError {
    fn from(error: FfmpegError) -> Self {
        SceneGifError::FfmpegError(error.to_string())
    }
}
