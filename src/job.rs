//! The per-invocation job record.
//!
//! A [`Job`] threads one source through every stage: segmentation,
//! per-scene rendering on a bounded worker pool, and combination of a
//! selected subset. It owns the output directory layout and the
//! cancellation flag, and records every artifact it produces.
//!
//! Scene failures are isolated. A scene that cannot be extracted or
//! encoded is recorded as a failed [`SceneOutcome`] while its siblings
//! continue.
//!
//! # Example
//!
//! ```no_run
//! use scenegif::{DetectorConfig, GifOptions, Job, ResolutionPolicy, SceneGifError};
//!
//! let mut job = Job::new("input.mp4", "out")?;
//! job.segment(&DetectorConfig::default())?;
//! for outcome in job.render(ResolutionPolicy::FixedHeight(480), 10, &GifOptions::default())? {
//!     match &outcome.result {
//!         Ok(artifact) => println!("{}", artifact.path.display()),
//!         Err(error) => eprintln!("scene {}: {error}", outcome.interval.index),
//!     }
//! }
//! let combined = job.combine(&[0, 2])?;
//! println!("merged into {}", combined.artifact.path.display());
//! # Ok::<(), SceneGifError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use rayon::prelude::*;
use uuid::Uuid;

use crate::{
    clip::{ClipHandle, ResolutionPolicy, extract, resize},
    combine::{CombineOptions, CombinedGifArtifact, combine_with_options},
    config::PipelineOptions,
    error::SceneGifError,
    gif::{GifArtifact, GifOptions, encode_with_options},
    progress::{CancellationToken, OperationType},
    scene::{DetectorConfig, SceneInterval, segment_with_options},
    source::SourceRef,
};

/// File name of the merged artifact inside the output directory.
pub const COMBINED_FILE_NAME: &str = "combined.gif";

/// Unique identifier of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// The result of rendering one scene.
#[derive(Debug)]
pub struct SceneOutcome {
    /// The scene that was rendered.
    pub interval: SceneInterval,
    /// The artifact, or why this scene failed.
    pub result: Result<GifArtifact, SceneGifError>,
}

impl SceneOutcome {
    /// The artifact if rendering succeeded.
    pub fn artifact(&self) -> Option<&GifArtifact> {
        self.result.as_ref().ok()
    }
}

/// File name of the artifact for scene `index` (zero-based).
pub fn scene_file_name(index: usize) -> String {
    format!("scene_{:03}.gif", index + 1)
}

/// One pipeline invocation over one source.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    source: SourceRef,
    output_dir: PathBuf,
    options: PipelineOptions,
    intervals: Vec<SceneInterval>,
    outcomes: Vec<SceneOutcome>,
    combined: Option<CombinedGifArtifact>,
}

impl Job {
    /// Create a job writing artifacts under `output_dir`.
    ///
    /// The directory is created if needed. Nothing is decoded yet.
    pub fn new(
        source: impl Into<SourceRef>,
        output_dir: impl AsRef<Path>,
    ) -> Result<Self, SceneGifError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;

        let job = Self {
            id: JobId::new(),
            source: source.into(),
            output_dir,
            options: PipelineOptions::default().with_cancellation(CancellationToken::new()),
            intervals: Vec::new(),
            outcomes: Vec::new(),
            combined: None,
        };
        log::debug!(
            "Job {} created for {} (output: {})",
            job.id,
            job.source,
            job.output_dir.display()
        );
        Ok(job)
    }

    /// Use `options` for every stage. A cancellation token is attached if
    /// `options` carries none.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = match options.cancellation() {
            Some(_) => options,
            None => options.with_cancellation(CancellationToken::new()),
        };
        self
    }

    /// This job's identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The source being processed.
    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// Directory receiving the artifacts.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Scenes found by the last [`segment`](Job::segment) call.
    pub fn intervals(&self) -> &[SceneInterval] {
        &self.intervals
    }

    /// Outcomes of the last [`render`](Job::render) call, in scene order.
    pub fn outcomes(&self) -> &[SceneOutcome] {
        &self.outcomes
    }

    /// Successfully rendered per-scene artifacts, in scene order.
    pub fn artifacts(&self) -> Vec<&GifArtifact> {
        self.outcomes.iter().filter_map(SceneOutcome::artifact).collect()
    }

    /// The merged artifact of the last [`combine`](Job::combine) call.
    pub fn combined(&self) -> Option<&CombinedGifArtifact> {
        self.combined.as_ref()
    }

    /// A handle that cancels this job from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.options.cancellation().cloned().unwrap_or_default()
    }

    /// Request cancellation. Running stages stop at their next check.
    pub fn cancel(&self) {
        if let Some(token) = self.options.cancellation() {
            token.cancel();
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.options.is_cancelled()
    }

    /// Segment the source into scenes, replacing earlier results.
    pub fn segment(&mut self, config: &DetectorConfig) -> Result<&[SceneInterval], SceneGifError> {
        self.options.check_cancelled()?;
        let mut source = self.source.open()?;
        let intervals = segment_with_options(&mut *source, config, &self.options)?;

        log::debug!("Job {}: {} scene(s)", self.id, intervals.len());
        self.intervals = intervals;
        self.outcomes.clear();
        self.combined = None;
        Ok(&self.intervals)
    }

    /// Render every scene to `scene_NNN.gif` in the output directory.
    ///
    /// Scenes are encoded in parallel on a pool of
    /// [`PipelineOptions::with_threads`] workers (available cores by
    /// default). Failures are recorded per scene.
    ///
    /// # Errors
    ///
    /// - [`SceneGifError::InvalidConfiguration`] if the job has not been
    ///   segmented or `gif_options` is invalid.
    /// - [`SceneGifError::Cancelled`] if the job was cancelled. Scenes
    ///   finished before the cancellation are still recorded.
    pub fn render(
        &mut self,
        policy: ResolutionPolicy,
        fps: u32,
        gif_options: &GifOptions,
    ) -> Result<&[SceneOutcome], SceneGifError> {
        if self.intervals.is_empty() {
            return Err(SceneGifError::InvalidConfiguration(
                "job has no scenes; call segment first".to_string(),
            ));
        }
        gif_options.validate()?;
        self.options.check_cancelled()?;

        let source = self.source.open()?;
        let clips: Vec<Result<ClipHandle, SceneGifError>> = self
            .intervals
            .iter()
            .map(|interval| extract(&*source, interval).and_then(|clip| resize(&clip, policy)))
            .collect();
        drop(source);

        let workers = self.options.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|error| {
                SceneGifError::InvalidConfiguration(format!("cannot start worker pool: {error}"))
            })?;

        log::debug!(
            "Job {}: rendering {} scene(s) at {} fps, resolution {}, {} worker(s)",
            self.id,
            clips.len(),
            fps,
            policy,
            workers
        );

        let tracker = Mutex::new(
            self.options
                .tracker(OperationType::SceneRendering, Some(clips.len() as u64)),
        );
        let options = &self.options;
        let output_dir = &self.output_dir;

        let results: Vec<Result<GifArtifact, SceneGifError>> = pool.install(|| {
            clips
                .into_par_iter()
                .enumerate()
                .map(|(position, clip)| {
                    options.check_cancelled()?;
                    let clip = clip?;
                    let path = output_dir.join(scene_file_name(position));
                    let result = encode_with_options(&clip, fps, path, gif_options, options)
                        .map_err(|error| error.for_scene(clip.interval().index));
                    if let Ok(mut tracker) = tracker.lock() {
                        tracker.advance(Some(clip.interval().end));
                    }
                    result
                })
                .collect()
        });
        if let Ok(mut tracker) = tracker.lock() {
            tracker.finish();
        }

        self.outcomes = self
            .intervals
            .iter()
            .zip(results)
            .map(|(interval, result)| {
                if let Err(error) = &result
                    && !matches!(error, SceneGifError::Cancelled)
                {
                    log::warn!("Scene {} failed ({}): {error}", interval.index, error.stage());
                }
                SceneOutcome {
                    interval: *interval,
                    result,
                }
            })
            .collect();
        self.combined = None;

        self.options.check_cancelled()?;
        Ok(&self.outcomes)
    }

    /// Merge the rendered scenes at `selection` (zero-based scene indices,
    /// in playback order) into `combined.gif`.
    pub fn combine(&mut self, selection: &[usize]) -> Result<&CombinedGifArtifact, SceneGifError> {
        self.combine_with_options(selection, &CombineOptions::default())
    }

    /// [`combine`](Job::combine) with explicit [`CombineOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`SceneGifError::CombineFailure`] if a selected scene was not
    /// rendered or failed, or if merging fails.
    pub fn combine_with_options(
        &mut self,
        selection: &[usize],
        combine_options: &CombineOptions,
    ) -> Result<&CombinedGifArtifact, SceneGifError> {
        let artifacts = selection
            .iter()
            .map(|&index| {
                let outcome = self
                    .outcomes
                    .iter()
                    .find(|outcome| outcome.interval.index == index)
                    .ok_or_else(|| {
                        SceneGifError::combine(format!("scene {index} has not been rendered"))
                    })?;
                outcome.result.as_ref().cloned().map_err(|error| {
                    SceneGifError::combine(format!("scene {index} failed to render: {error}"))
                })
            })
            .collect::<Result<Vec<GifArtifact>, SceneGifError>>()?;

        let path = self.output_dir.join(COMBINED_FILE_NAME);
        let combined = combine_with_options(&artifacts, path, combine_options, &self.options)?;
        log::debug!(
            "Job {}: combined {} scene(s) into {}",
            self.id,
            selection.len(),
            combined.artifact.path.display()
        );
        Ok(self.combined.insert(combined))
    }
}
