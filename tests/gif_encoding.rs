//! GIF encoding integration tests.
//!
//! Most tests run on in-memory sequences; the video-file test requires
//! fixture files from `tests/fixtures/generate_fixtures.sh`.

use std::{path::Path, time::Duration};

use image::{Rgb, RgbImage};
use scenegif::{
    CancellationToken, ClipHandle, GifArtifact, GifOptions, ImageSequence, PaletteStrategy,
    PipelineOptions, ResolutionPolicy, SceneGifError, SceneInterval, VideoFile,
};

/// A gradient that moves one step per frame, so frames are distinguishable.
fn moving_gradient(frame_count: usize, fps: f64) -> ImageSequence {
    let frames = (0..frame_count)
        .map(|index| {
            RgbImage::from_fn(48, 32, |x, y| {
                Rgb([
                    ((x as usize * 5 + index * 3) % 256) as u8,
                    (y * 8) as u8,
                    (index * 7 % 256) as u8,
                ])
            })
        })
        .collect();
    ImageSequence::new(frames, fps).expect("valid sequence")
}

fn interval(index: usize, start_ms: u64, end_ms: u64) -> SceneInterval {
    SceneInterval {
        index,
        start: Duration::from_millis(start_ms),
        end: Duration::from_millis(end_ms),
    }
}

fn clip(source: &ImageSequence, start_ms: u64, end_ms: u64) -> ClipHandle {
    scenegif::extract(source, &interval(0, start_ms, end_ms)).expect("clip in range")
}

#[test]
fn encoded_file_matches_reported_artifact() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("scene.gif");
    let source = moving_gradient(30, 10.0);

    let artifact = scenegif::encode(&clip(&source, 0, 3000), 10, &path).unwrap();

    assert_eq!(artifact.path, path);
    assert_eq!(artifact.frame_count, 30);
    assert!(artifact.frame_durations_ms.iter().all(|&ms| ms == 100));
    assert!(artifact.loop_forever);
    assert_eq!((artifact.width, artifact.height), (48, 32));

    let reopened = GifArtifact::open(&path).unwrap();
    assert_eq!(reopened, artifact);
    assert_eq!(reopened.total_duration(), Duration::from_secs(3));
}

#[test]
fn lower_target_rate_drops_frames() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(60, 30.0);

    let artifact =
        scenegif::encode(&clip(&source, 0, 2000), 10, dir.path().join("slow.gif")).unwrap();
    assert_eq!(artifact.frame_count, 20);
    assert!(artifact.frame_durations_ms.iter().all(|&ms| ms == 100));

    // Above the source rate the output holds at the source rate.
    let artifact =
        scenegif::encode(&clip(&source, 0, 2000), 60, dir.path().join("fast.gif")).unwrap();
    assert_eq!(artifact.frame_count, 60);
    assert_eq!(artifact.frame_durations_ms[0], 30);
}

#[test]
fn resized_clip_sets_gif_dimensions() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(10, 10.0);
    let clip = scenegif::resize(&clip(&source, 0, 1000), ResolutionPolicy::FixedHeight(16)).unwrap();

    let artifact = scenegif::encode(&clip, 10, dir.path().join("small.gif")).unwrap();
    assert_eq!((artifact.width, artifact.height), (24, 16));
    assert_eq!(GifArtifact::open(&artifact.path).unwrap().width, 24);
}

#[test]
fn encoding_is_deterministic() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(20, 10.0);
    let clip = clip(&source, 0, 2000);

    let first = scenegif::encode(&clip, 5, dir.path().join("a.gif")).unwrap();
    let second = scenegif::encode(&clip, 5, dir.path().join("b.gif")).unwrap();

    assert_eq!(first.frame_count, second.frame_count);
    assert_eq!(first.frame_durations_ms, second.frame_durations_ms);
    assert_eq!(
        std::fs::read(&first.path).unwrap(),
        std::fs::read(&second.path).unwrap()
    );
}

#[test]
fn per_frame_palette_produces_same_timing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(20, 10.0);
    let options = GifOptions::new().palette(PaletteStrategy::PerFrame);

    let artifact = scenegif::encode_with_options(
        &clip(&source, 0, 2000),
        10,
        dir.path().join("per_frame.gif"),
        &options,
        &PipelineOptions::default(),
    )
    .unwrap();

    let reopened = GifArtifact::open(&artifact.path).unwrap();
    assert_eq!(reopened.frame_count, 20);
    assert!(reopened.loop_forever);
}

#[test]
fn tiny_pixel_budget_still_encodes() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(20, 10.0);
    let options = GifOptions::new().palette_pixel_budget(100);

    let artifact = scenegif::encode_with_options(
        &clip(&source, 0, 2000),
        10,
        dir.path().join("budget.gif"),
        &options,
        &PipelineOptions::default(),
    )
    .unwrap();
    assert_eq!(GifArtifact::open(&artifact.path).unwrap().frame_count, 20);
}

#[test]
fn clip_shorter_than_one_frame_fails_without_output() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("short.gif");
    let source = moving_gradient(20, 10.0);

    let result = scenegif::encode(&clip(&source, 0, 50), 10, &path);

    assert!(matches!(result, Err(SceneGifError::EncodingFailure { .. })));
    assert!(!path.exists());
}

#[test]
fn zero_fps_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = moving_gradient(20, 10.0);
    let result = scenegif::encode(&clip(&source, 0, 2000), 0, dir.path().join("zero.gif"));
    assert!(matches!(result, Err(SceneGifError::EncodingFailure { .. })));
}

#[test]
fn cancelled_encode_leaves_no_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cancelled.gif");
    let source = moving_gradient(20, 10.0);
    let token = CancellationToken::new();
    token.cancel();

    let result = scenegif::encode_with_options(
        &clip(&source, 0, 2000),
        10,
        &path,
        &GifOptions::default(),
        &PipelineOptions::new().with_cancellation(token),
    );

    assert!(matches!(result, Err(SceneGifError::Cancelled)));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn failed_encode_keeps_existing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("existing.gif");
    std::fs::write(&path, b"previous").unwrap();
    let source = moving_gradient(20, 10.0);

    let result = scenegif::encode(&clip(&source, 0, 50), 10, &path);

    assert!(result.is_err());
    assert_eq!(std::fs::read(&path).unwrap(), b"previous");
}

#[test]
fn open_rejects_non_gif_files() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("garbage.gif");
    std::fs::write(&path, b"not a gif at all").unwrap();

    let result = GifArtifact::open(&path);
    assert!(matches!(result, Err(SceneGifError::SourceUnreadable { .. })));
    assert!(GifArtifact::open(dir.path().join("missing.gif")).is_err());
}

#[test]
fn encode_scene_from_video_file() {
    let path = "tests/fixtures/sample_video.mp4";
    if !Path::new(path).exists() {
        return;
    }

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut source = VideoFile::open(path).expect("Failed to open test video");
    let scenes = scenegif::segment(&mut source, &Default::default()).unwrap();
    let clip = scenegif::extract(&source, &scenes[0]).unwrap();
    let clip = scenegif::resize(&clip, ResolutionPolicy::FixedWidth(160)).unwrap();

    let artifact = scenegif::encode(&clip, 10, dir.path().join("scene_001.gif")).unwrap();
    assert!(artifact.frame_count > 0);
    assert_eq!(artifact.width, 160);
    assert_eq!(GifArtifact::open(&artifact.path).unwrap(), artifact);
}
