//! Benchmarks for scene detection, GIF encoding and combination.
//!
//! Run with: cargo bench
//!
//! Video-file benchmarks require fixture files from
//! `tests/fixtures/generate_fixtures.sh`; the rest run on in-memory frames.

use std::{path::Path, time::Duration};

use criterion::Criterion;
use image::{Rgb, RgbImage};
use scenegif::{
    ChannelWeights, DetectorConfig, FfmpegLogLevel, FrameSource, GifArtifact, GifOptions,
    ImageSequence, Job, PaletteStrategy, PipelineOptions, ResolutionPolicy, SceneInterval,
    VideoFile,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn gradient(width: u32, height: u32, shift: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x + shift) % 256) as u8, ((y * 2) % 256) as u8, (shift % 256) as u8])
    })
}

/// Four seconds of a drifting gradient at 25 fps, with a cut every second.
fn synthetic_sequence(width: u32, height: u32) -> ImageSequence {
    let frames = (0..100)
        .map(|index| gradient(width, height, index + (index / 25) * 120))
        .collect();
    ImageSequence::new(frames, 25.0).unwrap()
}

fn whole(sequence: &ImageSequence) -> SceneInterval {
    SceneInterval {
        index: 0,
        start: Duration::ZERO,
        end: sequence.metadata().duration,
    }
}

fn benchmark_content_score(criterion: &mut Criterion) {
    let previous = gradient(256, 144, 0);
    let current = gradient(256, 144, 7);
    let weights = ChannelWeights::default();

    criterion.bench_function("content score 256x144", |bencher| {
        bencher.iter(|| scenegif::content_score(&previous, &current, &weights));
    });
}

fn benchmark_segmentation(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("segmentation");
    group.sample_size(20);

    let mut sequence = synthetic_sequence(640, 360);
    group.bench_function("in-memory 640x360, auto downscale", |bencher| {
        bencher.iter(|| scenegif::segment(&mut sequence, &DetectorConfig::default()).unwrap());
    });

    group.bench_function("in-memory 640x360, no downscale", |bencher| {
        let config = DetectorConfig::new().downscale_factor(1);
        bencher.iter(|| scenegif::segment(&mut sequence, &config).unwrap());
    });

    if Path::new(SAMPLE_VIDEO).exists() {
        scenegif::set_ffmpeg_log_level(FfmpegLogLevel::Error);
        group.bench_function("video file", |bencher| {
            bencher.iter(|| {
                let mut source = VideoFile::open(SAMPLE_VIDEO).unwrap();
                scenegif::segment(&mut source, &DetectorConfig::default()).unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_encoding(criterion: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let sequence = synthetic_sequence(320, 180);
    let clip = scenegif::extract(&sequence, &whole(&sequence)).unwrap();

    let mut group = criterion.benchmark_group("gif encoding");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for (name, palette) in [
        ("global palette", PaletteStrategy::default()),
        ("per-frame palette", PaletteStrategy::PerFrame),
    ] {
        let options = GifOptions::new().palette(palette);
        group.bench_function(name, |bencher| {
            bencher.iter(|| {
                scenegif::encode_with_options(
                    &clip,
                    10,
                    dir.path().join("bench.gif"),
                    &options,
                    &PipelineOptions::default(),
                )
                .unwrap()
            });
        });
    }

    let half = scenegif::resize(&clip, ResolutionPolicy::FixedHeight(90)).unwrap();
    group.bench_function("global palette, half size", |bencher| {
        bencher.iter(|| scenegif::encode(&half, 10, dir.path().join("half.gif")).unwrap());
    });

    group.finish();
}

fn benchmark_combine(criterion: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let sequence = synthetic_sequence(320, 180);
    let clip = scenegif::extract(&sequence, &whole(&sequence)).unwrap();
    let artifacts: Vec<GifArtifact> = (0..3)
        .map(|index| {
            scenegif::encode(&clip, 10, dir.path().join(format!("part_{index}.gif"))).unwrap()
        })
        .collect();

    let mut group = criterion.benchmark_group("combine");
    group.sample_size(10);

    group.bench_function("three 4s scenes", |bencher| {
        bencher.iter(|| scenegif::combine(&artifacts, dir.path().join("combined.gif")).unwrap());
    });

    group.finish();
}

fn benchmark_job(criterion: &mut Criterion) {
    let sequence = synthetic_sequence(320, 180);

    let mut group = criterion.benchmark_group("job render");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(15));

    for threads in [1, 4] {
        group.bench_function(format!("{threads} worker(s)"), |bencher| {
            bencher.iter(|| {
                let dir = tempfile::tempdir().unwrap();
                let mut job = Job::new(sequence.clone(), dir.path())
                    .unwrap()
                    .with_options(PipelineOptions::new().with_threads(threads));
                job.segment(&DetectorConfig::default()).unwrap();
                job.render(ResolutionPolicy::Original, 10, &GifOptions::default())
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_content_score,
    benchmark_segmentation,
    benchmark_encoding,
    benchmark_combine,
    benchmark_job,
);
criterion::criterion_main!(benches);
