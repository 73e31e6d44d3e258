use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use scenegif::{
    DetectorConfig, FfmpegLogLevel, FrameSource, GifArtifact, GifOptions, Job, OperationType,
    PaletteStrategy, PipelineOptions, ProgressCallback, ProgressInfo, ResolutionPolicy,
    SceneInterval, VideoFile,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  scenegif probe input.mp4 --json\n  scenegif detect input.mp4 --threshold 30\n  scenegif render input.mp4 --out gifs --resolution 480p --fps 10 --combine 1,3,4 --progress\n  scenegif combine gifs/scene_001.gif gifs/scene_003.gif --out merged.gif\n  scenegif completions zsh > _scenegif";

#[derive(Debug, Parser)]
#[command(
    name = "scenegif",
    version,
    about = "Split a video into scenes and turn each scene into a looping GIF",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, verbose, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Worker threads for scene rendering (default: available cores).
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Scene detector settings shared by `detect` and `render`.
#[derive(Debug, Parser, Clone)]
struct DetectorArgs {
    /// Content-difference score above which a cut is declared.
    #[arg(long, default_value_t = 27.0)]
    threshold: f64,

    /// Minimum number of frames between two cuts.
    #[arg(long, default_value_t = 15)]
    min_scene_length: u64,

    /// Downscale factor applied before scoring (default: width / 256).
    #[arg(long)]
    downscale: Option<u32>,
}

impl DetectorArgs {
    fn config(&self) -> DetectorConfig {
        let config = DetectorConfig::new()
            .threshold(self.threshold)
            .min_scene_length(self.min_scene_length);
        match self.downscale {
            Some(factor) => config.downscale_factor(factor),
            None => config,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print video metadata.
    #[command(
        about = "Print video metadata",
        visible_alias = "metadata",
        after_help = "Examples:\n  scenegif probe input.mp4\n  scenegif probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Detect scenes and print their intervals.
    #[command(
        about = "Detect scenes",
        after_help = "Examples:\n  scenegif detect input.mp4\n  scenegif detect input.mp4 --threshold 35 --min-scene-length 24 --json"
    )]
    Detect {
        /// Input video path.
        input: PathBuf,

        #[command(flatten)]
        detector: DetectorArgs,

        /// Output intervals as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render every scene to a GIF, optionally merging a selection.
    #[command(
        about = "Render scenes to GIFs",
        after_help = "Examples:\n  scenegif render input.mp4 --out gifs\n  scenegif render input.mp4 --out gifs --resolution 720p --fps 12 --combine 2,1"
    )]
    Render {
        /// Input video path.
        input: PathBuf,

        /// Output directory for scene GIFs.
        #[arg(long)]
        out: PathBuf,

        /// Output resolution: original, 720p, 480p, h<N>, w<N> or <W>x<H>.
        #[arg(long, default_value = "original")]
        resolution: String,

        /// GIF frame rate (default: source frame rate, rounded).
        #[arg(long)]
        fps: Option<u32>,

        #[command(flatten)]
        detector: DetectorArgs,

        /// Quantize every frame with its own palette.
        #[arg(long)]
        per_frame_palette: bool,

        /// Scenes to merge into combined.gif, 1-based and in order (e.g. 1,3,4).
        #[arg(long)]
        combine: Option<String>,
    },

    /// Merge existing GIFs into one, keeping each frame's timing.
    #[command(
        about = "Combine GIFs",
        after_help = "Examples:\n  scenegif combine a.gif b.gif --out merged.gif"
    )]
    Combine {
        /// Input GIFs in playback order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output GIF path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a 1-based, comma-separated scene list into zero-based indices.
fn parse_selection(value: &str) -> Result<Vec<usize>, Box<dyn std::error::Error>> {
    let selection = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("invalid scene number in --combine: {part}")),
            Ok(number) => Ok(number - 1),
        })
        .collect::<Result<Vec<usize>, String>>()?;
    if selection.is_empty() {
        return Err("--combine needs at least one scene number".into());
    }
    Ok(selection)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn ensure_output_directory(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    let occupied = path.is_dir() && fs::read_dir(path)?.next().is_some();
    if occupied {
        if !overwrite {
            return Err(format!(
                "output directory is not empty: {} (use --overwrite)",
                path.display()
            )
            .into());
        }
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("writing into existing directory {}", path.display()).yellow()
        );
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if let Some(level) = &global.log_level {
        scenegif::set_ffmpeg_log_level(level.parse::<FfmpegLogLevel>()?);
    }
    Ok(())
}

fn pipeline_options(global: &GlobalOptions) -> PipelineOptions {
    let mut options = PipelineOptions::new();
    if let Some(threads) = global.threads {
        options = options.with_threads(threads);
    }
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()));
    }
    options
}

/// Progress bar for the stage currently reporting.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let label = match info.operation {
            OperationType::SceneDetection => "detecting scenes",
            OperationType::SceneRendering => "rendering scenes",
            OperationType::GifCombining => "combining",
            // Per-clip encodes run in parallel; the scene count tracks them.
            _ => return,
        };
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        self.bar.set_message(label);
        if info.total.is_some_and(|total| info.current >= total) {
            self.bar.finish_and_clear();
        }
    }
}

fn interval_json(interval: &SceneInterval) -> serde_json::Value {
    json!({
        "index": interval.index,
        "start_seconds": interval.start_seconds(),
        "end_seconds": interval.end_seconds(),
        "duration_seconds": interval.duration().as_secs_f64(),
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let source = VideoFile::open(&input)?;
            let metadata = source.metadata();
            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "width": metadata.width,
                    "height": metadata.height,
                    "fps": metadata.frames_per_second,
                    "frame_count": metadata.frame_count,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "codec": metadata.codec,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Path: {}", input.display());
                println!("Duration: {:?}", metadata.duration);
                println!(
                    "Video: {}x{} @ {:.2} fps, {} frames [{}]",
                    metadata.width,
                    metadata.height,
                    metadata.frames_per_second,
                    metadata.frame_count,
                    metadata.codec,
                );
            }
        }
        Commands::Detect {
            input,
            detector,
            json,
        } => {
            let mut source = VideoFile::open(&input)?;
            let options = pipeline_options(&cli.global);
            let scenes = scenegif::segment_with_options(&mut source, &detector.config(), &options)?;
            if json {
                let payload: Vec<_> = scenes.iter().map(interval_json).collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for scene in &scenes {
                    println!(
                        "scene {:>3}: {:>9.3}s - {:>9.3}s ({:.3}s)",
                        scene.index + 1,
                        scene.start_seconds(),
                        scene.end_seconds(),
                        scene.duration().as_secs_f64()
                    );
                }
            }
        }
        Commands::Render {
            input,
            out,
            resolution,
            fps,
            detector,
            per_frame_palette,
            combine,
        } => {
            let policy: ResolutionPolicy = resolution.parse()?;
            let selection = combine.as_deref().map(parse_selection).transpose()?;
            ensure_output_directory(&out, cli.global.overwrite)?;

            let fps = match fps {
                Some(0) => return Err("--fps must be greater than 0".into()),
                Some(fps) => fps,
                None => {
                    let source = VideoFile::open(&input)?;
                    source.metadata().frames_per_second.round().max(1.0) as u32
                }
            };
            let gif_options = if per_frame_palette {
                GifOptions::new().palette(PaletteStrategy::PerFrame)
            } else {
                GifOptions::new()
            };

            let mut job = Job::new(input.as_path(), &out)?.with_options(pipeline_options(&cli.global));
            let scene_count = job.segment(&detector.config())?.len();
            println!(
                "{} {}",
                "detected".cyan().bold(),
                format!("{scene_count} scene(s) in {}", input.display())
            );

            let mut rendered = 0_usize;
            for outcome in job.render(policy, fps, &gif_options)? {
                match &outcome.result {
                    Ok(artifact) => {
                        rendered += 1;
                        if cli.global.verbose {
                            eprintln!(
                                "scene {} -> {} ({} frames)",
                                outcome.interval.index + 1,
                                artifact.path.display(),
                                artifact.frame_count
                            );
                        }
                    }
                    Err(error) => eprintln!(
                        "{} scene {}: {error}",
                        "error:".red().bold(),
                        outcome.interval.index + 1
                    ),
                }
            }
            if rendered == 0 {
                return Err("no scene could be rendered".into());
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Rendered {rendered}/{scene_count} scene(s) to {}", out.display()).green()
            );

            if let Some(selection) = selection {
                let combined = job.combine(&selection)?;
                println!(
                    "{} {} ({} frames)",
                    "saved".green().bold(),
                    combined.artifact.path.display(),
                    combined.artifact.frame_count
                );
            }
        }
        Commands::Combine { inputs, out } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let artifacts = inputs
                .iter()
                .map(GifArtifact::open)
                .collect::<Result<Vec<_>, _>>()?;
            let combined = scenegif::combine_with_options(
                &artifacts,
                &out,
                &Default::default(),
                &pipeline_options(&cli.global),
            )?;
            println!(
                "{} {} ({} frames, {:?})",
                "saved".green().bold(),
                combined.artifact.path.display(),
                combined.artifact.frame_count,
                combined.artifact.total_duration()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "scenegif", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, parse_selection};
    use clap::CommandFactory;

    #[test]
    fn parse_selection_is_one_based() {
        assert_eq!(parse_selection("1,3,4").unwrap(), vec![0, 2, 3]);
        assert_eq!(parse_selection(" 2 , 1 ").unwrap(), vec![1, 0]);
        assert!(parse_selection("0").is_err());
        assert!(parse_selection("a,b").is_err());
        assert!(parse_selection(",").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
