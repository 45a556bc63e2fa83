use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use frameflow::{
    DirectorySaver, ExtractionSettings, FfmpegLogLevel, FrameBatch, FrameObserver, ImageFormat,
    MediaSource, OperationType, PipelineOptions, ProgressCallback, ProgressInfo, Session,
    StoreLocation, VideoSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frameflow metadata input.mp4 --json\n  frameflow extract input.mp4 --out frames --fps 2 --format png --progress\n  frameflow extract input.mp4 --start 0:10 --end 0:20 --store frames.db\n  frameflow completions zsh > _frameflow";

#[derive(Debug, Parser)]
#[command(
    name = "frameflow",
    version,
    about = "Extract still-frame sequences from videos into ZIP archives",
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
    /// Print status lines as the pipeline reports them.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting an existing archive.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print metadata for a video file.
    #[command(
        about = "Print video metadata",
        visible_alias = "probe",
        after_help = "Examples:\n  frameflow metadata input.mp4\n  frameflow metadata input.mp4 --json"
    )]
    Metadata {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract a frame sequence into a ZIP archive.
    #[command(
        about = "Extract frames into a ZIP archive",
        after_help = "Examples:\n  frameflow extract input.mp4 --out frames --fps 4 --format jpeg --quality 0.6\n  frameflow extract input.mp4 --start 00:00:10 --end 00:00:20 --progress"
    )]
    Extract {
        /// Input video path.
        input: PathBuf,
        /// Directory the archive is written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Frames captured per second of video.
        #[arg(long, default_value_t = 1.0)]
        fps: f64,
        /// Encoding quality between 0.0 and 1.0.
        #[arg(long, default_value_t = 0.8)]
        quality: f32,
        /// Output image format (webp, png, jpeg).
        #[arg(long, default_value = "webp")]
        format: String,
        /// Start time (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        start: Option<String>,
        /// End time; defaults to the end of the video.
        #[arg(long)]
        end: Option<String>,
        /// Keep encoded frames in a SQLite database at this path instead of memory.
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::try_from_secs_f64(total_seconds.max(0.0))?)
}

fn build_settings(
    duration: Duration,
    fps: f64,
    quality: f32,
    format: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<ExtractionSettings, Box<dyn std::error::Error>> {
    let format: ImageFormat = format.parse()?;
    let start_time = start.map(parse_timecode).transpose()?.unwrap_or_default();
    let end_time = end
        .map(parse_timecode)
        .transpose()?
        .map_or(duration, |end| end.min(duration));

    let settings = ExtractionSettings::for_duration(duration)
        .with_rate(fps)
        .with_quality(quality)
        .with_format(format)
        .with_range(start_time, end_time);
    settings.validate()?;
    Ok(settings)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level
            .parse()
            .map_err(|_| format!("unsupported --log-level: {level}"))?;
        frameflow::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

/// Drives one indicatif bar for both capture and archive progress.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        match info.operation {
            OperationType::FrameCapture => {
                if let Some(total) = info.total {
                    self.bar.set_length(total);
                }
                self.bar.set_position(info.current);
                self.bar.set_message("capturing");
            }
            OperationType::ArchiveGeneration => {
                self.bar.set_length(100);
                self.bar
                    .set_position(info.percentage.unwrap_or(0.0).round() as u64);
                self.bar.set_message("archiving");
            }
            _ => {}
        }
    }
}

/// Prints status lines to stderr when `--verbose` is set.
struct TerminalObserver {
    verbose: bool,
}

impl FrameObserver for TerminalObserver {
    fn on_frames(&self, batch: &FrameBatch) {
        if self.verbose {
            for frame in &batch.frames {
                eprintln!(
                    "{} frame {} at {:.3}s",
                    "encoded".cyan(),
                    frame.id,
                    frame.timestamp.as_secs_f64()
                );
            }
        }
    }

    fn on_status(&self, message: &str) {
        if self.verbose {
            eprintln!("{} {}", "status".cyan().bold(), message);
        }
    }
}

async fn extract(
    global: &GlobalOptions,
    input: PathBuf,
    out: PathBuf,
    settings_for: impl FnOnce(Duration) -> Result<ExtractionSettings, Box<dyn std::error::Error>>,
    store: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = MediaSource::open(&input)?;
    let settings = settings_for(source.metadata().duration)?;
    let base_name = source.metadata().archive_base_name().to_string();

    let mut options = PipelineOptions::new();
    if let Some(path) = store {
        options = options.with_store(StoreLocation::Path(path));
    }
    let progress = if global.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let mut session = Session::new(options).with_observer(Arc::new(TerminalObserver {
        verbose: global.verbose,
    }));

    let report = session.extract(&mut source, &settings).await?;
    if report.capture.skipped > 0 {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("{} timestamp(s) could not be captured", report.capture.skipped).yellow()
        );
    }

    let saver = DirectorySaver::new(&out).with_overwrite(global.overwrite);
    let saved = session.save_archive(&base_name, &saver).await?;
    session.shutdown().await?;

    if let Some(progress) = progress {
        progress.bar.finish_with_message("done");
    }

    println!(
        "{} {}",
        "success:".green().bold(),
        format!(
            "Extracted {} frame(s) to {}",
            report.completed,
            saved.display()
        )
        .green()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Metadata { input, json } => {
            let source = MediaSource::open(&input)?;
            let metadata = source.metadata();

            if json {
                let payload = json!({
                    "name": metadata.name,
                    "size_bytes": metadata.size,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "width": metadata.width,
                    "height": metadata.height,
                    "fps": metadata.frames_per_second,
                    "archive_name": frameflow::archive_filename(metadata.archive_base_name()),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Name: {}", metadata.name);
                println!("Size: {} bytes", metadata.size);
                println!("Duration: {:?}", metadata.duration);
                println!(
                    "Video: {}x{} @ {:.2} fps",
                    metadata.width, metadata.height, metadata.frames_per_second
                );
            }
        }

        Commands::Extract {
            input,
            out,
            fps,
            quality,
            format,
            start,
            end,
            store,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .build()?;
            let settings_for = |duration| {
                build_settings(
                    duration,
                    fps,
                    quality,
                    &format,
                    start.as_deref(),
                    end.as_deref(),
                )
            };
            runtime.block_on(extract(&cli.global, input, out, settings_for, store))?;
        }

        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frameflow", &mut std::io::stdout());
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
    use std::time::Duration;

    use super::{build_settings, parse_timecode};
    use frameflow::ImageFormat;

    #[test]
    fn parse_timecode_formats() {
        let seconds = parse_timecode("75").unwrap();
        assert_eq!(seconds.as_secs(), 75);

        let mm_ss = parse_timecode("01:15").unwrap();
        assert_eq!(mm_ss.as_secs(), 75);

        let hh_mm_ss = parse_timecode("00:01:15.5").unwrap();
        assert_eq!(hh_mm_ss.as_millis(), 75_500);

        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_timecode_rejects_unrepresentable_times() {
        assert!(parse_timecode("inf").is_err());
        assert!(parse_timecode("1e30").is_err());
        assert!(parse_timecode("00:00:inf").is_err());
    }

    #[test]
    fn settings_default_to_whole_video() {
        let settings =
            build_settings(Duration::from_secs(10), 1.0, 0.8, "webp", None, None).unwrap();
        assert_eq!(settings.start_time, Duration::ZERO);
        assert_eq!(settings.end_time, Duration::from_secs(10));
        assert_eq!(settings.format, ImageFormat::Webp);
    }

    #[test]
    fn settings_clamp_end_to_duration() {
        let settings = build_settings(
            Duration::from_secs(10),
            2.0,
            0.5,
            "jpg",
            Some("2"),
            Some("00:01:00"),
        )
        .unwrap();
        assert_eq!(settings.start_time, Duration::from_secs(2));
        assert_eq!(settings.end_time, Duration::from_secs(10));
        assert_eq!(settings.format, ImageFormat::Jpeg);
    }

    #[test]
    fn settings_reject_bad_input() {
        assert!(build_settings(Duration::from_secs(10), 0.0, 0.8, "png", None, None).is_err());
        assert!(build_settings(Duration::from_secs(10), 1.0, 0.8, "gif", None, None).is_err());
        assert!(
            build_settings(Duration::from_secs(10), 1.0, 0.8, "png", Some("8"), Some("4")).is_err()
        );
    }
}
