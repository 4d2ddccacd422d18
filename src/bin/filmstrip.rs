use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use filmstrip::{
    FfmpegLogLevel, FfmpegSource, Frame, FrameOutputOptions, FrameSampler, ImageEncoding,
    MediaBlob, MediaSource, PixelFormat, ProgressCallback, ProgressInfo, SampleSchedule,
    SamplerOptions, VideoHandle, select_video,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio_stream::StreamExt;

const CLI_AFTER_HELP: &str = "Examples:\n  filmstrip probe clip.mp4 --json\n  filmstrip sample clip.mp4 --fps 10 --progress\n  filmstrip sample clip.mp4 --width 160 --jpeg-quality 80 --json\n  filmstrip completions zsh > _filmstrip";

#[derive(Debug, Parser)]
#[command(
    name = "filmstrip",
    version,
    about = "Sample a video at a fixed rate into a filmstrip of still frames",
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
    /// Show debug logging.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print what a sampling run would see.
    #[command(
        about = "Print video metadata and the sample count",
        visible_alias = "info",
        after_help = "Examples:\n  filmstrip probe clip.mp4\n  filmstrip probe clip.mp4 --fps 5 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,
        /// Samples per second used to compute the sample count.
        #[arg(long, default_value_t = filmstrip::DEFAULT_FPS)]
        fps: u32,
        /// Output machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sample frames and list them as they are captured.
    #[command(
        about = "Sample a video into frames",
        after_help = "Examples:\n  filmstrip sample clip.mp4\n  filmstrip sample clip.mp4 --fps 2 --height 90 --progress"
    )]
    Sample {
        /// Input video. Exactly one is accepted.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Samples per second.
        #[arg(long, default_value_t = filmstrip::DEFAULT_FPS)]
        fps: u32,
        /// Longest wait per seek (seconds, mm:ss or hh:mm:ss).
        #[arg(long, default_value = "5")]
        seek_timeout: String,
        /// Declared media type, overriding the extension guess.
        #[arg(long)]
        media_type: Option<String>,
        /// Frame width in pixels.
        #[arg(long)]
        width: Option<u32>,
        /// Frame height in pixels.
        #[arg(long)]
        height: Option<u32>,
        /// Frame pixel format (rgb8, rgba8, gray8).
        #[arg(long)]
        pixel_format: Option<String>,
        /// Encode frames as JPEG at this quality instead of PNG.
        #[arg(long)]
        jpeg_quality: Option<u8>,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
        /// Output the run summary and frame list as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
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
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_pixel_format(value: &str) -> Option<PixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
        "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
        "gray8" | "gray" | "greyscale" | "grayscale" => Some(PixelFormat::Gray8),
        _ => None,
    }
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level.parse()?;
        filmstrip::set_ffmpeg_log_level(parsed);
    }
    log::debug!(
        "FFmpeg log level: {}",
        filmstrip::get_ffmpeg_log_level().map_or_else(|| "unknown".to_string(), |level| level.to_string())
    );

    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if info.skipped > 0 {
            self.bar.set_message(format!("{} skipped", info.skipped));
        }
    }
}

fn frame_line(frame: &Frame) -> String {
    format!(
        "{} {:>5}  {:>9.3}s  {}x{}  {} bytes",
        "frame".green().bold(),
        frame.index(),
        frame.timestamp().as_secs_f64(),
        frame.width(),
        frame.height(),
        frame.image_data().len(),
    )
}

/// List frames as they land in the store until the run reaches a terminal
/// state.
async fn render_filmstrip<S: MediaSource>(
    sampler: &FrameSampler<S>,
    bar: Option<&ProgressBar>,
    quiet: bool,
) {
    let mut updates = sampler.updates();
    let mut shown = 0_u64;

    while let Some(status) = updates.next().await {
        if status.frames > shown {
            let frames = sampler.frames();
            for frame in frames.iter().filter(|frame| frame.index() >= shown) {
                if quiet {
                    continue;
                }
                let line = frame_line(frame);
                match bar {
                    Some(bar) => bar.suspend(|| println!("{line}")),
                    None => println!("{line}"),
                }
            }
            shown = frames.len() as u64;
        }
        if status.state.is_terminal() {
            break;
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Probe { input, fps, json } => {
            let video = FfmpegSource::new()
                .open(MediaBlob::from_path(&input))
                .await
                .map_err(|error| format!("could not process this video: {error}"))?;
            let info = video.info();
            let samples = SampleSchedule::new(info.duration_seconds, fps)
                .map(|schedule| schedule.len())
                .ok();

            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "duration_seconds": info.duration_seconds.is_finite().then_some(info.duration_seconds),
                    "width": info.natural_width,
                    "height": info.natural_height,
                    "codec": info.codec,
                    "fps": fps,
                    "samples": samples,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "video".cyan().bold(), input.display());
                println!("  duration: {:.3}s", info.duration_seconds);
                println!("  size:     {}x{}", info.natural_width, info.natural_height);
                println!("  codec:    {}", info.codec);
                match samples {
                    Some(count) => println!("  samples:  {count} at {fps} fps"),
                    None => println!("  samples:  unavailable"),
                }
            }
        }
        Commands::Sample {
            inputs,
            fps,
            seek_timeout,
            media_type,
            width,
            height,
            pixel_format,
            jpeg_quality,
            progress,
            json,
        } => {
            let blobs = inputs.iter().map(|path| match &media_type {
                Some(declared) => MediaBlob::with_media_type(path, declared.as_str()),
                None => MediaBlob::from_path(path),
            });
            let blob = select_video(blobs)?;

            let mut output = FrameOutputOptions::default().with_resolution(width, height);
            if let Some(pixel_str) = &pixel_format {
                let pixel = parse_pixel_format(pixel_str)
                    .ok_or(format!("unsupported --pixel-format: {pixel_str}"))?;
                output = output.with_pixel_format(pixel);
            }

            let mut options = SamplerOptions::new()
                .with_fps(fps)
                .with_seek_timeout(parse_timecode(&seek_timeout)?);
            if let Some(quality) = jpeg_quality {
                options = options.with_image_encoding(ImageEncoding::Jpeg { quality });
            }

            let bar = if progress {
                let bar = ProgressBar::new(0);
                let style =
                    ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
                bar.set_style(style.progress_chars("##-"));
                options = options.with_progress(Arc::new(TerminalProgress { bar: bar.clone() }));
                Some(bar)
            } else {
                None
            };

            let sampler = FrameSampler::new(FfmpegSource::with_output(output), options);
            let (result, ()) = tokio::join!(
                sampler.start(blob),
                render_filmstrip(&sampler, bar.as_ref(), json)
            );

            if let Some(bar) = &bar {
                bar.finish_and_clear();
            }

            let summary = result.map_err(|error| format!("could not process this video: {error}"))?;

            if json {
                let frames: Vec<_> = sampler
                    .frames()
                    .iter()
                    .map(|frame| {
                        json!({
                            "index": frame.index(),
                            "timestamp_seconds": frame.timestamp().as_secs_f64(),
                            "width": frame.width(),
                            "height": frame.height(),
                            "media_type": frame.encoding().media_type(),
                            "bytes": frame.image_data().len(),
                        })
                    })
                    .collect();
                let payload = json!({
                    "video": {
                        "duration_seconds": summary.info.duration_seconds,
                        "width": summary.info.natural_width,
                        "height": summary.info.natural_height,
                        "codec": summary.info.codec,
                    },
                    "fps": fps,
                    "attempted": summary.attempted,
                    "captured": summary.captured,
                    "skipped": summary.skipped,
                    "elapsed_seconds": summary.elapsed.as_secs_f64(),
                    "frames": frames,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} frames captured, {} skipped ({} timestamps) in {:.2}s",
                    "done".green().bold(),
                    summary.captured,
                    summary.skipped,
                    summary.attempted,
                    summary.elapsed.as_secs_f64(),
                );
                if summary.skipped > 0 {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("{} timestamps could not be decoded", summary.skipped).yellow()
                    );
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "filmstrip", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
