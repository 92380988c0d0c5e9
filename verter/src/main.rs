use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

use shared_utils::batch::collect_files;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::progress::{create_progress_bar, format_bytes, format_duration, fraction_to_position};
use shared_utils::report::{print_simple_summary, print_summary_report};
use shared_utils::tools::{default_tools_dir, download_ffmpeg, ensure_ffmpeg, ToolsConfig};
use shared_utils::{install_interrupt_handler, MediaInfo, SUPPORTED_VIDEO_EXTENSIONS};
use verter::{
    describe, run_batch, BatchEvent, ConverterConfig, FfmpegTranscoder, Session, SessionEvent,
};

const UI_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "verter")]
#[command(version, about = "Batch video to MP4 converter", long_about = None)]
struct Cli {
    /// Show debug output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ToolArgs {
    /// Directory holding ffmpeg and ffprobe
    #[arg(long, env = "VERTER_FFMPEG_DIR", value_name = "DIR")]
    ffmpeg_dir: Option<PathBuf>,
    /// Never download FFmpeg automatically
    #[arg(long, env = "VERTER_NO_DOWNLOAD", value_parser = clap::builder::BoolishValueParser::new())]
    no_download: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert video files to MP4
    Convert {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
        /// Descend into subdirectories of directory inputs
        #[arg(short, long)]
        recursive: bool,
        /// Continue with the next file after a failure
        #[arg(long)]
        keep_going: bool,
        /// Fail when an output file already exists
        #[arg(long)]
        no_overwrite: bool,
        /// No progress bar, one-line summary
        #[arg(short, long)]
        quiet: bool,
        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Show media info and the conversion that would run
    Probe {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Locate FFmpeg, downloading it when missing
    InstallFfmpeg {
        /// Install into this directory instead of ~/.ffmpeg
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Download even when FFmpeg is already available
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let console_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    if let Err(e) = init_logging("verter", LogConfig::default().with_console_level(console_level)) {
        eprintln!("⚠️  Could not initialize logging: {}", e);
    }

    match cli.command {
        Commands::Convert {
            inputs,
            recursive,
            keep_going,
            no_overwrite,
            quiet,
            tools,
        } => {
            let config = ConverterConfig {
                overwrite: !no_overwrite,
                keep_going,
                recursive,
                ffmpeg_dir: tools.ffmpeg_dir,
                allow_download: !tools.no_download,
                ..Default::default()
            };

            let exit_code = run_convert(&inputs, config, quiet)?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }

        Commands::Probe { input, json, tools } => {
            let config = ConverterConfig {
                ffmpeg_dir: tools.ffmpeg_dir,
                allow_download: !tools.no_download,
                ..Default::default()
            };
            run_probe(&input, json, &config)?;
        }

        Commands::InstallFfmpeg { dir, force } => {
            let tools = if force {
                let dest = match dir.or_else(default_tools_dir) {
                    Some(dest) => dest,
                    None => bail!("Could not determine the home directory, pass --dir"),
                };
                download_ffmpeg(&dest)?
            } else {
                ensure_ffmpeg(&ToolsConfig {
                    ffmpeg_dir: dir,
                    allow_download: true,
                })?
            };
            println!("{} {}", style("✅ ffmpeg: ").green(), tools.ffmpeg.display());
            println!("{} {}", style("✅ ffprobe:").green(), tools.ffprobe.display());
        }
    }

    Ok(())
}

/// Expand directory arguments to the video files they contain.
fn expand_inputs(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = collect_files(input, SUPPORTED_VIDEO_EXTENSIONS, recursive);
            if found.is_empty() {
                warn!(dir = %input.display(), "No video files found");
            }
            files.extend(found);
        } else if input.exists() {
            files.push(input.clone());
        } else {
            eprintln!("{} {}", style("⚠️  Not found:").yellow(), input.display());
        }
    }
    files
}

fn run_convert(inputs: &[PathBuf], config: ConverterConfig, quiet: bool) -> anyhow::Result<i32> {
    let mut session = Session::new();
    for (_, reason) in session.pick(expand_inputs(inputs, config.recursive)) {
        eprintln!("{} {}", style("⚠️  Skipped:").yellow(), reason);
    }
    println!("{}", style(session.selection_label()).cyan());

    let token = session.begin()?;
    info!(files = session.inputs().len(), "Starting conversion");

    let (tx, rx) = mpsc::channel::<SessionEvent>();
    let interrupt_tx = tx.clone();
    install_interrupt_handler(move || {
        let _ = interrupt_tx.send(SessionEvent::CancelRequested);
    })?;

    let worker_inputs = session.inputs().to_vec();
    let worker = thread::Builder::new()
        .name("verter-batch".to_string())
        .spawn(move || {
            let outcome = ensure_ffmpeg(&config.tools_config()).and_then(|tools| {
                let transcoder = FfmpegTranscoder::new(tools);
                run_batch(&worker_inputs, &config, &transcoder, &token, |event| {
                    let _ = tx.send(SessionEvent::Batch(event));
                })
            });
            let _ = tx.send(SessionEvent::Finished(outcome));
        })
        .context("Failed to start conversion thread")?;

    let started = Instant::now();
    let pb = create_progress_bar("Converting", quiet);
    pb.set_message(session.status().to_string());

    let mut finished = None;
    loop {
        let event = match rx.recv_timeout(UI_POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) if !worker.is_finished() => continue,
            Err(_) => match rx.try_recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        session.handle(&event);
        pb.set_position(fraction_to_position(session.progress()));
        pb.set_message(session.status().to_string());

        match event {
            SessionEvent::Batch(BatchEvent::FileFinished { output, .. }) => {
                pb.println(format!("✅ Finished: {}", output.display()));
            }
            SessionEvent::Batch(BatchEvent::FileFailed { name, message }) => {
                pb.println(format!("{} {}: {}", style("❌").red(), name, message));
            }
            SessionEvent::Finished(outcome) => {
                finished = Some(outcome);
                break;
            }
            _ => {}
        }
    }
    pb.finish_and_clear();

    if worker.join().is_err() {
        warn!("Conversion thread panicked");
    }
    let outcome = match finished {
        Some(outcome) => outcome,
        None => bail!("Conversion thread stopped without reporting a result"),
    };

    match &outcome {
        Err(_) => eprintln!("{}", style(session.status()).red().bold()),
        Ok(result) if result.cancelled => println!("{}", style(session.status()).yellow()),
        Ok(_) => println!("{}", style(session.status()).green().bold()),
    }

    if let Ok(result) = &outcome {
        if quiet {
            print_simple_summary(result);
        } else {
            print_summary_report(result, started.elapsed(), "Conversion");
        }
    }

    Ok(if session.is_error() { 1 } else { 0 })
}

fn run_probe(input: &Path, json: bool, config: &ConverterConfig) -> anyhow::Result<()> {
    let tools = ensure_ffmpeg(&config.tools_config())?;
    let transcoder = FfmpegTranscoder::new(tools);
    let (media, job) = describe(input, &transcoder, config)?;

    if json {
        let report = serde_json::json!({ "media": media, "job": job });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_media_info(input, &media);
    let args: Vec<String> = job
        .ffmpeg_args()
        .iter()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    println!("{} {}", style("Output: ").cyan(), job.output.display());
    println!("{} ffmpeg {}", style("Command:").cyan(), args.join(" "));
    Ok(())
}

fn print_media_info(input: &Path, media: &MediaInfo) {
    let duration = if media.duration.is_finite() && media.duration > 0.0 {
        format_duration(Duration::from_secs_f64(media.duration))
    } else {
        "unknown".to_string()
    };

    println!("{}", style(input.display()).bold());
    println!("  Format:   {}", media.format_name);
    println!("  Duration: {}", duration);
    println!("  Size:     {}", format_bytes(media.size));

    for stream in &media.streams {
        let detail = match (stream.width, stream.height, stream.channels) {
            (Some(w), Some(h), _) => format!("{}x{}", w, h),
            (_, _, Some(ch)) => match stream.sample_rate {
                Some(rate) => format!("{} ch @ {} Hz", ch, rate),
                None => format!("{} ch", ch),
            },
            _ => String::new(),
        };
        let note = if stream.attached_pic { " (cover art)" } else { "" };
        println!(
            "  #{:<2} {:<9} {:<12} {}{}",
            stream.index,
            stream.kind.as_str(),
            stream.codec_name,
            detail,
            note
        );
    }
}
