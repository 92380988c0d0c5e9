//! Video Conversion API Module
//!
//! Builds a conversion job from probed media info and runs it through a
//! `Transcoder`. The job maps every video stream and then every audio stream
//! of the source into an MP4 next to it:
//! `<input-dir>/output/<stem>_converted.mp4`.

use crate::config::ConverterConfig;
use serde::Serialize;
use shared_utils::cancel::CancellationToken;
use shared_utils::ffmpeg_process::{FfmpegProcess, FfmpegProgressParser, ProcessExit};
use shared_utils::ffprobe::{probe_media, MediaInfo};
use shared_utils::tools::FfmpegTools;
use shared_utils::{Result, VerterError};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub fn output_path_for(input: &Path, config: &ConverterConfig) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| VerterError::InvalidPath(input.to_path_buf()))?;
    let parent = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut name = stem.to_os_string();
    name.push(&config.output_suffix);
    name.push(".");
    name.push(&config.target_extension);

    Ok(parent.join(&config.output_dir_name).join(name))
}

/// Outputs that more than one of `inputs` would be written to, in first
/// collision order.
pub fn colliding_outputs(inputs: &[PathBuf], config: &ConverterConfig) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut colliding = Vec::new();
    for output in inputs.iter().filter_map(|i| output_path_for(i, config).ok()) {
        if !seen.insert(output.clone()) && !colliding.contains(&output) {
            colliding.push(output);
        }
    }
    colliding
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Source stream indices in mapping order: video first, then audio.
    pub stream_indices: Vec<usize>,
    pub overwrite: bool,
    /// Source duration in seconds, 0.0 when unknown.
    pub duration: f64,
    pub input_size: u64,
}

impl ConversionJob {
    pub fn from_media(input: &Path, media: &MediaInfo, config: &ConverterConfig) -> Result<Self> {
        let stream_indices: Vec<usize> = media
            .video_streams()
            .chain(media.audio_streams())
            .map(|s| s.index)
            .collect();

        if stream_indices.is_empty() {
            return Err(VerterError::NoStreams(input.to_path_buf()));
        }

        let input_size = fs::metadata(input)
            .map(|m| m.len())
            .unwrap_or(media.size);

        Ok(Self {
            input: input.to_path_buf(),
            output: output_path_for(input, config)?,
            stream_indices,
            overwrite: config.overwrite,
            duration: media.duration,
            input_size,
        })
    }

    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(if self.overwrite { "-y" } else { "-n" }.into());
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());
        for index in &self.stream_indices {
            args.push("-map".into());
            args.push(format!("0:{}", index).into());
        }
        args.extend(["-progress", "pipe:1", "-nostats"].iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());
        args
    }

    pub fn label(&self) -> String {
        self.input
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// Create the output directory and enforce the overwrite policy.
pub fn prepare_output(job: &ConversionJob) -> Result<()> {
    if let Some(dir) = job.output.parent() {
        fs::create_dir_all(dir)?;
    }
    if !job.overwrite && job.output.exists() {
        return Err(VerterError::OutputExists(job.output.clone()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed { output_size: u64 },
    Cancelled,
}

/// Media backend used by the batch loop.
pub trait Transcoder {
    fn probe(&self, input: &Path) -> Result<MediaInfo>;

    /// Run `job`. `on_percent` receives the current file's progress in
    /// `0.0..=100.0`.
    fn transcode(
        &self,
        job: &ConversionJob,
        token: &CancellationToken,
        on_percent: &mut dyn FnMut(f64),
    ) -> Result<TranscodeOutcome>;
}

pub struct FfmpegTranscoder {
    tools: FfmpegTools,
}

impl FfmpegTranscoder {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn probe(&self, input: &Path) -> Result<MediaInfo> {
        probe_media(&self.tools.ffprobe, input)
    }

    fn transcode(
        &self,
        job: &ConversionJob,
        token: &CancellationToken,
        on_percent: &mut dyn FnMut(f64),
    ) -> Result<TranscodeOutcome> {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(job.ffmpeg_args());

        let process = FfmpegProcess::spawn(&mut cmd, &job.label())?;
        let mut parser = FfmpegProgressParser::with_duration(job.duration);
        let exit = process.wait_with_progress(token, &mut parser, &mut |fraction| {
            on_percent(fraction * 100.0)
        })?;

        match exit {
            ProcessExit::Completed => {
                let output_size = fs::metadata(&job.output)?.len();
                Ok(TranscodeOutcome::Completed { output_size })
            }
            ProcessExit::Cancelled => {
                discard_partial_output(&job.output);
                Ok(TranscodeOutcome::Cancelled)
            }
        }
    }
}

fn discard_partial_output(output: &Path) {
    if !output.exists() {
        return;
    }
    match fs::remove_file(output) {
        Ok(()) => debug!(output = %output.display(), "Removed partial output"),
        Err(e) => warn!(output = %output.display(), error = %e, "Could not remove partial output"),
    }
}

/// Probe `input` and build the job that would run for it.
pub fn describe(
    input: &Path,
    transcoder: &dyn Transcoder,
    config: &ConverterConfig,
) -> Result<(MediaInfo, ConversionJob)> {
    let media = transcoder.probe(input)?;
    let job = ConversionJob::from_media(input, &media, config)?;
    info!(input = %input.display(), output = %job.output.display(), "Planned conversion");
    Ok((media, job))
}
