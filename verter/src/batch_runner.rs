//! Sequential batch loop.
//!
//! Converts the selected files one at a time, reporting progress as
//! `BatchEvent`s. The cancellation token is checked before each file starts
//! and is handed to the transcoder so the running FFmpeg is stopped too.

use crate::config::ConverterConfig;
use crate::conversion_api::{
    colliding_outputs, prepare_output, ConversionJob, TranscodeOutcome, Transcoder,
};
use shared_utils::batch::BatchResult;
use shared_utils::cancel::CancellationToken;
use shared_utils::video_formats::validate_video_path;
use shared_utils::Result;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    FileStarted {
        index: usize,
        total: usize,
        name: String,
    },
    Progress {
        completed: usize,
        total: usize,
        name: String,
        percent: f64,
    },
    FileFinished {
        name: String,
        output: PathBuf,
    },
    FileFailed {
        name: String,
        message: String,
    },
}

/// Overall batch fraction: finished files plus the current file's share.
pub fn overall_progress(completed: usize, current_percent: f64, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = if current_percent.is_finite() {
        current_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    ((completed as f64 + percent / 100.0) / total as f64).clamp(0.0, 1.0)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Probe, plan and run one file.
fn convert_one(
    input: &Path,
    config: &ConverterConfig,
    transcoder: &dyn Transcoder,
    token: &CancellationToken,
    on_percent: &mut dyn FnMut(f64),
) -> Result<(ConversionJob, TranscodeOutcome)> {
    validate_video_path(input)?;
    let media = transcoder.probe(input)?;
    let job = ConversionJob::from_media(input, &media, config)?;
    prepare_output(&job)?;
    let outcome = transcoder.transcode(&job, token, on_percent)?;
    Ok((job, outcome))
}

/// Convert `inputs` in order.
///
/// Without `keep_going` the first failure ends the batch and is returned.
/// A cancelled batch returns `Ok` with `cancelled` set; files never started
/// count as skipped. A failure seen after the token tripped is treated as
/// the cancellation, since the tools die on the same interrupt.
pub fn run_batch(
    inputs: &[PathBuf],
    config: &ConverterConfig,
    transcoder: &dyn Transcoder,
    token: &CancellationToken,
    mut on_event: impl FnMut(BatchEvent),
) -> Result<BatchResult> {
    let total = inputs.len();
    let mut result = BatchResult::new();

    for output in colliding_outputs(inputs, config) {
        warn!(
            output = %output.display(),
            "Several inputs map to the same output, later files overwrite earlier ones"
        );
    }

    for (completed, input) in inputs.iter().enumerate() {
        if token.is_cancelled() {
            info!(remaining = total - completed, "Batch cancelled before next file");
            result.mark_cancelled();
            result.skip_many(total - completed);
            break;
        }

        let name = display_name(input);
        info!(file = %name, "[{}/{}] Converting", completed + 1, total);
        on_event(BatchEvent::FileStarted {
            index: completed,
            total,
            name: name.clone(),
        });

        let mut on_percent = |percent: f64| {
            on_event(BatchEvent::Progress {
                completed,
                total,
                name: name.clone(),
                percent,
            });
        };

        match convert_one(input, config, transcoder, token, &mut on_percent) {
            Ok((job, TranscodeOutcome::Completed { output_size })) => {
                info!("✅ Finished: {}", job.output.display());
                result.success(job.input_size, output_size);
                on_event(BatchEvent::FileFinished {
                    name,
                    output: job.output,
                });
            }
            Ok((_, TranscodeOutcome::Cancelled)) => {
                warn!(file = %name, "Conversion interrupted");
                result.mark_cancelled();
                result.skip_many(total - completed);
                break;
            }
            Err(e) if token.is_cancelled() => {
                warn!(file = %name, error = %e, "Conversion interrupted");
                result.mark_cancelled();
                result.skip_many(total - completed);
                break;
            }
            Err(e) => {
                error!(file = %name, error = %e, "Conversion failed");
                if !config.keep_going {
                    return Err(e);
                }
                on_event(BatchEvent::FileFailed {
                    name,
                    message: e.to_string(),
                });
                result.fail(input.clone(), e.to_string());
            }
        }
    }

    Ok(result)
}
