//! verter - Batch video to MP4 conversion
//!
//! Converts a selection of video files to MP4 with FFmpeg, one file at a
//! time, with overall progress and cooperative cancellation:
//! - every video and audio stream of the source is mapped into the output
//! - outputs land in `<input-dir>/output/<stem>_converted.mp4`
//! - FFmpeg is located on the system or downloaded on first use
//!
//! ## Example
//! ```rust,ignore
//! use verter::{run_batch, ConverterConfig, FfmpegTranscoder};
//! use shared_utils::{ensure_ffmpeg, CancellationToken};
//!
//! let config = ConverterConfig::default();
//! let tools = ensure_ffmpeg(&config.tools_config())?;
//! let transcoder = FfmpegTranscoder::new(tools);
//! let result = run_batch(&inputs, &config, &transcoder, &CancellationToken::new(), |_| {})?;
//! ```

pub mod batch_runner;
pub mod config;
pub mod conversion_api;
pub mod session;

// Re-exports
pub use batch_runner::{overall_progress, run_batch, BatchEvent};
pub use config::ConverterConfig;
pub use conversion_api::{
    describe, output_path_for, ConversionJob, FfmpegTranscoder, TranscodeOutcome, Transcoder,
};
pub use session::{Controls, Session, SessionEvent};

pub use shared_utils::errors::{Result, VerterError};
