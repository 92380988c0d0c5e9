//! Shared Utilities for the verter converter
//!
//! Media plumbing used by the conversion tool:
//! - FFprobe wrapper for media info
//! - FFmpeg process management with progress parsing and cancellation
//! - FFmpeg discovery and first-use download
//! - Cooperative cancellation token
//! - Batch file collection and result counters
//! - Progress bar, summary report and logging setup

pub mod batch;
pub mod cancel;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod logging;
pub mod progress;
pub mod report;
pub mod tools;
pub mod video_formats;

pub use batch::{collect_files, BatchResult, OUTPUT_DIR_NAME};
pub use cancel::{install_interrupt_handler, CancellationToken};
pub use errors::{Result, VerterError};
pub use ffmpeg_process::{format_ffmpeg_error, FfmpegProcess, FfmpegProgressParser, ProcessExit};
pub use ffprobe::{parse_probe_output, probe_media, MediaInfo, StreamInfo, StreamKind};
pub use progress::{create_progress_bar, format_bytes, format_duration, fraction_to_position};
pub use report::{print_simple_summary, print_summary_report};
pub use tools::{ensure_ffmpeg, FfmpegTools, ToolsConfig};
pub use video_formats::{is_supported_video, validate_video_path, SUPPORTED_VIDEO_EXTENSIONS};
