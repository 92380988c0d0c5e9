use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerterError {
    #[error("Video format not supported: {} (extension: {extension})", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No video files selected")]
    NoInputFiles,

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("FFprobe failed: {0}")]
    FFprobeError(String),

    #[error("Failed to parse ffprobe output: {0}")]
    ProbeParseError(String),

    #[error("No video or audio streams in {}", .0.display())]
    NoStreams(PathBuf),

    #[error("FFmpeg failed (exit code {exit_code:?}): {message}")]
    FFmpegError {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Output exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Unsupported platform for FFmpeg download: {0}")]
    UnsupportedPlatform(String),

    #[error("FFmpeg download failed: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, VerterError>;
