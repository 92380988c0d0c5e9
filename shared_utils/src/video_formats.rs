//! Video extension whitelist
//!
//! The set of container extensions accepted as conversion input. Matching is
//! case-insensitive and ignores the leading dot.

use crate::errors::{Result, VerterError};
use std::path::Path;

pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "webm", "wmv", "flv", "mpg", "mpeg", "ts", "mts", "m2ts",
    "3gp", "3g2", "ogv", "vob",
];

/// Lower-cased extension of `path`, empty when there is none.
pub fn extension_lowercase(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = extension_lowercase(path);
    !ext.is_empty() && extensions.contains(&ext.as_str())
}

pub fn is_supported_video(path: &Path) -> bool {
    has_extension(path, SUPPORTED_VIDEO_EXTENSIONS)
}

pub fn validate_video_path(path: &Path) -> Result<()> {
    if is_supported_video(path) {
        Ok(())
    } else {
        Err(VerterError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: extension_lowercase(path),
        })
    }
}
