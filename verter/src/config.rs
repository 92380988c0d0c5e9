use serde::{Deserialize, Serialize};
use shared_utils::batch::OUTPUT_DIR_NAME;
use shared_utils::tools::ToolsConfig;
use std::path::PathBuf;

/// Converter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Subdirectory of each input's directory that receives the output.
    pub output_dir_name: String,
    /// Appended to the input stem.
    pub output_suffix: String,
    pub target_extension: String,
    /// Replace an existing output file instead of failing.
    pub overwrite: bool,
    /// Record a failed file and continue instead of aborting the batch.
    pub keep_going: bool,
    /// Descend into subdirectories when an input is a directory.
    pub recursive: bool,
    pub ffmpeg_dir: Option<PathBuf>,
    pub allow_download: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            output_dir_name: OUTPUT_DIR_NAME.to_string(),
            output_suffix: "_converted".to_string(),
            target_extension: "mp4".to_string(),
            overwrite: true,
            keep_going: false,
            recursive: false,
            ffmpeg_dir: None,
            allow_download: true,
        }
    }
}

impl ConverterConfig {
    pub fn tools_config(&self) -> ToolsConfig {
        ToolsConfig {
            ffmpeg_dir: self.ffmpeg_dir.clone(),
            allow_download: self.allow_download,
        }
    }
}
