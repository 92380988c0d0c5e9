//! Batch Processing Module
//!
//! File collection for directory inputs and the per-batch result counters.

use crate::video_formats::has_extension;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory name that converted files are written into. Collection skips it
/// so a second run does not pick up the previous run's outputs.
pub const OUTPUT_DIR_NAME: &str = "output";

pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_output_dir(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect();

    files.sort();
    files
}

fn is_output_dir(path: &Path) -> bool {
    path.is_dir() && path.file_name() == Some(OsStr::new(OUTPUT_DIR_NAME))
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            input_bytes: 0,
            output_bytes: 0,
            cancelled: false,
        }
    }

    pub fn success(&mut self, input_size: u64, output_size: u64) {
        self.total += 1;
        self.succeeded += 1;
        self.input_bytes += input_size;
        self.output_bytes += output_size;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip_many(&mut self, count: usize) {
        self.total += count;
        self.skipped += count;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}
