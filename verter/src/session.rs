//! Conversion session state.
//!
//! Holds the current file selection, status line, overall progress and which
//! actions are available. The binary drives it from batch events so the
//! status texts and control states stay in one place.

use crate::batch_runner::{overall_progress, BatchEvent};
use shared_utils::batch::BatchResult;
use shared_utils::cancel::CancellationToken;
use shared_utils::video_formats::validate_video_path;
use shared_utils::{Result, VerterError};
use std::path::PathBuf;
use tracing::{info, warn};

pub const NO_SELECTION_LABEL: &str = "No file selected.";

/// Which actions are currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub pick: bool,
    pub convert: bool,
    pub cancel: bool,
    pub clear: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            pick: true,
            convert: false,
            cancel: false,
            clear: true,
        }
    }
}

/// Messages delivered to the thread that owns the session.
#[derive(Debug)]
pub enum SessionEvent {
    Batch(BatchEvent),
    CancelRequested,
    Finished(Result<BatchResult>),
}

#[derive(Debug)]
pub struct Session {
    inputs: Vec<PathBuf>,
    status: String,
    selection_label: String,
    progress: f64,
    is_error: bool,
    controls: Controls,
    token: Option<CancellationToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            status: String::new(),
            selection_label: NO_SELECTION_LABEL.to_string(),
            progress: 0.0,
            is_error: false,
            controls: Controls::default(),
            token: None,
        }
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn selection_label(&self) -> &str {
        &self.selection_label
    }

    /// Overall fraction in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn is_running(&self) -> bool {
        self.token.is_some()
    }

    /// Replace the selection with the supported files among `paths`.
    ///
    /// Returns the rejected paths with the reason. When nothing is accepted
    /// the previous selection is kept. Ignored while a run is active.
    pub fn pick(&mut self, paths: Vec<PathBuf>) -> Vec<(PathBuf, VerterError)> {
        if !self.controls.pick {
            warn!("Selection is locked while converting");
            return Vec::new();
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for path in paths {
            match validate_video_path(&path) {
                Ok(()) => accepted.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping selection");
                    rejected.push((path, e));
                }
            }
        }

        if !accepted.is_empty() {
            self.selection_label = format!("Selected {} file(s)", accepted.len());
            self.inputs = accepted;
            self.controls.convert = true;
            info!("{}", self.selection_label);
        }

        rejected
    }

    /// Start a run over the current selection and return its token.
    pub fn begin(&mut self) -> Result<CancellationToken> {
        if self.inputs.is_empty() {
            return Err(VerterError::NoInputFiles);
        }

        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.status = "Converting...".to_string();
        self.is_error = false;
        self.progress = 0.0;
        self.controls.pick = false;
        self.controls.convert = false;
        self.controls.clear = false;
        self.controls.cancel = true;
        Ok(token)
    }

    pub fn apply(&mut self, event: &BatchEvent) {
        if let BatchEvent::Progress {
            completed,
            total,
            name,
            percent,
        } = event
        {
            self.progress = overall_progress(*completed, *percent, *total);
            self.status = format!("Converting {}: {:.0}%", name, percent.clamp(0.0, 100.0));
        }
    }

    pub fn finish(&mut self, outcome: &Result<BatchResult>) {
        match outcome {
            Ok(result) if result.cancelled => {
                self.status = "Conversion canceled.".to_string();
                self.progress = 1.0;
            }
            Ok(_) => {
                self.status = "All files converted!".to_string();
                self.progress = 1.0;
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.is_error = true;
            }
        }

        self.token = None;
        self.controls.pick = true;
        self.controls.convert = true;
        self.controls.clear = true;
        self.controls.cancel = false;
    }

    /// Request cancellation of the running batch. No-op when idle.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.token {
            token.cancel();
            self.status = "Canceling...".to_string();
        }
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.status = "Cleared file list.".to_string();
        self.selection_label = NO_SELECTION_LABEL.to_string();
        self.progress = 0.0;
        self.is_error = false;
        self.controls.convert = false;
        self.controls.clear = false;
    }

    pub fn handle(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Batch(e) => self.apply(e),
            SessionEvent::CancelRequested => self.cancel(),
            SessionEvent::Finished(outcome) => self.finish(outcome),
        }
    }
}
