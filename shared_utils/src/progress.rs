//! Progress Bar Module
//!
//! Unified bar style: ████████▓░░░░░░
//!
//! The batch bar runs on a per-mille scale so fractional overall progress
//! (file N of M plus the current file's percent) maps directly onto it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub mod progress_style {
    /// indicatif takes three characters: filled, current, empty
    pub const PROGRESS_CHARS: &str = "█▓░";

    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

    pub const BATCH_TEMPLATE: &str =
        "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • ⏱️ {elapsed_precise} • {msg}";
}

/// Positions on the bar; one unit is a tenth of a percent.
pub const PROGRESS_SCALE: u64 = 1000;

pub fn create_progress_bar(prefix: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(PROGRESS_SCALE);

    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    let style = ProgressStyle::default_bar()
        .template(progress_style::BATCH_TEMPLATE)
        .map(|s| {
            s.progress_chars(progress_style::PROGRESS_CHARS)
                .tick_chars(progress_style::SPINNER_CHARS)
        })
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Map a `0.0..=1.0` fraction onto the bar scale.
pub fn fraction_to_position(fraction: f64) -> u64 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * PROGRESS_SCALE as f64).round() as u64
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_to_position() {
        assert_eq!(fraction_to_position(0.0), 0);
        assert_eq!(fraction_to_position(0.5), 500);
        assert_eq!(fraction_to_position(1.0), PROGRESS_SCALE);
        assert_eq!(fraction_to_position(1.7), PROGRESS_SCALE);
        assert_eq!(fraction_to_position(-0.2), 0);
        assert_eq!(fraction_to_position(f64::NAN), 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let pb = create_progress_bar("Test", true);
        pb.set_position(fraction_to_position(0.25));
        assert_eq!(pb.position(), 250);
        pb.finish_and_clear();
    }
}
