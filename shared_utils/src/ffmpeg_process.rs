//! FFmpeg 进程管理模块
//!
//! FFmpeg is started with `-progress pipe:1`, so stdout carries `key=value`
//! progress records and stderr carries the human log. Both pipes are drained
//! on their own threads: a full stderr buffer would otherwise block FFmpeg
//! while we wait on stdout.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::{FfmpegProcess, FfmpegProgressParser};
//! use std::process::Command;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.args(["-i", "input.mov", "-progress", "pipe:1", "-nostats", "output.mp4"]);
//!
//! let process = FfmpegProcess::spawn(&mut cmd, "input.mov")?;
//! let mut parser = FfmpegProgressParser::with_duration(120.0);
//! let exit = process.wait_with_progress(&token, &mut parser, &mut |fraction| {
//!     println!("{:.0}%", fraction * 100.0);
//! })?;
//! ```

use crate::cancel::CancellationToken;
use crate::errors::{Result, VerterError};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the wait loop wakes up to look at the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// stderr lines kept for the error message.
const STDERR_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Completed,
    Cancelled,
}

/// Start the child in its own process group so a terminal Ctrl-C reaches
/// only us; the child is stopped through the cancellation token instead.
pub fn detach_from_terminal(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

pub struct FfmpegProcess {
    child: Child,
    progress_rx: Receiver<String>,
    stdout_thread: Option<JoinHandle<()>>,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    /// Spawn `cmd` with both pipes captured. Every stderr line is logged at
    /// DEBUG with `label` as the `file` field.
    pub fn spawn(cmd: &mut Command, label: &str) -> Result<Self> {
        let command_str = format!("{:?}", cmd);
        info!(command = %command_str, "Executing FFmpeg command");

        detach_from_terminal(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VerterError::ToolNotFound(cmd.get_program().to_string_lossy().to_string())
            } else {
                VerterError::IoError(e)
            }
        })?;

        let stderr = child.stderr.take().ok_or_else(|| VerterError::FFmpegError {
            message: "Failed to capture FFmpeg stderr".to_string(),
            exit_code: None,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| VerterError::FFmpegError {
            message: "Failed to capture FFmpeg stdout".to_string(),
            exit_code: None,
        })?;

        let stderr_label = label.to_string();
        let stderr_thread = thread::spawn(move || {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(|l| l.ok()) {
                debug!(file = %stderr_label, "[ffmpeg] {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let (tx, progress_rx) = mpsc::channel();
        let stdout_thread = thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(|l| l.ok()) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            progress_rx,
            stdout_thread: Some(stdout_thread),
            stderr_thread: Some(stderr_thread),
        })
    }

    /// Drive the process to completion.
    ///
    /// Progress fractions from `parser` go to `on_progress`. When `token` is
    /// cancelled the process is killed and `ProcessExit::Cancelled` returned.
    /// A non-zero exit becomes `VerterError::FFmpegError`.
    pub fn wait_with_progress(
        mut self,
        token: &CancellationToken,
        parser: &mut FfmpegProgressParser,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<ProcessExit> {
        loop {
            if token.is_cancelled() {
                warn!("Cancellation requested, stopping FFmpeg");
                self.kill_and_reap();
                return Ok(ProcessExit::Cancelled);
            }

            match self.progress_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(line) => {
                    if let Some(fraction) = parser.parse_line(&line) {
                        on_progress(fraction);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = self.child.wait()?;
        if let Some(t) = self.stdout_thread.take() {
            let _ = t.join();
        }
        let stderr = self.take_stderr();

        if status.success() {
            if !parser.is_finished() {
                on_progress(1.0);
            }
            info!(
                exit_code = status.code(),
                out_time = parser.current_time(),
                "FFmpeg process completed successfully"
            );
            Ok(ProcessExit::Completed)
        } else if token.is_cancelled() {
            Ok(ProcessExit::Cancelled)
        } else {
            error!(
                exit_code = status.code(),
                stderr_output = %stderr,
                "FFmpeg process failed"
            );
            Err(VerterError::FFmpegError {
                message: format_ffmpeg_error(&stderr),
                exit_code: status.code(),
            })
        }
    }

    fn take_stderr(&mut self) -> String {
        self.stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default()
    }

    fn kill_and_reap(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(error = %e, "Failed to kill FFmpeg process");
        }
        let _ = self.child.wait();
        if let Some(t) = self.stdout_thread.take() {
            let _ = t.join();
        }
        let _ = self.take_stderr();
    }
}

/// FFmpeg 进度解析器
///
/// Reads the `-progress` record format (`out_time_us=`, `out_time_ms=`,
/// `out_time=`, `progress=end`) and the classic `time=` stats key.
/// Fractions are clamped to `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct FfmpegProgressParser {
    total_duration: f64,
    current_time: f64,
    finished: bool,
}

impl FfmpegProgressParser {
    /// `total_duration` in seconds; with 0.0 only `progress=end` yields a
    /// fraction.
    pub fn with_duration(total_duration: f64) -> Self {
        Self {
            total_duration,
            current_time: 0.0,
            finished: false,
        }
    }

    pub fn parse_line(&mut self, line: &str) -> Option<f64> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            // out_time_ms is microseconds as well
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current_time = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "out_time" | "time" => {
                if let Some(time) = Self::parse_time(value) {
                    self.current_time = time;
                }
            }
            "progress" if value == "end" => {
                self.finished = true;
            }
            _ => {}
        }

        self.calculate_progress()
    }

    /// `HH:MM:SS.micro`
    fn parse_time(time_str: &str) -> Option<f64> {
        let parts: Vec<&str> = time_str.split(':').collect();
        if parts.len() != 3 {
            return None;
        }

        let hours: f64 = parts[0].parse().ok()?;
        let minutes: f64 = parts[1].parse().ok()?;
        let seconds: f64 = parts[2].parse().ok()?;

        let total = hours * 3600.0 + minutes * 60.0 + seconds;
        (total >= 0.0).then_some(total)
    }

    fn calculate_progress(&self) -> Option<f64> {
        if self.finished {
            return Some(1.0);
        }

        let total = self.total_duration;
        if total.is_finite() && total > 0.0 && self.current_time > 0.0 {
            return Some((self.current_time / total).clamp(0.0, 1.0));
        }

        None
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Pick the most meaningful line from FFmpeg stderr.
///
/// Prefers the last line mentioning an error, then the last non-progress
/// line, then a fixed fallback.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ffmpeg_error_with_error_line() {
        let stderr = r#"
frame=  100 fps=25.0 q=28.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s
[libx264 @ 0x7f8b8c000000] Error: invalid parameter
"#;
        let error = format_ffmpeg_error(stderr);
        assert!(error.contains("Error"));
        assert!(error.contains("invalid parameter"));
    }

    #[test]
    fn test_format_ffmpeg_error_no_error_line() {
        let stderr = r#"
frame=  100 fps=25.0 q=28.0 size=    1024kB time=00:00:04.00
Conversion failed!
"#;
        assert_eq!(format_ffmpeg_error(stderr), "Conversion failed!");
    }

    #[test]
    fn test_format_ffmpeg_error_empty() {
        assert_eq!(format_ffmpeg_error(""), "Unknown FFmpeg error");
    }

    #[test]
    fn test_progress_parser_classic_time_key() {
        let mut parser = FfmpegProgressParser::with_duration(8.0);
        assert_eq!(parser.parse_line("time=00:00:02.00"), Some(0.25));
    }

    #[test]
    fn test_progress_parser_out_time_us() {
        let mut parser = FfmpegProgressParser::with_duration(120.0);
        assert_eq!(parser.parse_line("out_time_us=30000000"), Some(0.25));
        assert_eq!(parser.parse_line("out_time_ms=60000000"), Some(0.5));
    }

    #[test]
    fn test_progress_parser_out_time_clock() {
        let mut parser = FfmpegProgressParser::with_duration(120.0);
        assert_eq!(parser.parse_line("out_time=00:01:00.000000"), Some(0.5));
        assert!((parser.current_time() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_progress_parser_negative_start_time() {
        // before the first packet ffmpeg reports a negative out_time_us
        let mut parser = FfmpegProgressParser::with_duration(10.0);
        assert_eq!(parser.parse_line("out_time_us=-9223372036854775807"), None);
        assert_eq!(parser.parse_line("out_time=-577014:32:22.775807"), None);
    }

    #[test]
    fn test_progress_parser_clamps_overshoot() {
        let mut parser = FfmpegProgressParser::with_duration(10.0);
        assert_eq!(parser.parse_line("out_time_us=10500000"), Some(1.0));
    }

    #[test]
    fn test_progress_parser_end_marker() {
        let mut parser = FfmpegProgressParser::with_duration(0.0);
        assert_eq!(parser.parse_line("progress=continue"), None);
        assert_eq!(parser.parse_line("progress=end"), Some(1.0));
        assert!(parser.is_finished());
    }

    #[test]
    fn test_progress_parser_ignores_stats_keys() {
        let mut parser = FfmpegProgressParser::with_duration(10.0);
        assert_eq!(parser.parse_line("frame=250"), None);
        assert_eq!(parser.parse_line("fps=29.97"), None);
        assert_eq!(parser.parse_line("speed=1.52x"), None);
        assert_eq!(parser.current_time(), 0.0);
    }

    #[test]
    fn test_progress_parser_ignores_noise() {
        let mut parser = FfmpegProgressParser::with_duration(10.0);
        assert_eq!(parser.parse_line(""), None);
        assert_eq!(parser.parse_line("bitrate=N/A"), None);
        assert_eq!(parser.parse_line("speed=N/A"), None);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_progress_parser_time_accuracy(
            micros in 1i64..100_000_000,
            total_duration in 100.0f64..1000.0
        ) {
            let mut parser = FfmpegProgressParser::with_duration(total_duration);
            let progress = parser.parse_line(&format!("out_time_us={}", micros));

            let expected = micros as f64 / 1_000_000.0 / total_duration;
            prop_assert!(progress.is_some());
            prop_assert!((progress.unwrap() - expected).abs() < 0.001);
        }

        #[test]
        fn prop_progress_fraction_in_unit_range(
            micros in -1_000_000_000i64..1_000_000_000_000i64,
            total_duration in 0.001f64..86400.0
        ) {
            let mut parser = FfmpegProgressParser::with_duration(total_duration);
            if let Some(fraction) = parser.parse_line(&format!("out_time_us={}", micros)) {
                prop_assert!((0.0..=1.0).contains(&fraction));
            }
        }

        #[test]
        fn prop_format_error_non_empty(content in "[a-zA-Z0-9 ]{1,100}") {
            prop_assert!(!format_ffmpeg_error(&content).is_empty());
        }
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn test_progress_lines_reach_callback() {
        let mut cmd = sh("echo out_time_us=500000; echo progress=end");
        let process = FfmpegProcess::spawn(&mut cmd, "clip.mov").unwrap();
        let mut parser = FfmpegProgressParser::with_duration(1.0);
        let mut fractions = Vec::new();

        let exit = process
            .wait_with_progress(&CancellationToken::new(), &mut parser, &mut |f| {
                fractions.push(f)
            })
            .unwrap();

        assert_eq!(exit, ProcessExit::Completed);
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn test_success_without_end_marker_reports_full_progress() {
        let mut cmd = sh("exit 0");
        let process = FfmpegProcess::spawn(&mut cmd, "clip.mov").unwrap();
        let mut parser = FfmpegProgressParser::with_duration(0.0);
        let mut last = None;

        process
            .wait_with_progress(&CancellationToken::new(), &mut parser, &mut |f| {
                last = Some(f)
            })
            .unwrap();

        assert_eq!(last, Some(1.0));
    }

    #[test]
    fn test_cancel_kills_running_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let process = FfmpegProcess::spawn(&mut cmd, "long.mov").unwrap();
        let token = CancellationToken::new();
        let trip = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trip.cancel();
        });

        let started = Instant::now();
        let mut parser = FfmpegProgressParser::with_duration(5.0);
        let exit = process
            .wait_with_progress(&token, &mut parser, &mut |_| {})
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(exit, ProcessExit::Cancelled);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "process should be killed promptly, took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_cancelled_token_wins_over_failing_exit() {
        let mut cmd = sh("echo out_time_us=100000; exit 4");
        let process = FfmpegProcess::spawn(&mut cmd, "clip.mov").unwrap();
        let token = CancellationToken::new();
        let trip = token.clone();
        let mut parser = FfmpegProgressParser::with_duration(1.0);

        let exit = process
            .wait_with_progress(&token, &mut parser, &mut |_| trip.cancel())
            .unwrap();

        assert_eq!(exit, ProcessExit::Cancelled);
    }

    #[test]
    fn test_nonzero_exit_carries_stderr_tail() {
        let mut cmd = sh("echo frame=1 >&2; echo boom error >&2; exit 3");
        let process = FfmpegProcess::spawn(&mut cmd, "broken.avi").unwrap();
        let mut parser = FfmpegProgressParser::with_duration(1.0);

        let err = process
            .wait_with_progress(&CancellationToken::new(), &mut parser, &mut |_| {})
            .unwrap_err();

        match err {
            VerterError::FFmpegError { message, exit_code } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("error"), "unexpected message: {}", message);
            }
            other => panic!("expected FFmpegError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_binary_is_tool_not_found() {
        let mut cmd = Command::new("/nonexistent/bin/ffmpeg-verter");
        let result = FfmpegProcess::spawn(&mut cmd, "clip.mov");
        assert!(matches!(result, Err(VerterError::ToolNotFound(_))));
    }

    #[test]
    fn test_child_runs_in_own_process_group() {
        let mut cmd = sh("ps -o pgid= -p $$; ps -o pgid= -p $PPID");
        detach_from_terminal(&mut cmd);
        let output = cmd.output().unwrap();
        let groups: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if groups.len() == 2 {
            assert_ne!(groups[0], groups[1]);
        }
    }
}
