//! FFprobe wrapper module
//!
//! Media info for conversion planning: container duration and the stream
//! list in probe order.

use crate::errors::{Result, VerterError};
use crate::ffmpeg_process::detach_from_terminal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Other,
}

impl StreamKind {
    fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            "data" => StreamKind::Data,
            _ => StreamKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
            StreamKind::Data => "data",
            StreamKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    /// Cover art is reported as a video stream with this disposition.
    pub attached_pic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format_name: String,
    /// Seconds; 0.0 when the container does not report one.
    pub duration: f64,
    pub size: u64,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams
            .iter()
            .filter(|s| s.kind == StreamKind::Video && !s.attached_pic)
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Audio)
    }
}

pub fn probe_media(ffprobe: &Path, path: &Path) -> Result<MediaInfo> {
    if !path.exists() {
        return Err(VerterError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(VerterError::FFprobeError(format!(
            "Not a file (is it a directory?): {}",
            path.display()
        )));
    }

    debug!(file = %path.display(), "Probing media info");

    let mut cmd = Command::new(ffprobe);
    let output = detach_from_terminal(&mut cmd)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "--",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VerterError::ToolNotFound(ffprobe.display().to_string())
            } else {
                VerterError::IoError(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let error_msg = if stderr.trim().is_empty() {
            format!(
                "ffprobe failed to analyze file: {} (exit code: {:?})",
                path.display(),
                output.status.code()
            )
        } else {
            format!("ffprobe error for '{}': {}", path.display(), stderr.trim())
        };
        return Err(VerterError::FFprobeError(error_msg));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json_str: &str) -> Result<MediaInfo> {
    let json: Value =
        serde_json::from_str(json_str).map_err(|e| VerterError::ProbeParseError(e.to_string()))?;

    let format = &json["format"];
    let format_name = format["format_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();
    let duration = number_field(&format["duration"]).unwrap_or(0.0);
    let size = number_field(&format["size"]).map(|s| s as u64).unwrap_or(0);

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| VerterError::ProbeParseError("No streams found".to_string()))?;

    let streams = streams
        .iter()
        .enumerate()
        .map(|(position, s)| StreamInfo {
            index: s["index"].as_u64().map(|i| i as usize).unwrap_or(position),
            kind: StreamKind::from_codec_type(s["codec_type"].as_str().unwrap_or("")),
            codec_name: s["codec_name"].as_str().unwrap_or("unknown").to_string(),
            width: s["width"].as_u64().map(|w| w as u32),
            height: s["height"].as_u64().map(|h| h as u32),
            channels: s["channels"].as_u64().map(|c| c as u32),
            sample_rate: number_field(&s["sample_rate"]).map(|r| r as u32),
            attached_pic: s["disposition"]["attached_pic"].as_u64().unwrap_or(0) == 1,
        })
        .collect();

    Ok(MediaInfo {
        format_name,
        duration,
        size,
        streams,
    })
}

/// ffprobe prints most numbers as JSON strings; accept either form.
fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .filter(|v| v.is_finite() && *v >= 0.0)
}
