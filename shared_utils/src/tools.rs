//! External tool discovery and first-use download.
//!
//! Lookup order: an explicit directory, then `~/.ffmpeg` when it already
//! holds both binaries, then `PATH`, then a download of static builds into
//! `~/.ffmpeg`.

use crate::errors::{Result, VerterError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const FFBINARIES_LATEST_URL: &str = "https://ffbinaries.com/api/v1/version/latest";

/// Directory under the user's home that holds downloaded binaries.
pub const DEFAULT_TOOLS_DIR_NAME: &str = ".ffmpeg";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegTools {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ffmpeg: dir.join(executable_name("ffmpeg")),
            ffprobe: dir.join(executable_name("ffprobe")),
        }
    }

    pub fn exist(&self) -> bool {
        self.ffmpeg.is_file() && self.ffprobe.is_file()
    }

    pub fn from_path() -> Option<Self> {
        let ffmpeg = which::which("ffmpeg").ok()?;
        let ffprobe = which::which("ffprobe").ok()?;
        Some(Self { ffmpeg, ffprobe })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolsConfig {
    /// Explicit directory containing (or to receive) ffmpeg and ffprobe.
    pub ffmpeg_dir: Option<PathBuf>,
    pub allow_download: bool,
}

pub fn executable_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

pub fn default_tools_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_TOOLS_DIR_NAME))
}

/// Find usable ffmpeg/ffprobe binaries, downloading them when allowed.
pub fn ensure_ffmpeg(config: &ToolsConfig) -> Result<FfmpegTools> {
    if let Some(ref dir) = config.ffmpeg_dir {
        let tools = FfmpegTools::in_dir(dir);
        if tools.exist() {
            debug!(dir = %dir.display(), "Using FFmpeg from configured directory");
            return Ok(tools);
        }
        if !config.allow_download {
            return Err(VerterError::ToolNotFound(format!(
                "ffmpeg/ffprobe not found in {}",
                dir.display()
            )));
        }
        return download_ffmpeg(dir);
    }

    let home_dir = default_tools_dir();
    if let Some(ref dir) = home_dir {
        let tools = FfmpegTools::in_dir(dir);
        if tools.exist() {
            debug!(dir = %dir.display(), "Using previously downloaded FFmpeg");
            return Ok(tools);
        }
    }

    if let Some(tools) = FfmpegTools::from_path() {
        debug!(ffmpeg = %tools.ffmpeg.display(), "Using FFmpeg from PATH");
        return Ok(tools);
    }

    match home_dir {
        Some(dir) if config.allow_download => download_ffmpeg(&dir),
        _ => Err(VerterError::ToolNotFound(
            "ffmpeg not found. Install it (e.g. brew install ffmpeg / apt install ffmpeg) \
             or allow the automatic download"
                .to_string(),
        )),
    }
}

/// Index key for the current build target.
pub fn platform_key() -> Result<&'static str> {
    platform_key_for(std::env::consts::OS, std::env::consts::ARCH)
}

pub fn platform_key_for(os: &str, arch: &str) -> Result<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Ok("linux-64"),
        ("linux", "x86") => Ok("linux-32"),
        ("linux", "aarch64") => Ok("linux-arm64"),
        ("linux", "arm") => Ok("linux-armhf"),
        ("macos", "x86_64") | ("macos", "aarch64") => Ok("osx-64"),
        ("windows", "x86_64") => Ok("windows-64"),
        _ => Err(VerterError::UnsupportedPlatform(format!("{}-{}", os, arch))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseIndex {
    pub version: String,
    pub bin: HashMap<String, PlatformBinaries>,
}

#[derive(Debug, Deserialize)]
pub struct PlatformBinaries {
    pub ffmpeg: Option<String>,
    pub ffprobe: Option<String>,
}

impl ReleaseIndex {
    /// Archive URLs for ffmpeg and ffprobe on `platform`.
    pub fn urls_for(&self, platform: &str) -> Result<(&str, &str)> {
        let entry = self
            .bin
            .get(platform)
            .ok_or_else(|| VerterError::UnsupportedPlatform(platform.to_string()))?;
        match (entry.ffmpeg.as_deref(), entry.ffprobe.as_deref()) {
            (Some(ffmpeg), Some(ffprobe)) => Ok((ffmpeg, ffprobe)),
            _ => Err(VerterError::Download(format!(
                "release {} has no ffmpeg/ffprobe build for {}",
                self.version, platform
            ))),
        }
    }
}

/// Download the latest static ffmpeg and ffprobe into `dest`.
pub fn download_ffmpeg(dest: &Path) -> Result<FfmpegTools> {
    let platform = platform_key()?;
    fs::create_dir_all(dest)?;

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("verter/", env!("CARGO_PKG_VERSION")))
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;

    info!(url = FFBINARIES_LATEST_URL, platform, "Fetching FFmpeg release index");
    let index: ReleaseIndex = client
        .get(FFBINARIES_LATEST_URL)
        .send()?
        .error_for_status()?
        .json()?;

    let (ffmpeg_url, ffprobe_url) = index.urls_for(platform)?;
    info!(version = %index.version, dest = %dest.display(), "Downloading FFmpeg");

    for url in [ffmpeg_url, ffprobe_url] {
        debug!(url, "Downloading archive");
        let bytes = client.get(url).send()?.error_for_status()?.bytes()?;
        extract_binaries(&bytes, dest)?;
    }

    let tools = FfmpegTools::in_dir(dest);
    if !tools.exist() {
        return Err(VerterError::Download(format!(
            "archives did not contain ffmpeg and ffprobe (looked in {})",
            dest.display()
        )));
    }

    for binary in [&tools.ffmpeg, &tools.ffprobe] {
        make_executable(binary)?;
    }

    info!(dest = %dest.display(), "FFmpeg ready");
    Ok(tools)
}

/// Extract every regular file of a zip archive flat into `dest`, skipping
/// directory entries and macOS resource forks.
pub fn extract_binaries(bytes: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(name) = file
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
        else {
            warn!(entry = file.name(), "Skipping archive entry with unsafe path");
            continue;
        };
        if file.name().starts_with("__MACOSX") {
            continue;
        }

        let dest_path = dest.join(name);
        let mut out = fs::File::create(&dest_path)?;
        std::io::copy(&mut file, &mut out)?;
        extracted.push(dest_path);
    }

    Ok(extracted)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                if name.ends_with('/') {
                    writer.add_directory(*name, options).unwrap();
                } else {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(data).unwrap();
                }
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_platform_keys() {
        assert_eq!(platform_key_for("linux", "x86_64").unwrap(), "linux-64");
        assert_eq!(platform_key_for("linux", "aarch64").unwrap(), "linux-arm64");
        assert_eq!(platform_key_for("macos", "aarch64").unwrap(), "osx-64");
        assert_eq!(platform_key_for("windows", "x86_64").unwrap(), "windows-64");
        assert!(matches!(
            platform_key_for("freebsd", "x86_64"),
            Err(VerterError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_in_dir_uses_platform_executable_names() {
        let tools = FfmpegTools::in_dir(Path::new("/opt/ff"));
        assert_eq!(tools.ffmpeg, Path::new("/opt/ff").join(executable_name("ffmpeg")));
        assert_eq!(tools.ffprobe, Path::new("/opt/ff").join(executable_name("ffprobe")));
    }

    #[test]
    fn test_release_index_urls() {
        let json = r#"{
            "version": "6.1",
            "permalink": "https://ffbinaries.com/api/v1/version/6.1",
            "bin": {
                "linux-64": {
                    "ffmpeg": "https://example.invalid/ffmpeg-6.1-linux-64.zip",
                    "ffprobe": "https://example.invalid/ffprobe-6.1-linux-64.zip"
                },
                "linux-armel": {"ffmpeg": "https://example.invalid/ffmpeg-armel.zip"}
            }
        }"#;
        let index: ReleaseIndex = serde_json::from_str(json).unwrap();
        let (ffmpeg, ffprobe) = index.urls_for("linux-64").unwrap();
        assert!(ffmpeg.ends_with("ffmpeg-6.1-linux-64.zip"));
        assert!(ffprobe.ends_with("ffprobe-6.1-linux-64.zip"));

        assert!(matches!(index.urls_for("linux-armel"), Err(VerterError::Download(_))));
        assert!(matches!(
            index.urls_for("osx-64"),
            Err(VerterError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_extract_binaries_flattens_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        let archive = zip_with(&[
            ("bin/", b""),
            ("bin/ffmpeg", b"ELF"),
            ("__MACOSX/._ffmpeg", b"junk"),
        ]);

        let extracted = extract_binaries(&archive, dir.path()).unwrap();
        assert_eq!(extracted, vec![dir.path().join("ffmpeg")]);
        assert_eq!(fs::read(dir.path().join("ffmpeg")).unwrap(), b"ELF");
    }

    #[test]
    fn test_configured_dir_without_binaries_and_no_download() {
        let dir = TempDir::new().unwrap();
        let config = ToolsConfig {
            ffmpeg_dir: Some(dir.path().to_path_buf()),
            allow_download: false,
        };
        assert!(matches!(ensure_ffmpeg(&config), Err(VerterError::ToolNotFound(_))));
    }

    #[test]
    fn test_configured_dir_with_binaries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(executable_name("ffmpeg")), b"").unwrap();
        fs::write(dir.path().join(executable_name("ffprobe")), b"").unwrap();
        let config = ToolsConfig {
            ffmpeg_dir: Some(dir.path().to_path_buf()),
            allow_download: false,
        };
        assert_eq!(ensure_ffmpeg(&config).unwrap(), FfmpegTools::in_dir(dir.path()));
    }
}
