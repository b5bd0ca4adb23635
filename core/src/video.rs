//! Video-to-frame extraction.

use std::path::{Path, PathBuf};
use std::process::Command;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use crate::constants::{DEFAULT_VIDEO_FPS, MIN_VIDEO_SECS};
use crate::error::{Result, SpriteError};
use crate::types::Frame;

/// Capability decoding a video into ordered still images.
pub trait FrameExtractor: Send + Sync {
    fn extract_frames(&self, video: &Path, fps: u32) -> Result<ExtractedFrames>;
}

/// Still images written to a scratch directory; removed on drop.
#[derive(Debug)]
pub struct ExtractedFrames {
    dir: TempDir,
    paths: Vec<PathBuf>,
}

impl ExtractedFrames {
    pub fn new(dir: TempDir, mut paths: Vec<PathBuf>) -> Self {
        paths.sort();
        Self { dir, paths }
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Read every still into an uncropped frame, in capture order.
    pub fn load_frames(&self) -> Result<Vec<Frame>> {
        self.paths
            .iter()
            .map(|path| -> Result<Frame> { Ok(Frame::new(fs::read(path)?, None)) })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub fps: u32,
    /// Videos shorter than this many seconds are rejected.
    pub min_duration_secs: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            fps: DEFAULT_VIDEO_FPS,
            min_duration_secs: MIN_VIDEO_SECS,
        }
    }
}

/// Shells out to `ffprobe` for the duration check and `ffmpeg` for decoding.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor {
    config: VideoConfig,
}

impl FfmpegExtractor {
    #[must_use]
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    pub fn duration_secs(&self, video: &Path) -> Result<f64> {
        let output = Command::new(&self.config.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .output()
            .map_err(|e| extraction_failed(format!("spawn {}: {e}", self.config.ffprobe)))?;
        if !output.status.success() {
            return Err(extraction_failed(format!(
                "ffprobe failed on {}: {}",
                video.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

impl FrameExtractor for FfmpegExtractor {
    fn extract_frames(&self, video: &Path, fps: u32) -> Result<ExtractedFrames> {
        if !video.is_file() {
            return Err(SpriteError::invalid(format!(
                "video {} does not exist",
                video.display()
            )));
        }
        let duration = self.duration_secs(video)?;
        if duration < self.config.min_duration_secs {
            return Err(SpriteError::invalid(format!(
                "video {} is {duration:.1}s long, need at least {}s",
                video.display(),
                self.config.min_duration_secs
            )));
        }

        let dir = tempfile::Builder::new().prefix("spritevault-frames").tempdir()?;
        let pattern = dir.path().join("frame-%04d.png");
        debug!(video = %video.display(), fps, "extracting frames");
        let output = Command::new(&self.config.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(video)
            .args(["-vf", &format!("fps={}", fps.max(1))])
            .arg(&pattern)
            .output()
            .map_err(|e| extraction_failed(format!("spawn {}: {e}", self.config.ffmpeg)))?;
        if !output.status.success() {
            return Err(extraction_failed(format!(
                "ffmpeg failed on {}: {}",
                video.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir.path())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(extraction_failed(format!(
                "no frames extracted from {}",
                video.display()
            )));
        }
        Ok(ExtractedFrames::new(dir, paths))
    }
}

fn parse_duration(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .ok_or_else(|| extraction_failed(format!("unreadable duration {:?}", raw.trim())))
}

fn extraction_failed(reason: String) -> SpriteError {
    SpriteError::ExtractionFailed {
        reason: reason.into_boxed_str(),
    }
}
