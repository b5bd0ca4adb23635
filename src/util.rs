use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use spritevault_core::{BoundingBox, Frame};
use walkdir::WalkDir;

pub(crate) const FRAME_EXTS: &[&str] = &["jpg", "jpeg", "png"];
pub(crate) const VIDEO_EXTS: &[&str] = &["mp4", "mov"];

pub(crate) fn is_extension_allowed(path: &Path, exts: &[String], defaults: &[&str]) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or("");
    if exts.is_empty() {
        return defaults.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed));
    }
    exts.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed))
}

/// Files directly inside `dir` with an allowed extension, sorted by name.
pub(crate) fn list_files(dir: &Path, exts: &[String], defaults: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_extension_allowed(path, exts, defaults))
        .collect();
    files.sort();
    files
}

/// Face boxes keyed by frame file name: `{"frame-0001.png": [x, y, w, h]}`.
pub(crate) fn load_bboxes(path: &Path) -> Result<HashMap<String, BoundingBox>, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[derive(Deserialize)]
struct FrameRecord {
    image: String,
    #[serde(default)]
    bbox: Option<BoundingBox>,
}

/// Captured frames as browser data URLs: `[{"image": "data:...", "bbox": [x, y, w, h]}]`.
pub(crate) fn load_frames_file(path: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)?;
    let records: Vec<FrameRecord> = serde_json::from_str(&data)?;
    let mut frames = Vec::with_capacity(records.len());
    for record in records {
        frames.push(Frame::from_data_url(&record.image, record.bbox)?);
    }
    Ok(frames)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Processed-video log
// ============================================================================

/// One processed video path per line.
pub(crate) fn read_processed_log(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(data) => data
            .lines()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => HashSet::new(),
    }
}

pub(crate) fn append_processed_log(path: &Path, video: &Path) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", video.display())
}
