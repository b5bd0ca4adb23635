//! Batch ingestion of recorded videos, one spritesheet per video.

use std::path::{Path, PathBuf};

use serde::Serialize;
use spritevault_core::{CapacityGuard, EntryRef, FrameExtractor, SpriteError, SpritesheetBuilder};
use tracing::{info, warn};

use crate::util::{VIDEO_EXTS, append_processed_log, list_files, read_processed_log};

#[derive(Debug, Default, Serialize)]
pub(crate) struct IngestSummary {
    pub(crate) scanned: usize,
    pub(crate) built: Vec<EntryRef>,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

pub(crate) struct VideoIngest<'a> {
    pub(crate) extractor: &'a dyn FrameExtractor,
    pub(crate) builder: &'a SpritesheetBuilder,
    pub(crate) capacity: &'a CapacityGuard,
    pub(crate) fps: u32,
    pub(crate) log: &'a Path,
}

impl VideoIngest<'_> {
    /// Ingest a single video file or every video directly inside a folder.
    pub(crate) fn run(&self, path: &Path) -> Result<IngestSummary, Box<dyn std::error::Error>> {
        let videos: Vec<PathBuf> = if path.is_dir() {
            list_files(path, &[], VIDEO_EXTS)
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("no such video or folder: {}", path.display()).into());
        };

        let processed = read_processed_log(self.log);
        let mut summary = IngestSummary::default();
        for video in videos {
            summary.scanned += 1;
            let key = video.display().to_string();
            if processed.contains(&key) {
                info!(video = %key, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }
            match self.ingest_one(&video) {
                Ok(entry) => {
                    append_processed_log(self.log, &video)?;
                    summary.built.push(entry);
                }
                Err(SpriteError::InvalidInput { reason }) => {
                    warn!(video = %key, %reason, "video rejected");
                    summary.skipped += 1;
                }
                Err(err) => {
                    warn!(video = %key, %err, "video ingestion failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn ingest_one(&self, video: &Path) -> spritevault_core::Result<EntryRef> {
        let extracted = self.extractor.extract_frames(video, self.fps)?;
        let frames = extracted.load_frames()?;
        info!(video = %video.display(), frames = frames.len(), "extracted frames");

        if let Err(err) = self.capacity.evict(self.builder.archive()) {
            warn!(%err, "capacity check failed");
        }
        self.builder.build(&frames)
    }
}
