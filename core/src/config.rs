//! Typed configuration for a SpriteVault deployment.
//!
//! Every section deserialises with defaults, so a partial JSON document (or
//! none at all) yields a working configuration.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveStore;
use crate::buffer::BufferConfig;
use crate::builder::SpritesheetBuilder;
use crate::capacity::{CapacityConfig, CapacityGuard};
use crate::compositor::ImageCompositor;
use crate::constants::{DEFAULT_SAMPLE_QUOTA, JPEG_QUALITY};
use crate::descriptor::DescriptorExtractor;
use crate::disk::DiskUsage;
use crate::embed::{EmbedderConfig, FaceEmbedder};
use crate::error::Result;
use crate::gate::{GateConfig, WorkerGate};
use crate::pipeline::IngestionPipeline;
use crate::types::SheetLayout;
use crate::video::VideoConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding entry folders.
    pub root: PathBuf,
    /// JPEG quality for composites (1-100).
    pub jpeg_quality: u8,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let root = std::env::var_os("SPRITEVAULT_ARCHIVE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("database0"));
        Self {
            root,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Face embeddings averaged into one entry descriptor.
    pub sample_quota: usize,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            sample_quota: DEFAULT_SAMPLE_QUOTA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteVaultConfig {
    pub archive: ArchiveConfig,
    pub layout: SheetLayout,
    pub buffer: BufferConfig,
    pub gate: GateConfig,
    pub capacity: CapacityConfig,
    pub descriptor: DescriptorConfig,
    pub embedder: EmbedderConfig,
    pub video: VideoConfig,
}

impl SpriteVaultConfig {
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.buffer.validate()
    }

    pub fn open_archive(&self) -> Result<ArchiveStore> {
        ArchiveStore::open(&self.archive.root, self.layout)
    }

    #[must_use]
    pub fn compositor(&self) -> ImageCompositor {
        ImageCompositor::default().with_quality(self.archive.jpeg_quality)
    }

    #[must_use]
    pub fn extractor(&self, embedder: Arc<dyn FaceEmbedder>) -> DescriptorExtractor {
        DescriptorExtractor::new(embedder, self.layout).with_quota(self.descriptor.sample_quota)
    }

    pub fn builder(&self, embedder: Arc<dyn FaceEmbedder>) -> Result<SpritesheetBuilder> {
        let archive = Arc::new(self.open_archive()?);
        Ok(SpritesheetBuilder::new(archive, self.extractor(embedder)).with_compositor(self.compositor()))
    }

    #[must_use]
    pub fn capacity_guard(&self, usage: Arc<dyn DiskUsage>) -> CapacityGuard {
        CapacityGuard::new(usage, self.capacity)
    }

    /// Wire a ready-to-use pipeline from this configuration.
    pub fn pipeline(
        &self,
        embedder: Arc<dyn FaceEmbedder>,
        usage: Arc<dyn DiskUsage>,
    ) -> Result<IngestionPipeline> {
        self.validate()?;
        let pipeline = IngestionPipeline::new(
            self.builder(embedder)?,
            self.buffer,
            WorkerGate::from_config(&self.gate),
        )?;
        Ok(pipeline.with_capacity_guard(self.capacity_guard(usage)))
    }
}
