//! SpriteVault core: face-capture spritesheets, a descriptor archive on disk,
//! and nearest/farthest face lookup.
//!
//! Frames flow through an [`IngestionPipeline`]: a [`FrameBuffer`] collects a
//! capture session, the [`WorkerGate`] runs at most one build at a time, the
//! [`SpritesheetBuilder`] composes the grid and the [`ArchiveStore`] commits it
//! together with an averaged face descriptor. [`search::query`] ranks archive
//! entries against a live embedding.

pub mod archive;
pub mod buffer;
pub mod builder;
pub mod capacity;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod disk;
pub mod embed;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod search;
pub mod types;
pub mod video;

pub use archive::{ArchiveEntry, ArchiveStats, ArchiveStore, EntryInfo};
pub use buffer::{BufferConfig, FrameBuffer};
pub use builder::SpritesheetBuilder;
pub use capacity::{CapacityConfig, CapacityGuard, EvictionPolicy};
pub use compositor::ImageCompositor;
pub use config::SpriteVaultConfig;
pub use descriptor::DescriptorExtractor;
pub use disk::{DiskUsage, Fs2DiskUsage};
pub use embed::{EmbedderConfig, FaceEmbedder};
#[cfg(feature = "api_embed")]
pub use embed::HttpFaceEmbedder;
pub use error::{Result, SpriteError};
pub use gate::{BuildTicket, GateConfig, SkipReason, Submission, WorkerGate};
pub use pipeline::{AddFrameOutcome, FlushReport, IngestionPipeline};
pub use types::{BoundingBox, Embedding, EntryRef, Frame, QueryMatch, QueryResult, SheetLayout};
pub use video::{ExtractedFrames, FfmpegExtractor, FrameExtractor, VideoConfig};
