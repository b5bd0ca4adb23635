use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, SpriteError>;

/// Canonical error surface for spritevault-core.
///
/// Per-frame and per-entry failures are absorbed by the component that hits
/// them (logged, unit of work skipped); only whole-pipeline preconditions are
/// expected to reach a caller.
#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: Cow<'static, str> },

    #[error("No valid frames to create a spritesheet")]
    NoValidFrames,

    #[error("Not enough frames to create a spritesheet (have {count}, need more than {min})")]
    InsufficientFrames { count: usize, min: usize },

    #[error("Archive entry {path:?} is corrupted: {reason}")]
    StorageCorruption {
        path: PathBuf,
        reason: Cow<'static, str>,
    },

    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: Box<str> },

    #[error("Frame extraction failed: {reason}")]
    ExtractionFailed { reason: Box<str> },

    #[error("Descriptor could not be generated for {path:?}")]
    DescriptorNotFound { path: PathBuf },

    #[error("Build abandoned after {}s", after.as_secs())]
    Timeout { after: Duration },

    #[error("Build worker crashed: {reason}")]
    WorkerCrashed { reason: String },
}

impl SpriteError {
    pub(crate) fn invalid(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for SpriteError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}
