//! Shared value types: frames, bounding boxes, grid layout, archive refs and
//! query results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CELL_SIZE, DEFAULT_COLUMNS};
use crate::error::{Result, SpriteError};

/// Fixed-length face embedding produced by the external model.
pub type Embedding = Vec<f32>;

// ============================================================================
// Bounding boxes and frames
// ============================================================================

/// Face bounding box in source-image pixel coordinates.
///
/// Serialized as the `[x, y, w, h]` array the capture front-end sends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    /// Build a box, rejecting non-finite coordinates and empty extents.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Result<Self> {
        if ![x, y, w, h].iter().all(|v| v.is_finite()) {
            return Err(SpriteError::invalid("bounding box has non-finite coordinates"));
        }
        if w <= 0.0 || h <= 0.0 {
            return Err(SpriteError::invalid(format!(
                "bounding box must have a positive extent, got {w}x{h}"
            )));
        }
        Ok(Self { x, y, w, h })
    }

    /// Centroid of the box.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Edge of the square crop that covers the box.
    #[must_use]
    pub fn square_size(&self) -> f64 {
        self.w.max(self.h)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = SpriteError;

    fn try_from([x, y, w, h]: [f64; 4]) -> Result<Self> {
        Self::new(x, y, w, h)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// One captured frame: encoded image bytes plus the face box, if known.
///
/// The payload is reference counted so a buffer snapshot can be handed to the
/// build worker without copying image data.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<[u8]>,
    pub bbox: Option<BoundingBox>,
}

impl Frame {
    pub fn new(image: impl Into<Arc<[u8]>>, bbox: Option<BoundingBox>) -> Self {
        Self {
            image: image.into(),
            bbox,
        }
    }

    /// Decode a `data:<mime>;base64,<payload>` URL into a frame.
    pub fn from_data_url(url: &str, bbox: Option<BoundingBox>) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| SpriteError::invalid("frame is not a data URL"))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| SpriteError::invalid("frame data URL is not base64 encoded"))?;
        if mime.is_empty() || payload.is_empty() {
            return Err(SpriteError::invalid("frame data URL is empty"));
        }
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| SpriteError::invalid(format!("frame data URL: {e}")))?;
        Ok(Self::new(bytes, bbox))
    }
}

// ============================================================================
// Grid layout
// ============================================================================

/// Geometry of a spritesheet: square cells laid out in a fixed-column grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Edge length of one cell in pixels.
    pub cell_size: u32,
    /// Cells per row.
    pub columns: u32,
    /// Optional cap on the canvas height; rows below it are not rendered.
    pub max_height: Option<u32>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            columns: DEFAULT_COLUMNS,
            max_height: None,
        }
    }
}

impl SheetLayout {
    #[must_use]
    pub fn new(cell_size: u32, columns: u32) -> Self {
        Self {
            cell_size,
            columns,
            max_height: None,
        }
    }

    #[must_use]
    pub fn with_max_height(mut self, max_height: u32) -> Self {
        self.max_height = Some(max_height);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_size == 0 || self.columns == 0 {
            return Err(SpriteError::invalid("layout needs a non-zero cell size and column count"));
        }
        Ok(())
    }

    /// Rows needed for `frame_count` cells.
    #[must_use]
    pub fn rows_for(&self, frame_count: usize) -> u32 {
        frame_count.div_ceil(self.columns as usize) as u32
    }

    /// Canvas `(width, height)` for `frame_count` cells, height clamped to the cap.
    #[must_use]
    pub fn canvas_size(&self, frame_count: usize) -> (u32, u32) {
        let width = self.columns * self.cell_size;
        let height = self.rows_for(frame_count) * self.cell_size;
        let height = match self.max_height {
            Some(cap) => height.min(cap),
            None => height,
        };
        (width, height)
    }

    /// Top-left pixel of the cell at `index` (row-major).
    #[must_use]
    pub fn cell_origin(&self, index: usize) -> (u32, u32) {
        let columns = self.columns as usize;
        let x = (index % columns) as u32 * self.cell_size;
        let y = (index / columns) as u32 * self.cell_size;
        (x, y)
    }

    /// Composite file name encoding the frame count and cell size.
    #[must_use]
    pub fn file_name(&self, frame_count: usize) -> String {
        format!("{frame_count}.{}.{}.jpg", self.cell_size, self.cell_size)
    }
}

/// Recover the frame count encoded in a composite file name
/// (`"{count}.{cell}.{cell}.jpg"`).
#[must_use]
pub fn frame_count_from_file_name(name: &str) -> Option<usize> {
    name.split('.').next()?.parse().ok()
}

// ============================================================================
// Archive references and query results
// ============================================================================

/// A committed archive entry, as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRef {
    /// Entry folder name (encodes creation time).
    pub folder: String,
    /// Composite image path relative to the archive root, `/`-separated.
    pub path: String,
    /// Frames rendered into the composite.
    pub frame_count: usize,
}

impl EntryRef {
    /// Resolve the composite against the archive root.
    #[must_use]
    pub fn absolute(&self, root: &Path) -> PathBuf {
        self.path.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

/// One ranked query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatch {
    #[serde(rename = "ref")]
    pub entry: String,
    pub frame_count: usize,
    /// Euclidean distance to the live embedding (lower is more similar).
    pub distance: f32,
}

/// Nearest and farthest archive entries for one live embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub most_similar: Vec<QueryMatch>,
    pub least_similar: Vec<QueryMatch>,
}
