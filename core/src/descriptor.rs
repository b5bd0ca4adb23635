//! Representative-embedding extraction for composites, plus the
//! `descriptor.json` sidecar codec.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use atomic_write_file::AtomicWriteFile;
use fs_err as fs;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compositor::ImageCompositor;
use crate::constants::{BLANK_CELL_RATIO, DEFAULT_SAMPLE_QUOTA, WHITE_CHANNEL_THRESHOLD};
use crate::embed::FaceEmbedder;
use crate::error::{Result, SpriteError};
use crate::types::{Embedding, SheetLayout};

// ============================================================================
// Sidecar codec
// ============================================================================

/// On-disk shape of `descriptor.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorFile {
    pub descriptor: Embedding,
}

/// Write the sidecar atomically (temp file + rename), so readers never see a
/// half-written descriptor.
pub fn write_descriptor(path: &Path, descriptor: &[f32]) -> Result<()> {
    let json = serde_json::to_vec_pretty(&DescriptorFile {
        descriptor: descriptor.to_vec(),
    })?;
    let mut file = AtomicWriteFile::open(path).map_err(|e| SpriteError::io_at(e, path))?;
    file.write_all(&json)?;
    file.flush()?;
    file.commit().map_err(|e| SpriteError::io_at(e, path))?;
    Ok(())
}

/// Read a sidecar; anything unreadable or empty is `StorageCorruption`.
pub fn read_descriptor(path: &Path) -> Result<Embedding> {
    let raw = fs::read(path)?;
    let file: DescriptorFile =
        serde_json::from_slice(&raw).map_err(|e| SpriteError::StorageCorruption {
            path: path.to_path_buf(),
            reason: format!("unparseable descriptor: {e}").into(),
        })?;
    if file.descriptor.is_empty() || file.descriptor.iter().any(|v| !v.is_finite()) {
        return Err(SpriteError::StorageCorruption {
            path: path.to_path_buf(),
            reason: "descriptor is empty or non-finite".into(),
        });
    }
    Ok(file.descriptor)
}

// ============================================================================
// Extraction
// ============================================================================

/// Samples cells of a composite and averages the face embeddings found.
#[derive(Clone)]
pub struct DescriptorExtractor {
    embedder: Arc<dyn FaceEmbedder>,
    layout: SheetLayout,
    quota: usize,
    compositor: ImageCompositor,
}

impl DescriptorExtractor {
    pub fn new(embedder: Arc<dyn FaceEmbedder>, layout: SheetLayout) -> Self {
        Self {
            embedder,
            layout,
            quota: DEFAULT_SAMPLE_QUOTA,
            compositor: ImageCompositor::default(),
        }
    }

    /// Successful embeddings to collect before sampling stops.
    #[must_use]
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota.max(1);
        self
    }

    #[must_use]
    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn extract_from_file(&self, path: &Path) -> Result<Option<Embedding>> {
        let sheet = image::open(path)?.to_rgb8();
        Ok(self.extract(&sheet))
    }

    /// Walk cells row-major from the top-left and stop at the quota or the
    /// last full row. Cells without a face, or whose embedding fails, are
    /// skipped without counting toward the quota.
    #[must_use]
    pub fn extract(&self, sheet: &RgbImage) -> Option<Embedding> {
        let cell = self.layout.cell_size;
        if cell == 0 {
            return None;
        }
        let columns = (sheet.width() / cell).min(self.layout.columns);
        let rows = sheet.height() / cell;

        let mut collected: Vec<Embedding> = Vec::with_capacity(self.quota);
        'rows: for row in 0..rows {
            for col in 0..columns {
                let tile = self
                    .compositor
                    .crop_cell(sheet, col * cell, row * cell, cell);
                match self.embedder.embed_face(&tile) {
                    Ok(Some(embedding)) => {
                        if let Some(first) = collected.first() {
                            if first.len() != embedding.len() {
                                warn!(
                                    row,
                                    col,
                                    expected = first.len(),
                                    actual = embedding.len(),
                                    "skipping cell with mismatched embedding dimension"
                                );
                                continue;
                            }
                        }
                        collected.push(embedding);
                        if collected.len() >= self.quota {
                            break 'rows;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(row, col, provider = self.embedder.kind(), %err, "cell embedding failed");
                    }
                }
            }
        }

        debug!(samples = collected.len(), "descriptor sampling finished");
        mean_embedding(&collected)
    }
}

/// Component-wise arithmetic mean; `None` for an empty set.
#[must_use]
pub fn mean_embedding(embeddings: &[Embedding]) -> Option<Embedding> {
    let first = embeddings.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for embedding in embeddings {
        for (acc, v) in sum.iter_mut().zip(embedding) {
            *acc += v;
        }
    }
    let n = embeddings.len() as f32;
    sum.iter_mut().for_each(|v| *v /= n);
    Some(sum)
}

// ============================================================================
// Rendered-cell counting
// ============================================================================

/// True when more than three quarters of the cell's pixels are near-white.
#[must_use]
pub fn is_blank_cell(cell: &RgbImage) -> bool {
    let total = cell.width() as usize * cell.height() as usize;
    if total == 0 {
        return true;
    }
    let white = cell
        .pixels()
        .filter(|p| p.0.iter().all(|&c| c > WHITE_CHANNEL_THRESHOLD))
        .count();
    white as f32 / total as f32 > BLANK_CELL_RATIO
}

/// Cells scanned row-major before the first blank one.
#[must_use]
pub fn count_rendered_cells(sheet: &RgbImage, layout: &SheetLayout) -> usize {
    let cell = layout.cell_size;
    if cell == 0 {
        return 0;
    }
    let compositor = ImageCompositor::default();
    let columns = (sheet.width() / cell).min(layout.columns);
    let rows = sheet.height() / cell;
    let mut count = 0;
    for row in 0..rows {
        for col in 0..columns {
            let tile = compositor.crop_cell(sheet, col * cell, row * cell, cell);
            if is_blank_cell(&tile) {
                return count;
            }
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use image::Rgb;

    use super::*;

    /// Embeds a non-white cell as its mean colour; white cells have no face.
    struct ColourEmbedder {
        calls: Mutex<usize>,
    }

    impl FaceEmbedder for ColourEmbedder {
        fn kind(&self) -> &str {
            "colour"
        }

        fn embed_face(&self, image: &RgbImage) -> Result<Option<Embedding>> {
            *self.calls.lock().unwrap() += 1;
            if is_blank_cell(image) {
                return Ok(None);
            }
            let p = image.get_pixel(0, 0).0;
            Ok(Some(p.iter().map(|&c| f32::from(c)).collect()))
        }
    }

    fn sheet(cells: &[Rgb<u8>], layout: &SheetLayout) -> RgbImage {
        let (w, h) = layout.canvas_size(cells.len());
        let mut img = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));
        for (i, colour) in cells.iter().enumerate() {
            let (x, y) = layout.cell_origin(i);
            for dy in 0..layout.cell_size {
                for dx in 0..layout.cell_size {
                    img.put_pixel(x + dx, y + dy, *colour);
                }
            }
        }
        img
    }

    #[test]
    fn stops_at_quota_and_averages() {
        let layout = SheetLayout::new(4, 3);
        let white = Rgb([255, 255, 255]);
        let cells = [
            Rgb([10, 0, 0]),
            white,
            Rgb([20, 0, 0]),
            Rgb([30, 0, 0]),
            Rgb([200, 0, 0]),
        ];
        let embedder = Arc::new(ColourEmbedder {
            calls: Mutex::new(0),
        });
        let extractor = DescriptorExtractor::new(embedder.clone(), layout).with_quota(3);
        let mean = extractor.extract(&sheet(&cells, &layout)).expect("descriptor");
        assert_eq!(mean, vec![20.0, 0.0, 0.0]);
        // the white cell is sampled but not counted; the fifth cell is never reached
        assert_eq!(*embedder.calls.lock().unwrap(), 4);
    }

    #[test]
    fn blank_sheet_yields_nothing() {
        let layout = SheetLayout::new(4, 3);
        let white = Rgb([255, 255, 255]);
        let extractor = DescriptorExtractor::new(
            Arc::new(ColourEmbedder {
                calls: Mutex::new(0),
            }),
            layout,
        );
        assert!(extractor.extract(&sheet(&[white, white], &layout)).is_none());
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert!(mean_embedding(&[]).is_none());
        assert_eq!(
            mean_embedding(&[vec![1.0, 2.0], vec![3.0, 4.0]]),
            Some(vec![2.0, 3.0])
        );
    }

    #[test]
    fn rendered_cells_stop_at_first_blank() {
        let layout = SheetLayout::new(4, 3);
        let white = Rgb([255, 255, 255]);
        let dark = Rgb([5, 5, 5]);
        let img = sheet(&[dark, dark, dark, dark, white, dark], &layout);
        assert_eq!(count_rendered_cells(&img, &layout), 4);
    }

    #[test]
    fn descriptor_sidecar_roundtrip() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("descriptor.json");
        let values = vec![0.125f32, -0.5, 3.75];
        write_descriptor(&path, &values).expect("write");
        let back = read_descriptor(&path).expect("read");
        for (a, b) in values.iter().zip(&back) {
            assert!((a - b).abs() < 1e-6);
        }
        let raw = std::fs::read_to_string(&path).expect("raw");
        assert!(raw.contains("\"descriptor\""));
    }

    #[test]
    fn corrupt_sidecar_is_storage_corruption() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("descriptor.json");
        std::fs::write(&path, b"{\"descriptor\": \"nope\"}").expect("write");
        assert!(matches!(
            read_descriptor(&path),
            Err(SpriteError::StorageCorruption { .. })
        ));
        std::fs::write(&path, b"{\"descriptor\": []}").expect("write");
        assert!(read_descriptor(&path).is_err());
    }
}
