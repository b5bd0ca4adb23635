//! Compose captured frames into a spritesheet and commit it to the archive.

use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::ArchiveStore;
use crate::compositor::{BACKGROUND, ImageCompositor};
use crate::descriptor::DescriptorExtractor;
use crate::error::{Result, SpriteError};
use crate::types::{EntryRef, Frame, SheetLayout};

/// A composite before it is encoded and committed.
#[derive(Debug, Clone)]
pub struct ComposedSheet {
    pub canvas: RgbImage,
    /// Frames actually pasted into the canvas.
    pub rendered: usize,
}

pub struct SpritesheetBuilder {
    archive: Arc<ArchiveStore>,
    extractor: DescriptorExtractor,
    compositor: ImageCompositor,
}

impl SpritesheetBuilder {
    pub fn new(archive: Arc<ArchiveStore>, extractor: DescriptorExtractor) -> Self {
        Self {
            archive,
            extractor,
            compositor: ImageCompositor::default(),
        }
    }

    #[must_use]
    pub fn with_compositor(mut self, compositor: ImageCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    #[must_use]
    pub fn archive(&self) -> &Arc<ArchiveStore> {
        &self.archive
    }

    #[must_use]
    pub fn layout(&self) -> &SheetLayout {
        self.archive.layout()
    }

    /// Compose, persist and describe one spritesheet.
    pub fn build(&self, frames: &[Frame]) -> Result<EntryRef> {
        let sheet = self.compose(frames)?;
        let jpeg = self.compositor.encode_jpeg(&sheet.canvas)?;
        debug!(bytes = jpeg.len(), rendered = sheet.rendered, "encoded spritesheet");
        self.archive.create_entry(&jpeg, sheet.rendered, &self.extractor)
    }

    /// Lay frames out on a white canvas at their original grid positions.
    ///
    /// Frames that fail to decode or crop are dropped and leave a blank cell.
    /// Frames whose row falls below the height cap are omitted.
    pub fn compose(&self, frames: &[Frame]) -> Result<ComposedSheet> {
        if frames.is_empty() {
            return Err(SpriteError::NoValidFrames);
        }
        let layout = *self.layout();
        let (width, height) = layout.canvas_size(frames.len());
        let cell = layout.cell_size;

        let tiles: Vec<(usize, RgbImage)> = frames
            .par_iter()
            .enumerate()
            .filter(|(index, _)| layout.cell_origin(*index).1 + cell <= height)
            .filter_map(|(index, frame)| match self.render_cell(frame, cell) {
                Ok(tile) => Some((index, tile)),
                Err(err) => {
                    warn!(frame = index, %err, "dropping frame from spritesheet");
                    None
                }
            })
            .collect();

        if tiles.is_empty() {
            return Err(SpriteError::NoValidFrames);
        }

        let mut canvas = self.compositor.new_canvas(width, height, BACKGROUND);
        for (index, tile) in &tiles {
            let (x, y) = layout.cell_origin(*index);
            self.compositor.paste(&mut canvas, tile, x, y);
        }

        info!(
            frames = frames.len(),
            rendered = tiles.len(),
            width,
            height,
            "composed spritesheet"
        );
        Ok(ComposedSheet {
            canvas,
            rendered: tiles.len(),
        })
    }

    fn render_cell(&self, frame: &Frame, cell: u32) -> Result<RgbImage> {
        let decoded = self.compositor.decode(&frame.image)?;
        let cropped = match &frame.bbox {
            Some(bbox) => self.compositor.crop_square_centered(&decoded, bbox)?,
            None => decoded,
        };
        Ok(self.compositor.resize(&cropped, cell, cell))
    }
}
