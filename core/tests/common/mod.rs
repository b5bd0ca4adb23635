#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use spritevault_core::descriptor::is_blank_cell;
use spritevault_core::{
    ArchiveStore, BoundingBox, DescriptorExtractor, Embedding, FaceEmbedder, Frame, Result,
    SheetLayout, SpritesheetBuilder,
};

pub const CELL: u32 = 16;
pub const COLUMNS: u32 = 4;

pub fn layout() -> SheetLayout {
    SheetLayout::new(CELL, COLUMNS)
}

/// Embeds a cell as its mean colour scaled to `[0, 1]`; near-white cells
/// have no face.
pub struct ColourEmbedder;

impl FaceEmbedder for ColourEmbedder {
    fn kind(&self) -> &str {
        "colour"
    }

    fn embed_face(&self, image: &RgbImage) -> Result<Option<Embedding>> {
        if is_blank_cell(image) {
            return Ok(None);
        }
        let n = (image.width() * image.height()) as f32;
        let mut sum = [0.0f32; 3];
        for p in image.pixels() {
            for (acc, c) in sum.iter_mut().zip(p.0) {
                *acc += f32::from(c);
            }
        }
        Ok(Some(sum.iter().map(|s| s / n / 255.0).collect()))
    }
}

/// Never finds a face.
pub struct BlindEmbedder;

impl FaceEmbedder for BlindEmbedder {
    fn kind(&self) -> &str {
        "blind"
    }

    fn embed_face(&self, _image: &RgbImage) -> Result<Option<Embedding>> {
        Ok(None)
    }
}

pub fn png(colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 24, Rgb(colour));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// A frame whose face box lies inside a 32x24 solid-colour capture.
pub fn face_frame(colour: [u8; 3]) -> Frame {
    let bbox = BoundingBox::new(4.0, 4.0, 16.0, 12.0).expect("bbox");
    Frame::new(png(colour), Some(bbox))
}

pub fn colour_builder(root: &Path) -> SpritesheetBuilder {
    builder_with(root, Arc::new(ColourEmbedder))
}

pub fn builder_with(root: &Path, embedder: Arc<dyn FaceEmbedder>) -> SpritesheetBuilder {
    let archive = Arc::new(ArchiveStore::open(root, layout()).expect("open archive"));
    SpritesheetBuilder::new(archive, DescriptorExtractor::new(embedder, layout()))
}

pub fn scaled(colour: [u8; 3]) -> Vec<f32> {
    colour.iter().map(|&c| f32::from(c) / 255.0).collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "dimension");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() <= tolerance, "{actual:?} != {expected:?}");
    }
}
