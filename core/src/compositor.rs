//! Image compositing primitives backed by the `image` crate.
//!
//! Everything stays as raw RGB buffers until [`ImageCompositor::encode_jpeg`],
//! so cropping, resizing and pasting never go through a lossy round-trip.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::constants::JPEG_QUALITY;
use crate::error::{Result, SpriteError};
use crate::types::BoundingBox;

/// Canvas background (white); blank cells stay this colour.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy)]
pub struct ImageCompositor {
    jpeg_quality: u8,
    filter: FilterType,
}

impl Default for ImageCompositor {
    fn default() -> Self {
        Self {
            jpeg_quality: JPEG_QUALITY,
            filter: FilterType::Triangle,
        }
    }
}

impl ImageCompositor {
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn new_canvas(&self, width: u32, height: u32, background: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(width, height, background)
    }

    /// Decode an encoded frame (JPEG/PNG) into RGB.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        Ok(image::load_from_memory(bytes)?.to_rgb8())
    }

    /// Square crop centred on the box centroid, shifted to stay inside the frame.
    ///
    /// When the square is larger than the frame the crop is clipped to the
    /// frame edge and the later resize absorbs the aspect change.
    pub fn crop_square_centered(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage> {
        let (img_w, img_h) = image.dimensions();
        let size = bbox.square_size();
        let (cx, cy) = bbox.center();

        let left = (cx - size / 2.0).min(f64::from(img_w) - size).max(0.0);
        let top = (cy - size / 2.0).min(f64::from(img_h) - size).max(0.0);
        let left_px = left.round() as u32;
        let top_px = top.round() as u32;
        if left_px >= img_w || top_px >= img_h {
            return Err(SpriteError::invalid(format!(
                "crop origin ({left_px}, {top_px}) outside {img_w}x{img_h} frame"
            )));
        }

        let width = (size.min(f64::from(img_w) - left).round() as u32).min(img_w - left_px);
        let height = (size.min(f64::from(img_h) - top).round() as u32).min(img_h - top_px);
        if width == 0 || height == 0 {
            return Err(SpriteError::invalid("crop has an empty extent"));
        }

        Ok(imageops::crop_imm(image, left_px, top_px, width, height).to_image())
    }

    #[must_use]
    pub fn resize(&self, image: &RgbImage, width: u32, height: u32) -> RgbImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        imageops::resize(image, width, height, self.filter)
    }

    /// Paste `tile` with its top-left corner at `(x, y)`; anything past the
    /// canvas edge is clipped.
    pub fn paste(&self, canvas: &mut RgbImage, tile: &RgbImage, x: u32, y: u32) {
        imageops::replace(canvas, tile, i64::from(x), i64::from(y));
    }

    /// Copy one `size`×`size` cell out of a composite.
    #[must_use]
    pub fn crop_cell(&self, sheet: &RgbImage, x: u32, y: u32, size: u32) -> RgbImage {
        let (w, h) = sheet.dimensions();
        let cw = size.min(w.saturating_sub(x));
        let ch = size.min(h.saturating_sub(y));
        imageops::crop_imm(sheet, x, y, cw, ch).to_image()
    }

    pub fn encode_jpeg(&self, canvas: &RgbImage) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality).encode_image(canvas)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]))
    }

    #[test]
    fn crop_is_square_and_centered() {
        let c = ImageCompositor::default();
        let img = gradient(400, 300);
        let bbox = BoundingBox::new(150.0, 100.0, 40.0, 80.0).expect("bbox");
        let crop = c.crop_square_centered(&img, &bbox).expect("crop");
        assert_eq!(crop.dimensions(), (80, 80));
        // centre (170, 140) -> left 130, top 100
        assert_eq!(crop.get_pixel(0, 0), &Rgb([130, 100, 0]));
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let c = ImageCompositor::default();
        let img = gradient(200, 200);
        let bbox = BoundingBox::new(180.0, 180.0, 50.0, 50.0).expect("bbox");
        let crop = c.crop_square_centered(&img, &bbox).expect("crop");
        assert_eq!(crop.dimensions(), (50, 50));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([150, 150, 0]));

        let bbox = BoundingBox::new(-40.0, -40.0, 30.0, 30.0).expect("bbox");
        let crop = c.crop_square_centered(&img, &bbox).expect("crop");
        assert_eq!(crop.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn oversized_box_is_clipped() {
        let c = ImageCompositor::default();
        let img = gradient(100, 60);
        let bbox = BoundingBox::new(0.0, 0.0, 300.0, 300.0).expect("bbox");
        let crop = c.crop_square_centered(&img, &bbox).expect("crop");
        assert_eq!(crop.dimensions(), (100, 60));
    }

    #[test]
    fn paste_clips_past_edge() {
        let c = ImageCompositor::default();
        let mut canvas = c.new_canvas(100, 50, BACKGROUND);
        let tile = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        c.paste(&mut canvas, &tile, 75, 25);
        assert_eq!(canvas.get_pixel(80, 30), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(10, 10), &BACKGROUND);
    }

    #[test]
    fn jpeg_encode_decodes_back() {
        let c = ImageCompositor::default();
        let canvas = c.new_canvas(40, 20, BACKGROUND);
        let bytes = c.encode_jpeg(&canvas).expect("encode");
        let back = c.decode(&bytes).expect("decode");
        assert_eq!(back.dimensions(), (40, 20));
    }
}
