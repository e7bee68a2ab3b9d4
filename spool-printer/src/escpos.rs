//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data, plus raster image
//! slicing for tickets rendered as images.

use image::{DynamicImage, GenericImageView};
use tracing::instrument;

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
pub struct EscPosBuilder {
    buf: Vec<u8>,
}

impl EscPosBuilder {
    /// Create a new builder, starting with printer initialisation (ESC @)
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(16 * 1024);
        buf.extend_from_slice(&[0x1B, 0x40]);
        Self { buf }
    }

    // === Alignment ===

    /// Align content to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align content to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    // === Paper Control ===

    /// Print and feed n lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        // ESC d n
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        // GS V 0 - Full cut
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x00]);
        self
    }

    /// Feed n lines, then full cut.
    /// Uses GS V 66 n, which lets the printer manage cutter-to-head distance.
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines]);
        self
    }

    // === Images ===

    /// Append one raster image command (as produced by [`raster_strips`])
    pub fn raster(&mut self, command: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(command);
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // === Build ===

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Slice an image into ESC/POS raster commands (GS v 0)
///
/// The image will be:
/// - Resized to fit `max_width` dots, keeping aspect ratio
/// - Converted to 1-bit monochrome (transparent = white, luma < 128 = black)
/// - Cut into horizontal strips no taller than `max_strip_height` (printer
///   receive buffer limit), capped at 65535 rows per command
///
/// Each returned element is a complete `GS v 0` command for one strip, top
/// to bottom.
#[instrument(skip(image), fields(dimensions = ?image.dimensions()))]
pub fn raster_strips(image: &DynamicImage, max_width: u32, max_strip_height: u32) -> Vec<Vec<u8>> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || max_width == 0 || max_strip_height == 0 {
        return Vec::new();
    }

    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, ((h as f64 * ratio) as u32).max(1))
    } else {
        (w, h)
    };

    let rgba = if (new_w, new_h) == (w, h) {
        image.to_rgba8()
    } else {
        image
            .resize_exact(new_w, new_h, image::imageops::FilterType::Nearest)
            .to_rgba8()
    };

    // yL/yH hold 16 bits
    let max_strip_height = max_strip_height.min(u16::MAX as u32);
    let x_bytes = new_w.div_ceil(8);
    let mut strips = Vec::new();
    let mut top = 0;

    while top < new_h {
        let rows = max_strip_height.min(new_h - top);
        let mut data = Vec::with_capacity(8 + (x_bytes * rows) as usize);

        // GS v 0 m xL xH yL yH
        data.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
        data.push(x_bytes as u8);
        data.push((x_bytes >> 8) as u8);
        data.push(rows as u8);
        data.push((rows >> 8) as u8);

        for y in top..top + rows {
            for x_byte in 0..x_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x < new_w {
                        let pixel = rgba.get_pixel(x, y);

                        // Transparent = white (0)
                        if pixel[3] >= 128 {
                            let luma = (0.299 * pixel[0] as f32
                                + 0.587 * pixel[1] as f32
                                + 0.114 * pixel[2] as f32) as u8;

                            if luma < 128 {
                                byte |= 1 << (7 - bit);
                            }
                        }
                    }
                }
                data.push(byte);
            }
        }

        strips.push(data);
        top += rows;
    }

    strips
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn black(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
    }

    #[test]
    fn test_builder_starts_with_init() {
        let mut b = EscPosBuilder::new();
        b.center().feed(2).cut();
        let data = b.build();
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        assert!(data.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_strips_respect_max_height() {
        let strips = raster_strips(&black(16, 2500), 576, 1000);
        assert_eq!(strips.len(), 3);

        let heights: Vec<u32> = strips
            .iter()
            .map(|s| s[6] as u32 | ((s[7] as u32) << 8))
            .collect();
        assert_eq!(heights, vec![1000, 1000, 500]);

        // 2 bytes per row, all black
        assert_eq!(strips[2].len(), 8 + 2 * 500);
        assert!(strips[2][8..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_strip_height_capped_at_header_range() {
        let strips = raster_strips(&black(8, 70_000), 576, 100_000);
        let heights: Vec<u32> = strips
            .iter()
            .map(|s| s[6] as u32 | ((s[7] as u32) << 8))
            .collect();
        assert_eq!(heights, vec![65_535, 4_465]);
    }

    #[test]
    fn test_wide_image_is_scaled_down() {
        let strips = raster_strips(&black(1152, 100), 576, 1000);
        assert_eq!(strips.len(), 1);
        // 576 / 8 = 72 bytes per row, height halved
        assert_eq!(strips[0][4], 72);
        assert_eq!(strips[0][6], 50);
    }

    #[test]
    fn test_transparent_pixels_are_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 1, Rgba([0, 0, 0, 0])));
        let strips = raster_strips(&img, 576, 1000);
        assert_eq!(strips[0][8], 0x00);
    }

    #[test]
    fn test_empty_image() {
        assert!(raster_strips(&black(0, 0), 576, 1000).is_empty());
    }
}
