//! Monochrome bitmap encoding for label printers
//!
//! Label printers take a 1-bit bitmap, 8 horizontal dots per byte, most
//! significant bit first. TSPL prints a dot for every **cleared** bit, so the
//! encoder writes `1` for paper and `0` for ink.

use image::{DynamicImage, GenericImageView};
use image::imageops::FilterType;

/// Luminance cutoff applied after inversion
pub const THRESHOLD: u8 = 128;

/// Bytes needed for one bitmap row of `width` dots
pub fn bytes_per_row(width: u32) -> usize {
    width.div_ceil(8) as usize
}

/// Encoded length for a `width` x `height` bitmap
pub fn encoded_len(width: u32, height: u32) -> usize {
    bytes_per_row(width) * height as usize
}

/// Encode an image into a packed monochrome bitmap
///
/// The image is resized to exactly `width` x `height`, converted to
/// grayscale, inverted and thresholded at [`THRESHOLD`]. The output always
/// has `ceil(width / 8) * height` bytes; trailing bits of each row are paper.
pub fn encode(image: &DynamicImage, width: u32, height: u32) -> Vec<u8> {
    let row_bytes = bytes_per_row(width);
    let mut out = vec![0u8; encoded_len(width, height)];
    if out.is_empty() {
        return out;
    }

    let gray = if image.dimensions() == (width, height) {
        image.to_luma8()
    } else {
        image
            .resize_exact(width, height, FilterType::Triangle)
            .to_luma8()
    };

    for (x, y, pixel) in gray.enumerate_pixels() {
        let inverted = 255 - pixel[0];
        let ink = inverted >= THRESHOLD;
        if !ink {
            out[y as usize * row_bytes + x as usize / 8] |= 0x80 >> (x % 8);
        }
    }

    // Padding dots past the image edge stay blank
    let pad = row_bytes * 8 - width as usize;
    if pad > 0 {
        let mask = (1u8 << pad) - 1;
        for row in out.chunks_mut(row_bytes) {
            if let Some(last) = row.last_mut() {
                *last |= mask;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn split_image(width: u32, height: u32) -> DynamicImage {
        // Left half black, right half white
        let img = GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 { Luma([0]) } else { Luma([255]) }
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_length_matches_dimensions() {
        let img = split_image(100, 50);
        assert_eq!(encode(&img, 72, 384).len(), 9 * 384);
        assert_eq!(encode(&img, 13, 7).len(), 2 * 7);
        assert_eq!(encode(&img, 400, 240).len(), 50 * 240);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let img = split_image(321, 123);
        let a = encode(&img, 72, 384);
        let b = encode(&img, 72, 384);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dark_pixels_clear_bits() {
        let img = split_image(16, 2);
        let data = encode(&img, 16, 2);
        // Each row: first byte black (ink = 0), second byte white (paper = 1)
        assert_eq!(data, vec![0x00, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn test_row_padding_is_blank() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 1, Luma([0])));
        let data = encode(&img, 10, 1);
        assert_eq!(data, vec![0x00, 0x3F]);
    }

    #[test]
    fn test_zero_size() {
        let img = split_image(8, 8);
        assert!(encode(&img, 0, 10).is_empty());
        assert!(encode(&img, 10, 0).is_empty());
    }
}
