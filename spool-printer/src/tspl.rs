//! TSPL label command builder
//!
//! TSPL is a line-based command language; every command is ASCII text
//! terminated by `\n`, except the binary payload of `BITMAP`.

use crate::bitmap;

/// Label stock width used by [`label_command`]
pub const LABEL_WIDTH_MM: u32 = 50;
/// Label stock height used by [`label_command`]
pub const LABEL_HEIGHT_MM: u32 = 30;
/// Gap between labels used by [`label_command`]
pub const LABEL_GAP_MM: u32 = 2;

/// TSPL command builder
pub struct TsplBuilder {
    buf: Vec<u8>,
}

impl TsplBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
        }
    }

    fn command(&mut self, cmd: &str) -> &mut Self {
        self.buf.extend_from_slice(cmd.as_bytes());
        self.buf.push(b'\n');
        self
    }

    /// Label stock size in millimetres
    pub fn size(&mut self, width_mm: u32, height_mm: u32) -> &mut Self {
        self.command(&format!("SIZE {} mm,{} mm", width_mm, height_mm))
    }

    /// Gap between labels and its offset, in millimetres
    pub fn gap(&mut self, gap_mm: u32, offset_mm: u32) -> &mut Self {
        self.command(&format!("GAP {} mm,{} mm", gap_mm, offset_mm))
    }

    /// Clear the image buffer
    pub fn cls(&mut self) -> &mut Self {
        self.command("CLS")
    }

    /// Draw a packed bitmap (see [`bitmap::encode`]) at `(x, y)` in OVERWRITE mode
    pub fn bitmap(&mut self, x: u32, y: u32, width: u32, height: u32, data: &[u8]) -> &mut Self {
        let header = format!(
            "BITMAP {},{},{},{},0,",
            x,
            y,
            bitmap::bytes_per_row(width),
            height
        );
        self.command(&header);
        self.buf.extend_from_slice(data);
        self.buf.push(b'\n');
        self
    }

    /// Print `sets` label sets, `copies` copies each
    pub fn print(&mut self, sets: u32, copies: u32) -> &mut Self {
        self.command(&format!("PRINT {},{}", sets, copies))
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for TsplBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Full single-label job for a packed bitmap of `width` x `height` dots
///
/// `SIZE 50 mm,30 mm`, `GAP 2 mm,0 mm`, `CLS`, the bitmap at the origin and
/// `PRINT 1,1`.
pub fn label_command(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut builder = TsplBuilder::new();
    builder
        .size(LABEL_WIDTH_MM, LABEL_HEIGHT_MM)
        .gap(LABEL_GAP_MM, 0)
        .cls()
        .bitmap(0, 0, width, height, data)
        .print(1, 1);
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_command_layout() {
        let data = vec![0xAA; 9 * 2];
        let out = label_command(&data, 72, 2);

        let preamble = b"SIZE 50 mm,30 mm\nGAP 2 mm,0 mm\nCLS\nBITMAP 0,0,9,2,0,\n";
        assert!(out.starts_with(preamble));
        assert_eq!(&out[preamble.len()..preamble.len() + data.len()], &data[..]);
        assert!(out.ends_with(b"\nPRINT 1,1\n"));
        assert_eq!(out.len(), preamble.len() + data.len() + b"\nPRINT 1,1\n".len());
    }

    #[test]
    fn test_bitmap_rounds_row_bytes_up() {
        let mut b = TsplBuilder::new();
        b.bitmap(10, 20, 13, 3, &[0u8; 6]);
        let out = b.build();
        assert!(out.starts_with(b"BITMAP 10,20,2,3,0,\n"));
    }
}
