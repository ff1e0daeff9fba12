//! Display sink boundary and the watermark compositor.
//!
//! The sink is borrowed by the session for its whole lifetime; the core only
//! tells it when surfaces come and go and hands it decoded frames. The
//! watermark stage runs before encoding: it copies the captured pixels into
//! an intermediate surface, stamps a fixed text label, and re-wraps the
//! result as a new frame carrying the original capture timestamp.

use bytes::Bytes;

use crate::codec::RawFrame;
use crate::frame::PeerId;

/// Where decoded video goes. Implementations own presentation resources
/// (canvases, windows, textures); the session never frees or recreates them.
pub trait DisplaySink {
    /// A peer joined; prepare a surface for it.
    fn add_surface(&mut self, peer: PeerId);
    /// A peer left; tear its surface down.
    fn remove_surface(&mut self, peer: PeerId);
    /// Present one decoded frame. The sink takes ownership.
    fn present(&mut self, peer: PeerId, frame: RawFrame);
    /// Local preview of a captured frame, before encoding.
    fn present_selfie(&mut self, _frame: &RawFrame) {}
}

/// Composites a fixed text label onto outbound frames.
#[derive(Debug, Clone)]
pub struct Watermark {
    label: String,
}

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const SCALE: u32 = 2;
const MARGIN: u32 = 8;

impl Watermark {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into().to_uppercase(),
        }
    }

    /// Stamp the label into a copy of the frame's pixels. Dimensions and the
    /// capture timestamp carry over unchanged.
    pub fn apply(&self, frame: RawFrame) -> RawFrame {
        let mut pixels = frame.data.to_vec();
        self.stamp(&mut pixels, frame.width, frame.height);
        RawFrame {
            width: frame.width,
            height: frame.height,
            timestamp_us: frame.timestamp_us,
            data: Bytes::from(pixels),
        }
    }

    /// Draw the label bottom-left in opaque white, RGBA8.
    fn stamp(&self, pixels: &mut [u8], width: u32, height: u32) {
        let glyph_h = GLYPH_H * SCALE;
        if height < glyph_h + MARGIN {
            return;
        }
        let base_y = height - glyph_h - MARGIN;
        let mut pen_x = MARGIN;
        for ch in self.label.chars() {
            let rows = glyph(ch);
            for (gy, row) in rows.iter().enumerate() {
                for gx in 0..GLYPH_W {
                    if row & (0b10000 >> gx) == 0 {
                        continue;
                    }
                    for sy in 0..SCALE {
                        for sx in 0..SCALE {
                            let x = pen_x + gx * SCALE + sx;
                            let y = base_y + gy as u32 * SCALE + sy;
                            if x >= width || y >= height {
                                continue;
                            }
                            let idx = ((y * width + x) * 4) as usize;
                            if idx + 3 < pixels.len() {
                                pixels[idx] = 0xFF;
                                pixels[idx + 1] = 0xFF;
                                pixels[idx + 2] = 0xFF;
                                pixels[idx + 3] = 0xFF;
                            }
                        }
                    }
                }
            }
            pen_x += (GLYPH_W + 1) * SCALE;
        }
    }
}

/// 5x7 block font, one bitmask row per scanline.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        ' ' => [0; 7],
        _ => [0b11111; 7],
    }
}
