//! Reconstructed frames handed to consumers.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── PixelFormat ──────────────────────────────────────────────────

/// Channel order of the 4-byte pixels in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Blue, Green, Red, Alpha (what desktop capture APIs produce).
    Bgra8,
    /// Red, Green, Blue, Alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One fully reassembled image.
///
/// Frames are immutable once built; `pixels` is reference-counted, so
/// cloning a frame does not copy the image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw interleaved pixel data.
    pub pixels: Bytes,
    /// Width in pixels, `0` when the transport did not carry it.
    pub width: u32,
    /// Height in pixels, `0` when the transport did not carry it.
    pub height: u32,
    /// Channel order of `pixels`.
    pub format: PixelFormat,
    /// Completion order within one receiver, starting at 0.
    pub sequence: u64,
    /// Time from metadata arrival to the last chunk.
    pub receive_duration: Duration,
}

impl Frame {
    /// Assembly time in fractional milliseconds.
    pub fn receive_duration_ms(&self) -> f64 {
        self.receive_duration.as_secs_f64() * 1000.0
    }

    /// Whether the frame carries its own dimensions.
    pub fn has_dimensions(&self) -> bool {
        self.width != 0 && self.height != 0
    }

    /// Byte length of the pixel buffer.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel data in RGBA order, swapping red and blue if needed.
    pub fn to_rgba(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8 => self.pixels.to_vec(),
            PixelFormat::Bgra8 => bgra_to_rgba(&self.pixels),
        }
    }
}

/// Swap the blue and red channels of every 4-byte pixel.
///
/// A trailing partial pixel is copied unchanged.
pub fn bgra_to_rgba(bgra: &[u8]) -> Vec<u8> {
    let mut rgba = bgra.to_vec();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    rgba
}
