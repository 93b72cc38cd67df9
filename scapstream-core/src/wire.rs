//! Wire format shared by the capture source and the receiver.
//!
//! All integers are little-endian.
//!
//! ## Stream transport
//!
//! **Metadata** (8 bytes), then `chunk_count` sized chunks:
//! ```text
//! total_size:   u32  (4)
//! chunk_count:  u32  (4)
//! ── per chunk ──
//! chunk_size:   u32  (4)
//! data:         [u8] (chunk_size)
//! ```
//!
//! ## Datagram transport
//!
//! **Metadata datagram** (16 bytes):
//! ```text
//! width:        u32  (4)
//! height:       u32  (4)
//! total_size:   u32  (4)
//! chunk_count:  u32  (4)
//! ```
//!
//! **Data datagram**: one or more packed chunks, back to back:
//! ```text
//! chunk_index:  u32  (4)
//! data:         [u8] (min(remaining, C))
//! ```
//! Chunk `i` lands at offset `i * C` in the frame buffer. Every chunk but
//! the last of a frame carries exactly `C` bytes, which is what lets a
//! packed datagram be split without per-chunk lengths.

use crate::error::ScapError;

// ── Constants ────────────────────────────────────────────────────

/// Size of the stream metadata header.
pub const STREAM_METADATA_SIZE: usize = 8;

/// Size of the datagram metadata packet.
pub const DATAGRAM_METADATA_SIZE: usize = 16;

/// Size of a chunk-size (stream) or chunk-index (datagram) prefix.
pub const CHUNK_PREFIX_SIZE: usize = 4;

/// Largest frame accepted: one 1080p BGRA image.
pub const MAX_TOTAL_SIZE: u32 = 1920 * 1080 * 4;

/// Largest chunk count accepted.
pub const MAX_CHUNK_COUNT: u32 = 1000;

/// Default datagram chunk payload `C`.
pub const DEFAULT_CHUNK_PAYLOAD: usize = 60_000;

/// Default chunk size used by the stream sender.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 256 * 1024;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest `C` that still fits one chunk per datagram.
pub const MAX_DATAGRAM_CHUNK_PAYLOAD: usize = MAX_DATAGRAM_SIZE - CHUNK_PREFIX_SIZE;

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

// ── SanityLimits ─────────────────────────────────────────────────

/// Ceilings applied to declared frame metadata before allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanityLimits {
    pub max_total_size: u32,
    pub max_chunk_count: u32,
}

impl Default for SanityLimits {
    fn default() -> Self {
        Self {
            max_total_size: MAX_TOTAL_SIZE,
            max_chunk_count: MAX_CHUNK_COUNT,
        }
    }
}

impl SanityLimits {
    /// Reject empty frames and anything above the ceilings.
    pub fn check(&self, total_size: u32, chunk_count: u32) -> Result<(), ScapError> {
        if total_size == 0
            || chunk_count == 0
            || total_size > self.max_total_size
            || chunk_count > self.max_chunk_count
        {
            return Err(ScapError::MalformedMetadata {
                total_size,
                chunk_count,
            });
        }
        Ok(())
    }
}

// ── StreamMetadata ───────────────────────────────────────────────

/// Per-frame header on the stream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    pub total_size: u32,
    pub chunk_count: u32,
}

impl StreamMetadata {
    pub const SIZE: usize = STREAM_METADATA_SIZE;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.total_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8; Self::SIZE]) -> Self {
        Self {
            total_size: read_u32(data, 0),
            chunk_count: read_u32(data, 4),
        }
    }
}

// ── DatagramMetadata ─────────────────────────────────────────────

/// Per-frame metadata packet on the datagram transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramMetadata {
    pub width: u32,
    pub height: u32,
    pub total_size: u32,
    pub chunk_count: u32,
}

impl DatagramMetadata {
    pub const SIZE: usize = DATAGRAM_METADATA_SIZE;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.width.to_le_bytes());
        buf[4..8].copy_from_slice(&self.height.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    /// Parse a datagram as metadata. Returns `None` unless it is exactly
    /// [`DATAGRAM_METADATA_SIZE`] bytes long.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            width: read_u32(data, 0),
            height: read_u32(data, 4),
            total_size: read_u32(data, 8),
            chunk_count: read_u32(data, 12),
        })
    }

    /// Apply the sanity ceilings, plus a dimension check when the sender
    /// declared non-zero dimensions.
    pub fn validate(&self, limits: &SanityLimits) -> Result<(), ScapError> {
        limits.check(self.total_size, self.chunk_count)?;
        check_dimensions(self.width, self.height, self.total_size, self.chunk_count)
    }
}

/// Frame size implied by 4-byte pixels, widened so it cannot overflow.
pub fn pixel_bytes(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * 4
}

/// A frame with non-zero dimensions must hold exactly `width * height * 4`
/// bytes. Zero in either dimension means "unknown" and is not checked.
pub fn check_dimensions(
    width: u32,
    height: u32,
    total_size: u32,
    chunk_count: u32,
) -> Result<(), ScapError> {
    if width != 0 && height != 0 && pixel_bytes(width, height) != u64::from(total_size) {
        return Err(ScapError::MalformedMetadata {
            total_size,
            chunk_count,
        });
    }
    Ok(())
}

// ── Packed chunks ────────────────────────────────────────────────

/// Append one `(index, payload)` chunk to a data datagram.
pub fn encode_chunk(index: u32, payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(payload);
}

/// Iterator over the chunks packed into one data datagram.
///
/// Each chunk is a 4-byte index followed by up to `chunk_payload` bytes.
/// A trailing fragment shorter than a prefix, or a prefix with no payload,
/// ends iteration.
#[derive(Debug, Clone)]
pub struct PackedChunks<'a> {
    data: &'a [u8],
    chunk_payload: usize,
}

impl<'a> PackedChunks<'a> {
    pub fn new(data: &'a [u8], chunk_payload: usize) -> Self {
        Self {
            data,
            chunk_payload,
        }
    }
}

impl<'a> Iterator for PackedChunks<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() <= CHUNK_PREFIX_SIZE {
            self.data = &[];
            return None;
        }
        let index = read_u32(self.data, 0);
        let rest = &self.data[CHUNK_PREFIX_SIZE..];
        let take = rest.len().min(self.chunk_payload);
        let (payload, tail) = rest.split_at(take);
        self.data = tail;
        Some((index, payload))
    }
}

// ── Tests ────────────────────────────────────────────────────────
