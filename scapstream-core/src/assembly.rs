//! Reconstruction state for one in-flight datagram frame.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

/// What happened to a chunk offered to [`FrameAssemblyState::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Copied into the buffer; carries the number of bytes written.
    Placed(usize),
    /// The index was already received.
    Duplicate,
    /// The index is outside `[0, expected_chunks)`.
    OutOfRange,
}

/// Mutable context for reassembling one frame from indexed chunks.
///
/// Chunk `i` lands at `i * chunk_payload`. Late or oversized chunks are
/// truncated at the end of the buffer rather than rejected.
#[derive(Debug)]
pub struct FrameAssemblyState {
    total_size: usize,
    expected_chunks: u32,
    chunk_payload: usize,
    received: HashSet<u32>,
    buffer: BytesMut,
    bytes_copied: usize,
    started_at: Instant,
}

impl FrameAssemblyState {
    /// Start a frame of `total_size` bytes split into `expected_chunks`.
    pub fn new(total_size: u32, expected_chunks: u32, chunk_payload: usize) -> Self {
        let total_size = total_size as usize;
        Self {
            total_size,
            expected_chunks,
            chunk_payload,
            received: HashSet::with_capacity(expected_chunks as usize),
            buffer: BytesMut::zeroed(total_size),
            bytes_copied: 0,
            started_at: Instant::now(),
        }
    }

    /// Copy one chunk into place. Duplicate and out-of-range indices leave
    /// the state untouched.
    pub fn place(&mut self, index: u32, data: &[u8]) -> Placement {
        if index >= self.expected_chunks {
            return Placement::OutOfRange;
        }
        if self.received.contains(&index) {
            return Placement::Duplicate;
        }

        let offset = (index as usize).saturating_mul(self.chunk_payload);
        let len = data.len().min(self.total_size.saturating_sub(offset));
        if len > 0 {
            self.buffer[offset..offset + len].copy_from_slice(&data[..len]);
        }
        self.received.insert(index);
        self.bytes_copied += len;
        Placement::Placed(len)
    }

    /// Every expected index has arrived.
    pub fn is_complete(&self) -> bool {
        self.received.len() == self.expected_chunks as usize
    }

    /// The copied bytes add up to the declared size.
    pub fn is_fully_covered(&self) -> bool {
        self.bytes_copied == self.total_size
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn expected_chunks(&self) -> u32 {
        self.expected_chunks
    }

    pub fn received_chunks(&self) -> usize {
        self.received.len()
    }

    pub fn bytes_copied(&self) -> usize {
        self.bytes_copied
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Hand over the buffer and the time spent assembling it.
    pub fn finish(self) -> (Bytes, Duration) {
        (self.buffer.freeze(), self.started_at.elapsed())
    }
}
