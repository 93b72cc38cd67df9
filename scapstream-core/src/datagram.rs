//! Frame decoding on the lossy datagram transport.
//!
//! A frame starts with a 16-byte [`DatagramMetadata`] packet, followed by
//! data datagrams carrying packed, indexed chunks. Datagrams may be lost,
//! duplicated or reordered; a frame that does not complete within the
//! per-frame timeout is abandoned and the decoder waits for the next
//! metadata packet. Losing a frame is routine here and is reported as
//! `Ok(None)`, never as an error.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::assembly::{FrameAssemblyState, Placement};
use crate::error::ScapError;
use crate::frame::{Frame, PixelFormat};
use crate::wire::{DatagramMetadata, MAX_DATAGRAM_SIZE, PackedChunks, SanityLimits};

// ── DatagramSource ───────────────────────────────────────────────

/// Packet-oriented connection the datagram decoder reads from.
#[async_trait]
pub trait DatagramSource: Send {
    /// Wait for the next datagram and copy it into `buf`.
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Take an already-queued datagram without waiting, if there is one.
    fn try_recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, _) = self.recv_from(buf).await?;
        Ok(len)
    }

    fn try_recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.try_recv_from(buf) {
            Ok((len, _)) => Ok(Some(len)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ── DatagramFrameDecoder ─────────────────────────────────────────

/// Reassembles frames from a [`DatagramSource`], one frame at a time.
#[derive(Debug)]
pub struct DatagramFrameDecoder {
    limits: SanityLimits,
    chunk_payload: usize,
    timeout: Duration,
    format: PixelFormat,
    buf: Vec<u8>,
    /// Metadata found while draining an abandoned frame.
    pending: Option<DatagramMetadata>,
    next_sequence: u64,
    abandoned: u64,
    discarded: u64,
}

impl DatagramFrameDecoder {
    /// `chunk_payload` is the protocol constant `C` agreed with the sender.
    pub fn new(limits: SanityLimits, chunk_payload: usize, timeout: Duration) -> Self {
        Self {
            limits,
            chunk_payload,
            timeout,
            format: PixelFormat::Bgra8,
            buf: vec![0u8; MAX_DATAGRAM_SIZE + 1],
            pending: None,
            next_sequence: 0,
            abandoned: 0,
            discarded: 0,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.next_sequence
    }

    /// Frames given up on (timeout or byte-count mismatch).
    pub fn abandoned_frames(&self) -> u64 {
        self.abandoned
    }

    /// Stray datagrams dropped while waiting for metadata.
    pub fn discarded_datagrams(&self) -> u64 {
        self.discarded
    }

    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` when the frame was abandoned; the decoder is then
    /// ready for a fresh metadata packet. Only transport errors are `Err`.
    pub async fn next_frame<S>(&mut self, source: &mut S) -> Result<Option<Frame>, ScapError>
    where
        S: DatagramSource + ?Sized,
    {
        let meta = self.await_metadata(source).await?;
        let mut state =
            FrameAssemblyState::new(meta.total_size, meta.chunk_count, self.chunk_payload);
        let deadline = tokio::time::Instant::now() + self.timeout;

        while !state.is_complete() {
            let recv = tokio::time::timeout_at(deadline, source.recv_datagram(&mut self.buf));
            let len = match recv.await {
                Ok(res) => res?,
                Err(_) => {
                    let reason = ScapError::Timeout(self.timeout);
                    self.abandon(&state, &reason);
                    self.drain(source)?;
                    return Ok(None);
                }
            };

            for (index, payload) in PackedChunks::new(&self.buf[..len], self.chunk_payload) {
                match state.place(index, payload) {
                    Placement::Placed(n) => trace!(index, bytes = n, "datagram chunk"),
                    Placement::Duplicate => trace!(index, "duplicate chunk"),
                    Placement::OutOfRange => trace!(index, "chunk index out of range"),
                }
            }
        }

        if !state.is_fully_covered() {
            let reason = ScapError::IncompleteFrame {
                expected: state.total_size(),
                actual: state.bytes_copied(),
            };
            self.abandon(&state, &reason);
            return Ok(None);
        }

        let (pixels, receive_duration) = state.finish();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Ok(Some(Frame {
            pixels,
            width: meta.width,
            height: meta.height,
            format: self.format,
            sequence,
            receive_duration,
        }))
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn await_metadata<S>(&mut self, source: &mut S) -> Result<DatagramMetadata, ScapError>
    where
        S: DatagramSource + ?Sized,
    {
        if let Some(meta) = self.pending.take() {
            return Ok(meta);
        }
        loop {
            let len = source.recv_datagram(&mut self.buf).await?;
            if let Some(meta) = self.plausible_metadata(len) {
                return Ok(meta);
            }
            self.discarded += 1;
        }
    }

    fn plausible_metadata(&self, len: usize) -> Option<DatagramMetadata> {
        let meta = DatagramMetadata::decode(&self.buf[..len])?;
        match meta.validate(&self.limits) {
            Ok(()) => Some(meta),
            Err(e) => {
                debug!("discarding metadata: {e}");
                None
            }
        }
    }

    /// Drop datagrams already queued for the abandoned frame, keeping the
    /// first plausible metadata packet for the next call.
    fn drain<S>(&mut self, source: &mut S) -> Result<(), ScapError>
    where
        S: DatagramSource + ?Sized,
    {
        while let Some(len) = source.try_recv_datagram(&mut self.buf)? {
            if let Some(meta) = self.plausible_metadata(len) {
                self.pending = Some(meta);
                break;
            }
            self.discarded += 1;
        }
        Ok(())
    }

    fn abandon(&mut self, state: &FrameAssemblyState, reason: &ScapError) {
        self.abandoned += 1;
        debug!(
            received = state.received_chunks(),
            expected = state.expected_chunks(),
            elapsed_ms = state.elapsed().as_millis() as u64,
            "abandoning frame: {reason}"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────
