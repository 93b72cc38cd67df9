//! Producer side of the wire format.
//!
//! The capture source is an external process; these senders speak the same
//! protocol so test sources and tools can feed a [`Receiver`](crate::Receiver).

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;

use crate::error::ScapError;
use crate::wire::{
    CHUNK_PREFIX_SIZE, DEFAULT_CHUNK_PAYLOAD, DEFAULT_STREAM_CHUNK_SIZE, DatagramMetadata,
    MAX_DATAGRAM_CHUNK_PAYLOAD, MAX_DATAGRAM_SIZE, SanityLimits, StreamMetadata, encode_chunk,
};

fn frame_shape(len: usize, chunk: usize, limits: &SanityLimits) -> Result<(u32, u32), ScapError> {
    let total_size = u32::try_from(len).unwrap_or(u32::MAX);
    let chunk_count = u32::try_from(len.div_ceil(chunk)).unwrap_or(u32::MAX);
    limits.check(total_size, chunk_count)?;
    Ok((total_size, chunk_count))
}

// ── StreamFrameSender ────────────────────────────────────────────

/// Writes frames as metadata + length-prefixed chunks to a byte stream.
#[derive(Debug)]
pub struct StreamFrameSender<W> {
    writer: W,
    chunk_size: usize,
    limits: SanityLimits,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> StreamFrameSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            limits: SanityLimits::default(),
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Split frames into chunks of at most `chunk_size` bytes (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_limits(mut self, limits: SanityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Write one frame and flush.
    pub async fn send_frame(&mut self, pixels: &[u8]) -> Result<(), ScapError> {
        let (total_size, chunk_count) = frame_shape(pixels.len(), self.chunk_size, &self.limits)?;
        let meta = StreamMetadata {
            total_size,
            chunk_count,
        };
        self.writer.write_all(&meta.encode()).await?;

        for chunk in pixels.chunks(self.chunk_size) {
            self.writer
                .write_all(&(chunk.len() as u32).to_le_bytes())
                .await?;
            self.writer.write_all(chunk).await?;
        }
        self.writer.flush().await?;

        self.frames_sent += 1;
        self.bytes_sent +=
            (StreamMetadata::SIZE + chunk_count as usize * CHUNK_PREFIX_SIZE + pixels.len()) as u64;
        Ok(())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Total bytes written, framing included.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ── DatagramFrameSender ──────────────────────────────────────────

/// Sends frames as a metadata datagram followed by packed chunk datagrams.
#[derive(Debug)]
pub struct DatagramFrameSender {
    socket: UdpSocket,
    remote: SocketAddr,
    chunk_payload: usize,
    chunks_per_datagram: usize,
    limits: SanityLimits,
    frames_sent: u64,
    bytes_sent: u64,
}

impl DatagramFrameSender {
    /// Wrap a bound socket targeting `remote`, using the default chunk payload.
    pub fn new(socket: UdpSocket, remote: SocketAddr) -> Self {
        Self {
            socket,
            remote,
            chunk_payload: DEFAULT_CHUNK_PAYLOAD,
            chunks_per_datagram: chunks_per_datagram(DEFAULT_CHUNK_PAYLOAD),
            limits: SanityLimits::default(),
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Override the chunk payload `C`; must match the receiver's.
    pub fn with_chunk_payload(mut self, chunk_payload: usize) -> Result<Self, ScapError> {
        if chunk_payload == 0 || chunk_payload > MAX_DATAGRAM_CHUNK_PAYLOAD {
            return Err(ScapError::Config(format!(
                "chunk payload must be within 1..={MAX_DATAGRAM_CHUNK_PAYLOAD}, got {chunk_payload}"
            )));
        }
        self.chunk_payload = chunk_payload;
        self.chunks_per_datagram = chunks_per_datagram(chunk_payload);
        Ok(self)
    }

    pub fn with_limits(mut self, limits: SanityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Send one frame. `width`/`height` may be `0` when unknown.
    pub async fn send_frame(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), ScapError> {
        let (total_size, chunk_count) =
            frame_shape(pixels.len(), self.chunk_payload, &self.limits)?;
        let meta = DatagramMetadata {
            width,
            height,
            total_size,
            chunk_count,
        };
        meta.validate(&self.limits)?;

        let mut sent = self.socket.send_to(&meta.encode(), self.remote).await?;

        let mut dgram =
            Vec::with_capacity(self.chunks_per_datagram * (CHUNK_PREFIX_SIZE + self.chunk_payload));
        let mut packed = 0;
        for (index, chunk) in pixels.chunks(self.chunk_payload).enumerate() {
            encode_chunk(index as u32, chunk, &mut dgram);
            packed += 1;
            if packed == self.chunks_per_datagram {
                sent += self.socket.send_to(&dgram, self.remote).await?;
                dgram.clear();
                packed = 0;
            }
        }
        if !dgram.is_empty() {
            sent += self.socket.send_to(&dgram, self.remote).await?;
        }

        self.frames_sent += 1;
        self.bytes_sent += sent as u64;
        Ok(())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Total bytes sent, framing included.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

/// How many `C`-sized chunks fit in one datagram.
pub fn chunks_per_datagram(chunk_payload: usize) -> usize {
    (MAX_DATAGRAM_SIZE / (CHUNK_PREFIX_SIZE + chunk_payload)).max(1)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::PackedChunks;

    #[tokio::test]
    async fn stream_sender_writes_wire_format() {
        let mut sender = StreamFrameSender::new(Vec::new()).with_chunk_size(4);
        sender.send_frame(&[1, 2, 3, 4, 5, 6]).await.unwrap();
        assert_eq!(sender.frames_sent(), 1);
        assert_eq!(sender.bytes_sent(), 8 + 4 + 4 + 4 + 2);

        let wire = sender.into_inner();
        assert_eq!(
            wire,
            vec![
                6, 0, 0, 0, 2, 0, 0, 0, // metadata
                4, 0, 0, 0, 1, 2, 3, 4, // chunk 0
                2, 0, 0, 0, 5, 6, // chunk 1
            ]
        );
    }

    #[tokio::test]
    async fn stream_sender_rejects_empty_frame() {
        let mut sender = StreamFrameSender::new(Vec::new());
        assert!(matches!(
            sender.send_frame(&[]).await,
            Err(ScapError::MalformedMetadata { .. })
        ));
        assert!(sender.into_inner().is_empty());
    }

    #[test]
    fn packing_factor() {
        assert_eq!(chunks_per_datagram(DEFAULT_CHUNK_PAYLOAD), 1);
        assert_eq!(chunks_per_datagram(4), MAX_DATAGRAM_SIZE / 8);
        assert_eq!(chunks_per_datagram(MAX_DATAGRAM_CHUNK_PAYLOAD), 1);
    }

    #[tokio::test]
    async fn datagram_sender_packs_chunks() {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sender = DatagramFrameSender::new(tx, rx.local_addr().unwrap())
            .with_chunk_payload(4)
            .unwrap();
        sender.send_frame(1, 2, &[1, 2, 3, 4, 5, 6, 7, 8]).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = rx.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            DatagramMetadata::decode(&buf[..len]),
            Some(DatagramMetadata {
                width: 1,
                height: 2,
                total_size: 8,
                chunk_count: 2
            })
        );

        let (len, _) = rx.recv_from(&mut buf).await.unwrap();
        let chunks: Vec<_> = PackedChunks::new(&buf[..len], 4).collect();
        assert_eq!(chunks, vec![(0, &[1u8, 2, 3, 4][..]), (1, &[5u8, 6, 7, 8][..])]);
        assert_eq!(sender.bytes_sent(), 16 + 16);
    }

    #[tokio::test]
    async fn datagram_sender_rejects_bad_payload_size() {
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = tx.local_addr().unwrap();
        assert!(DatagramFrameSender::new(tx, remote).with_chunk_payload(0).is_err());
    }
}
