//! Frame decoding on the reliable stream transport.
//!
//! Each frame is an 8-byte [`StreamMetadata`] header followed by
//! `chunk_count` length-prefixed chunks, concatenated in arrival order.
//! The stream carries no frame-boundary markers, so every failure here is
//! fatal for the connection: the reader cannot find the next frame.

use std::time::Instant;

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::error::ScapError;
use crate::frame::{Frame, PixelFormat};
use crate::reader::ExactReader;
use crate::wire::{SanityLimits, StreamMetadata, check_dimensions};

/// Decodes consecutive frames from an [`ExactReader`].
#[derive(Debug)]
pub struct StreamFrameDecoder {
    limits: SanityLimits,
    width: u32,
    height: u32,
    format: PixelFormat,
    next_sequence: u64,
}

impl StreamFrameDecoder {
    pub fn new(limits: SanityLimits) -> Self {
        Self {
            limits,
            width: 0,
            height: 0,
            format: PixelFormat::Bgra8,
            next_sequence: 0,
        }
    }

    /// Dimensions stamped on every decoded frame, since the stream
    /// metadata does not carry them. When both are non-zero, a frame whose
    /// size is not `width * height * 4` is [`ScapError::MalformedMetadata`].
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.next_sequence
    }

    /// Read and reassemble the next frame.
    ///
    /// The peer closing the stream at any point, including between frames,
    /// is [`ScapError::ConnectionLost`].
    pub async fn next_frame<R>(
        &mut self,
        reader: &mut ExactReader<R>,
    ) -> Result<Frame, ScapError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; StreamMetadata::SIZE];
        reader.read_into(&mut header).await?;
        let meta = StreamMetadata::decode(&header);
        self.limits.check(meta.total_size, meta.chunk_count)?;
        check_dimensions(self.width, self.height, meta.total_size, meta.chunk_count)?;

        let started = Instant::now();
        let total = meta.total_size as usize;
        let mut buffer = BytesMut::zeroed(total);
        let mut offset = 0usize;

        for index in 0..meta.chunk_count {
            let chunk_size = reader.read_u32_le().await? as usize;
            if chunk_size > total - offset {
                return Err(ScapError::IncompleteFrame {
                    expected: total,
                    actual: offset + chunk_size,
                });
            }
            reader
                .read_into(&mut buffer[offset..offset + chunk_size])
                .await?;
            offset += chunk_size;
            trace!(index, chunk_size, offset, "stream chunk");
        }

        if offset != total {
            return Err(ScapError::IncompleteFrame {
                expected: total,
                actual: offset,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Ok(Frame {
            pixels: buffer.freeze(),
            width: self.width,
            height: self.height,
            format: self.format,
            sequence,
            receive_duration: started.elapsed(),
        })
    }
}
