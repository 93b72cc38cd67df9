//! Exact-length reads over a byte stream.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ScapError;

/// Wraps a byte stream and reads precisely the number of bytes asked for.
///
/// A zero-byte read while a request is still short means the peer closed
/// the connection; that is reported as [`ScapError::ConnectionLost`]
/// and the partially filled buffer is discarded.
#[derive(Debug)]
pub struct ExactReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ExactReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Read exactly `n` bytes into a fresh buffer.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Bytes, ScapError> {
        let mut buf = BytesMut::zeroed(n);
        self.read_into(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Fill all of `dst`.
    pub async fn read_into(&mut self, dst: &mut [u8]) -> Result<(), ScapError> {
        let mut filled = 0;
        while filled < dst.len() {
            let n = self.inner.read(&mut dst[filled..]).await?;
            if n == 0 {
                return Err(ScapError::ConnectionLost {
                    expected: dst.len(),
                    received: filled,
                });
            }
            filled += n;
            self.bytes_read += n as u64;
        }
        Ok(())
    }

    /// Read a little-endian `u32`.
    pub async fn read_u32_le(&mut self) -> Result<u32, ScapError> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Total bytes consumed from the stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
