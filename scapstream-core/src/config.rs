//! Transport configuration for a [`Receiver`](crate::Receiver).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScapError;
use crate::frame::PixelFormat;
use crate::wire::{
    DEFAULT_CHUNK_PAYLOAD, MAX_CHUNK_COUNT, MAX_DATAGRAM_CHUNK_PAYLOAD, MAX_TOTAL_SIZE,
    pixel_bytes,
};

/// Which transport discipline the capture source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Reliable, ordered byte stream (TCP).
    Stream,
    /// Unreliable datagrams (UDP).
    Datagram,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Datagram => write!(f, "datagram"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = ScapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" | "tcp" => Ok(Self::Stream),
            "datagram" | "udp" => Ok(Self::Datagram),
            other => Err(ScapError::Config(format!("unknown transport {other:?}"))),
        }
    }
}

/// Receiver-side transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport discipline.
    pub transport: TransportKind,
    /// Address to bind (e.g. `127.0.0.1` or `0.0.0.0`).
    pub listen_address: String,
    /// Port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// Datagram chunk payload size `C`; must match the sender.
    pub chunk_payload_size: usize,
    /// Per-frame deadline for datagram reassembly, in milliseconds.
    pub frame_timeout_ms: u64,
    /// Frames per statistics window.
    pub stats_window: u32,
    /// Largest accepted frame, in bytes.
    pub max_total_size: u32,
    /// Largest accepted chunk count.
    pub max_chunk_count: u32,
    /// Frame width for the stream transport, which does not carry it (`0` = unknown).
    pub frame_width: u32,
    /// Frame height for the stream transport (`0` = unknown).
    pub frame_height: u32,
    /// Channel layout of received pixels.
    pub pixel_format: PixelFormat,
    /// Capacity of the receiver event channel.
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stream,
            listen_address: "127.0.0.1".into(),
            port: 12345,
            chunk_payload_size: DEFAULT_CHUNK_PAYLOAD,
            frame_timeout_ms: 1000,
            stats_window: 30,
            max_total_size: MAX_TOTAL_SIZE,
            max_chunk_count: MAX_CHUNK_COUNT,
            frame_width: 0,
            frame_height: 0,
            pixel_format: PixelFormat::Bgra8,
            event_capacity: 64,
        }
    }
}

impl TransportConfig {
    /// Default settings for the given transport.
    pub fn for_transport(transport: TransportKind) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    /// `listen_address:port` as a bindable string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// Per-frame datagram deadline.
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Reject settings the decoders cannot work with.
    pub fn validate(&self) -> Result<(), ScapError> {
        if self.chunk_payload_size == 0 || self.chunk_payload_size > MAX_DATAGRAM_CHUNK_PAYLOAD {
            return Err(ScapError::Config(format!(
                "chunk_payload_size must be within 1..={MAX_DATAGRAM_CHUNK_PAYLOAD}, got {}",
                self.chunk_payload_size
            )));
        }
        if self.frame_timeout_ms == 0 {
            return Err(ScapError::Config("frame_timeout_ms must be non-zero".into()));
        }
        if self.stats_window == 0 {
            return Err(ScapError::Config("stats_window must be non-zero".into()));
        }
        if self.max_total_size == 0 || self.max_chunk_count == 0 {
            return Err(ScapError::Config("sanity ceilings must be non-zero".into()));
        }
        if (self.frame_width == 0) != (self.frame_height == 0) {
            return Err(ScapError::Config(format!(
                "frame_width and frame_height must both be set or both be 0, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if pixel_bytes(self.frame_width, self.frame_height) > u64::from(self.max_total_size) {
            return Err(ScapError::Config(format!(
                "{}x{} frames exceed max_total_size {}",
                self.frame_width, self.frame_height, self.max_total_size
            )));
        }
        if self.event_capacity == 0 {
            return Err(ScapError::Config("event_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TransportConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:12345");
        assert_eq!(cfg.frame_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.stats_window, 30);
    }

    #[test]
    fn rejects_oversized_chunk_payload() {
        let cfg = TransportConfig {
            chunk_payload_size: 70_000,
            ..TransportConfig::for_transport(TransportKind::Datagram)
        };
        assert!(matches!(cfg.validate(), Err(ScapError::Config(_))));
    }

    #[test]
    fn rejects_zero_window() {
        let cfg = TransportConfig {
            stats_window: 0,
            ..TransportConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_half_known_dimensions() {
        let cfg = TransportConfig {
            frame_width: 1920,
            ..TransportConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ScapError::Config(_))));
    }

    #[test]
    fn rejects_dimensions_above_ceiling() {
        let cfg = TransportConfig {
            frame_width: 1920,
            frame_height: 1080,
            max_total_size: 1920 * 1080 * 4 - 1,
            ..TransportConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ScapError::Config(_))));

        let cfg = TransportConfig {
            frame_width: 1920,
            frame_height: 1080,
            ..TransportConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn transport_from_str() {
        assert_eq!("udp".parse::<TransportKind>().unwrap(), TransportKind::Datagram);
        assert_eq!("Stream".parse::<TransportKind>().unwrap(), TransportKind::Stream);
        assert!("quic".parse::<TransportKind>().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: TransportConfig = toml::from_str(
            r#"
            transport = "datagram"
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transport, TransportKind::Datagram);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.chunk_payload_size, DEFAULT_CHUNK_PAYLOAD);
        assert_eq!(cfg.pixel_format, PixelFormat::Bgra8);
    }
}
