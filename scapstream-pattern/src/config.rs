//! Configuration for the test-pattern source.

use std::path::Path;
use std::time::Duration;

use scapstream_core::wire::{DEFAULT_CHUNK_PAYLOAD, DEFAULT_STREAM_CHUNK_SIZE};
use scapstream_core::{ScapError, TransportKind};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Where and how frames are sent.
    pub target: TargetConfig,
    /// What is sent.
    pub pattern: PatternSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Receiver address and transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Transport discipline.
    pub transport: TransportKind,
    /// Receiver host.
    pub address: String,
    /// Receiver port.
    pub port: u16,
    /// Datagram chunk payload size `C`; must match the receiver.
    pub chunk_payload_size: usize,
    /// Chunk size used on the stream transport.
    pub stream_chunk_size: usize,
}

/// Frame geometry and rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    pub width: u32,
    pub height: u32,
    /// Target frames per second (1..=240).
    pub fps: u32,
    /// Stop after this many frames. `0` runs until interrupted.
    pub frames: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stream,
            address: "127.0.0.1".into(),
            port: 12345,
            chunk_payload_size: DEFAULT_CHUNK_PAYLOAD,
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
        }
    }
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            frames: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File,
    Missing,
    /// The file exists but did not parse; defaults were used.
    Invalid(String),
}

impl ConfigOrigin {
    pub fn report(&self, path: &Path) {
        match self {
            Self::File => tracing::info!("loaded config from {}", path.display()),
            Self::Missing => tracing::info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl PatternConfig {
    /// Load from a TOML file, falling back to defaults.
    ///
    /// Nothing is logged here; the caller reports the [`ConfigOrigin`]
    /// once its subscriber is installed.
    pub fn load(path: &Path) -> (Self, ConfigOrigin) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigOrigin::File),
                Err(e) => (Self::default(), ConfigOrigin::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigOrigin::Missing),
        }
    }

    /// `address:port` of the receiver.
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target.address, self.target.port)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.pattern.fps.max(1)))
    }

    /// Reject settings that would produce frames the receiver refuses.
    pub fn validate(&self) -> Result<(), ScapError> {
        let p = &self.pattern;
        if !(1..=240).contains(&p.fps) {
            return Err(ScapError::Config(format!("fps must be within 1..=240, got {}", p.fps)));
        }
        if p.width == 0 || p.height == 0 {
            return Err(ScapError::Config("frame dimensions must be non-zero".into()));
        }
        let total = u64::from(p.width) * u64::from(p.height) * 4;
        if total > u64::from(scapstream_core::MAX_TOTAL_SIZE) {
            return Err(ScapError::Config(format!(
                "{}x{} frames exceed the {} byte ceiling",
                p.width,
                p.height,
                scapstream_core::MAX_TOTAL_SIZE
            )));
        }
        let chunk = match self.target.transport {
            TransportKind::Stream => self.target.stream_chunk_size,
            TransportKind::Datagram => self.target.chunk_payload_size,
        };
        if chunk == 0 {
            return Err(ScapError::Config("chunk size must be non-zero".into()));
        }
        let chunks = total.div_ceil(chunk as u64);
        if chunks > u64::from(scapstream_core::MAX_CHUNK_COUNT) {
            return Err(ScapError::Config(format!(
                "{chunks} chunks per frame exceed the {} chunk ceiling",
                scapstream_core::MAX_CHUNK_COUNT
            )));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
