//! Receiver binary configuration.

use std::path::Path;
use std::time::Duration;

use scapstream_core::TransportConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecvConfig {
    /// Transport and reassembly settings.
    pub transport: TransportConfig,
    /// Frame polling.
    pub viewer: ViewerConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// How the latest frame is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Interval between `latest_frame` polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Write the last frame's raw pixels here on exit. Empty disables.
    pub dump_path: String,
    /// Convert the dumped frame from BGRA to RGBA.
    pub dump_rgba: bool,
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

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            dump_path: String::new(),
            dump_rgba: false,
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

impl RecvConfig {
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

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.viewer.poll_interval_ms.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────
