//! scapstream test-pattern source: entry point.
//!
//! ```text
//! scapstream-pattern                       Send 1280x720 @ 30 fps over TCP
//! scapstream-pattern --transport udp       Send datagrams instead
//! scapstream-pattern --fps 60 --frames 600 Send 600 frames at 60 fps
//! scapstream-pattern --config <path>       Load a custom config TOML
//! scapstream-pattern --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scapstream_core::TransportKind;
use scapstream_pattern::config::PatternConfig;
use scapstream_pattern::source::PatternSource;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scapstream-pattern", about = "Synthetic scapstream capture source")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scapstream-pattern.toml")]
    config: PathBuf,

    /// Transport: "stream"/"tcp" or "datagram"/"udp" (overrides config).
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Receiver address as host:port (overrides config).
    #[arg(short, long)]
    target: Option<String>,

    /// Target frames per second (overrides config).
    #[arg(long)]
    fps: Option<u32>,

    /// Frame width (overrides config).
    #[arg(long)]
    width: Option<u32>,

    /// Frame height (overrides config).
    #[arg(long)]
    height: Option<u32>,

    /// Stop after this many frames; 0 runs until Ctrl-C (overrides config).
    #[arg(long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&PatternConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = PatternConfig::load(&cli.config);
    if let Some(transport) = cli.transport {
        config.target.transport = transport;
    }
    if let Some(target) = cli.target {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or("target must be host:port")?;
        config.target.address = host.trim_matches(['[', ']']).to_string();
        config.target.port = port.parse()?;
    }
    if let Some(fps) = cli.fps {
        config.pattern.fps = fps;
    }
    if let Some(width) = cli.width {
        config.pattern.width = width;
    }
    if let Some(height) = cli.height {
        config.pattern.height = height;
    }
    if let Some(frames) = cli.frames {
        config.pattern.frames = frames;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    info!("scapstream-pattern v{}", env!("CARGO_PKG_VERSION"));
    origin.report(&cli.config);
    info!("target: {} ({})", config.target_addr(), config.target.transport);
    info!(
        "pattern: {}x{} @ {} fps",
        config.pattern.width, config.pattern.height, config.pattern.fps
    );

    let mut source = PatternSource::new(config)?;
    let stop = source.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let report = source.run().await?;
    info!(
        "sent {} frames ({} late, {} dropped), {:.1} MB total",
        report.frames_sent,
        report.frames_late,
        report.frames_dropped,
        report.bytes_sent as f64 / 1_000_000.0
    );

    Ok(())
}
