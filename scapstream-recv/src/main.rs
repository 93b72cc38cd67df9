//! scapstream receiver: entry point.
//!
//! ```text
//! scapstream-recv                      Listen with defaults (TCP 127.0.0.1:12345)
//! scapstream-recv --transport udp      Receive datagrams instead
//! scapstream-recv --config <path>      Use custom config TOML
//! scapstream-recv --gen-config         Dump default config and exit
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scapstream_core::{Receiver, ReceiverEvent, TransportKind};
use scapstream_recv::config::{LoggingConfig, RecvConfig};
use scapstream_recv::monitor::{FrameMonitor, dump_frame};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scapstream-recv", about = "Headless scapstream frame receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scapstream-recv.toml")]
    config: PathBuf,

    /// Transport: "stream"/"tcp" or "datagram"/"udp" (overrides config).
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Listen address (overrides config).
    #[arg(short, long)]
    listen: Option<String>,

    /// Listen port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Dump the last frame to this path on exit (overrides config).
    #[arg(long)]
    dump: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RecvConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = RecvConfig::load(&cli.config);
    if let Some(transport) = cli.transport {
        config.transport.transport = transport;
    }
    if let Some(addr) = cli.listen {
        config.transport.listen_address = addr;
    }
    if let Some(port) = cli.port {
        config.transport.port = port;
    }
    if let Some(path) = cli.dump {
        config.viewer.dump_path = path;
    }

    init_tracing(&config.logging)?;
    info!("scapstream-recv v{}", env!("CARGO_PKG_VERSION"));
    origin.report(&cli.config);

    // ── 1. Start the receiver ───────────────────────────────────

    let mut receiver = Receiver::builder(config.transport.clone())
        .on_stats(|stats| {
            info!(
                "{:.1} fps, {:.2} ms/frame, {:.1} MB/s, {} frames ({} abandoned), {}x{}",
                stats.approx_fps,
                stats.avg_latency_ms,
                stats.throughput_bps as f64 / 1_000_000.0,
                stats.frames_total,
                stats.frames_abandoned,
                stats.width,
                stats.height,
            );
        })
        .start()
        .await?;
    let mut events = receiver
        .take_events()
        .ok_or("receiver event stream unavailable")?;

    // ── 2. Poll loop ────────────────────────────────────────────

    let mut monitor = FrameMonitor::new();
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Some(frame) = monitor.observe(receiver.latest_frame()) {
                    debug!(
                        sequence = frame.sequence,
                        bytes = frame.len(),
                        "new frame ({:.2} ms)",
                        frame.receive_duration_ms()
                    );
                }
            }
            event = events.recv() => match event {
                Some(ReceiverEvent::Connected { peer }) => info!("capture source {peer} connected"),
                Some(ReceiverEvent::Stopped { error: Some(e) }) => {
                    warn!("receiver ended: {e}");
                    break;
                }
                Some(ReceiverEvent::Stopped { error: None }) | None => break,
                Some(_) => {}
            },
        }
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    // One last look so the dump holds the newest frame.
    monitor.observe(receiver.latest_frame());
    let result = receiver.stop().await;

    info!(
        "observed {} frames over {} polls ({} overwritten before a poll)",
        monitor.observed(),
        monitor.polls(),
        monitor.overwritten()
    );

    if !config.viewer.dump_path.is_empty() {
        match monitor.last_frame() {
            Some(frame) => {
                let path = Path::new(&config.viewer.dump_path);
                dump_frame(path, frame, config.viewer.dump_rgba)?;
                info!(
                    "dumped frame {} ({}x{}, {} bytes) to {}",
                    frame.sequence,
                    frame.width,
                    frame.height,
                    frame.len(),
                    path.display()
                );
            }
            None => warn!("no frame received; nothing dumped"),
        }
    }

    if let Err(e) = &result {
        error!("receiver failed: {e}");
    }
    result.map_err(Into::into)
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }
    Ok(())
}
