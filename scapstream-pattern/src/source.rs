//! Paced frame source.
//!
//! Connects to the receiver over the configured transport, then renders
//! and sends one pattern frame per interval until stopped or until the
//! configured frame count is reached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

use scapstream_core::{DatagramFrameSender, ScapError, StreamFrameSender, TransportKind};

use crate::config::PatternConfig;
use crate::pattern::PatternGenerator;

// ── FrameSink ────────────────────────────────────────────────────

/// A connected sender for either transport.
#[derive(Debug)]
pub enum FrameSink {
    Stream(StreamFrameSender<TcpStream>),
    Datagram(DatagramFrameSender),
}

impl FrameSink {
    /// Connect (stream) or bind and target (datagram) the receiver.
    pub async fn connect(config: &PatternConfig) -> Result<Self, ScapError> {
        let addr = config.target_addr();
        match config.target.transport {
            TransportKind::Stream => {
                let stream = TcpStream::connect(&addr)
                    .await
                    .map_err(|e| ScapError::TransportSetup {
                        addr: addr.clone(),
                        source: e,
                    })?;
                stream.set_nodelay(true)?;
                info!("connected to receiver at {addr}");
                Ok(Self::Stream(
                    StreamFrameSender::new(stream)
                        .with_chunk_size(config.target.stream_chunk_size),
                ))
            }
            TransportKind::Datagram => {
                let remote = tokio::net::lookup_host(&addr)
                    .await?
                    .next()
                    .ok_or_else(|| ScapError::Config(format!("cannot resolve {addr}")))?;
                let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                let socket = UdpSocket::bind(local)
                    .await
                    .map_err(|e| ScapError::TransportSetup {
                        addr: local.into(),
                        source: e,
                    })?;
                info!("sending datagrams to {remote}");
                Ok(Self::Datagram(
                    DatagramFrameSender::new(socket, remote)
                        .with_chunk_payload(config.target.chunk_payload_size)?,
                ))
            }
        }
    }

    pub async fn send(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<(), ScapError> {
        match self {
            Self::Stream(s) => s.send_frame(pixels).await,
            Self::Datagram(d) => d.send_frame(width, height, pixels).await,
        }
    }

    /// Bytes handed to the transport, framing included.
    pub fn bytes_sent(&self) -> u64 {
        match self {
            Self::Stream(s) => s.bytes_sent(),
            Self::Datagram(d) => d.bytes_sent(),
        }
    }
}

// ── SourceReport ─────────────────────────────────────────────────

/// Totals for one run of the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReport {
    pub frames_sent: u64,
    /// Frames whose render + send overran the frame interval.
    pub frames_late: u64,
    /// Interval slots skipped to catch up after late frames.
    pub frames_dropped: u64,
    pub bytes_sent: u64,
}

// ── PatternSource ────────────────────────────────────────────────

/// Renders and sends pattern frames at a fixed rate.
///
/// A source is armed when created; once stopped it stays stopped.
pub struct PatternSource {
    config: PatternConfig,
    generator: PatternGenerator,
    running: Arc<AtomicBool>,
}

impl PatternSource {
    pub fn new(config: PatternConfig) -> Result<Self, ScapError> {
        config.validate()?;
        let generator = PatternGenerator::new(config.pattern.width, config.pattern.height);
        Ok(Self {
            config,
            generator,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// A cloneable handle that can be used to stop the source from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Connect to the receiver and run until stopped.
    pub async fn run(&mut self) -> Result<SourceReport, ScapError> {
        if !self.is_running() {
            return Ok(SourceReport::default());
        }
        let mut sink = FrameSink::connect(&self.config).await?;
        self.run_with(&mut sink).await
    }

    /// Run the send loop on an already-connected sink.
    pub async fn run_with(&mut self, sink: &mut FrameSink) -> Result<SourceReport, ScapError> {
        let interval = self.config.frame_interval();
        let limit = self.config.pattern.frames;
        let (width, height) = self.generator.dimensions();

        let mut report = SourceReport::default();
        let mut next_deadline = Instant::now();
        let mut second_start = Instant::now();
        let mut second_frames = 0u32;

        while self.running.load(Ordering::SeqCst) && (limit == 0 || report.frames_sent < limit) {
            let pixels = self.generator.next_frame();
            sink.send(width, height, pixels).await?;
            report.frames_sent += 1;
            second_frames += 1;

            next_deadline += interval;
            let now = Instant::now();
            if now > next_deadline {
                report.frames_late += 1;
                let skipped = skipped_slots(now - next_deadline, interval);
                if skipped > 0 {
                    debug!(skipped, "source behind schedule, dropping frames");
                }
                report.frames_dropped += skipped;
                next_deadline += interval * skipped as u32;
            }

            if second_start.elapsed() >= Duration::from_secs(1) {
                let secs = second_start.elapsed().as_secs_f64();
                info!(
                    "{:.1} fps, {} sent, {} late, {} dropped",
                    f64::from(second_frames) / secs,
                    report.frames_sent,
                    report.frames_late,
                    report.frames_dropped
                );
                second_start = Instant::now();
                second_frames = 0;
            }

            Self::pace(next_deadline).await;
        }

        self.running.store(false, Ordering::SeqCst);
        report.bytes_sent = sink.bytes_sent();
        Ok(report)
    }

    /// Signal the source to stop after the current frame.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep until the next frame slot.
    async fn pace(deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            tokio::time::sleep(deadline - now).await;
        }
    }
}

/// Whole frame slots missed when running `behind` past a deadline.
fn skipped_slots(behind: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 0;
    }
    (behind.as_nanos() / interval.as_nanos()) as u64
}

// ── Tests ────────────────────────────────────────────────────────
