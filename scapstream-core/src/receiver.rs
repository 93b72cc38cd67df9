//! Receive loop and its owner-facing handle.
//!
//! [`Receiver::start`] binds the configured transport and spawns a Tokio
//! task that decodes frames one at a time and publishes each into a
//! [`LatestFrameSlot`]. The owner talks to the task only through channels:
//! control messages in, frames/statistics/events out. Consumers call
//! [`Receiver::latest_frame`] whenever they want, without ever waiting on
//! socket I/O.
//!
//! The task owns the socket. On a stop request it drops any in-flight read
//! together with the socket, then exits; [`Receiver::stop`] awaits that exit.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::config::{TransportConfig, TransportKind};
use crate::datagram::DatagramFrameDecoder;
use crate::error::ScapError;
use crate::frame::Frame;
use crate::reader::ExactReader;
use crate::slot::{FrameStats, LatestFrameSlot, SlotReader, StatsCallback};
use crate::state::ReceiverPhase;
use crate::stream::StreamFrameDecoder;
use crate::wire::SanityLimits;

// ── Messages ─────────────────────────────────────────────────────

/// Control messages from the owner into the receive task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverControl {
    /// Close the transport and end the loop.
    Stop,
}

/// Notifications from the receive task to its owner.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    /// A stream peer was accepted.
    Connected { peer: SocketAddr },
    /// A frame was published to the slot.
    FrameArrived {
        sequence: u64,
        bytes: usize,
        receive_duration: Duration,
    },
    /// A statistics window closed.
    Stats(FrameStats),
    /// The loop ended, with the fatal error if there was one.
    Stopped { error: Option<String> },
}

// ── Builder ──────────────────────────────────────────────────────

/// Configures and starts a [`Receiver`].
pub struct ReceiverBuilder {
    config: TransportConfig,
    callbacks: Vec<StatsCallback>,
}

impl ReceiverBuilder {
    /// Register a callback invoked on the receive task every statistics window.
    pub fn on_stats<F>(mut self, f: F) -> Self
    where
        F: Fn(&FrameStats) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(f));
        self
    }

    /// Bind the transport and spawn the receive task.
    ///
    /// Returns once the socket is bound; bind failures are reported as
    /// [`ScapError::TransportSetup`].
    pub async fn start(self) -> Result<Receiver, ScapError> {
        let Self { config, callbacks } = self;
        config.validate()?;

        let bind_addr = config.bind_addr();
        let (phase_tx, phase_rx) = watch::channel(ReceiverPhase::Idle);
        let (control_tx, control_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);

        let mut slot = LatestFrameSlot::new(config.stats_window);
        slot.add_callbacks(callbacks);
        let frames = slot.reader();
        let stats = slot.stats_receiver();

        let bound = match config.transport {
            TransportKind::Stream => {
                let listener = TcpListener::bind(&bind_addr)
                    .await
                    .map_err(|e| ScapError::setup(&bind_addr, e))?;
                BoundTransport::Stream(listener)
            }
            TransportKind::Datagram => {
                let socket = UdpSocket::bind(&bind_addr)
                    .await
                    .map_err(|e| ScapError::setup(&bind_addr, e))?;
                BoundTransport::Datagram(socket)
            }
        };
        let local_addr = bound.local_addr()?;
        transition(&phase_tx, |p| p.begin_listen(local_addr))?;
        info!(transport = %config.transport, %local_addr, "receiver listening");

        let transport = config.transport;
        let task = ReceiveTask {
            config,
            slot,
            phase: phase_tx,
            control: control_rx,
            events: event_tx,
        };
        let handle = tokio::spawn(task.run(bound));

        Ok(Receiver {
            transport,
            local_addr,
            control: control_tx,
            events: Some(event_rx),
            frames,
            stats,
            phase: phase_rx,
            handle: Some(handle),
        })
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Owner-side handle to a running receive loop.
///
/// A receiver runs once: after [`stop`](Self::stop) (or a fatal error) it
/// is finished, and a new one must be started. Dropping the handle aborts
/// the task, which closes its socket.
pub struct Receiver {
    transport: TransportKind,
    local_addr: SocketAddr,
    control: mpsc::Sender<ReceiverControl>,
    events: Option<mpsc::Receiver<ReceiverEvent>>,
    frames: SlotReader,
    stats: watch::Receiver<FrameStats>,
    phase: watch::Receiver<ReceiverPhase>,
    handle: Option<JoinHandle<Result<(), ScapError>>>,
}

impl Receiver {
    /// Start a receiver with no statistics callbacks.
    pub async fn start(config: TransportConfig) -> Result<Self, ScapError> {
        Self::builder(config).start().await
    }

    pub fn builder(config: TransportConfig) -> ReceiverBuilder {
        ReceiverBuilder {
            config,
            callbacks: Vec::new(),
        }
    }

    /// The newest complete frame, if any. Never blocks.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.peek()
    }

    /// A cloneable reader on the latest-frame slot.
    pub fn frames(&self) -> SlotReader {
        self.frames.clone()
    }

    /// The most recent statistics snapshot.
    pub fn stats(&self) -> watch::Receiver<FrameStats> {
        self.stats.clone()
    }

    /// Take the event stream. Only the first call returns `Some`.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ReceiverEvent>> {
        self.events.take()
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase.borrow().clone()
    }

    /// The bound local address (useful with port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Whether the receive task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Close the transport and wait for the receive task to exit.
    ///
    /// Returns the fatal error that ended the loop, if it had already died.
    pub async fn stop(mut self) -> Result<(), ScapError> {
        // The task may already be gone; its result is what matters.
        let _ = self.control.send(ReceiverControl::Stop).await;
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("transport", &self.transport)
            .field("local_addr", &self.local_addr)
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

// ── Receive task ─────────────────────────────────────────────────

enum BoundTransport {
    Stream(TcpListener),
    Datagram(UdpSocket),
}

impl BoundTransport {
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Stream(l) => l.local_addr(),
            Self::Datagram(s) => s.local_addr(),
        }
    }
}

struct ReceiveTask {
    config: TransportConfig,
    slot: LatestFrameSlot,
    phase: watch::Sender<ReceiverPhase>,
    control: mpsc::Receiver<ReceiverControl>,
    events: mpsc::Sender<ReceiverEvent>,
}

impl ReceiveTask {
    async fn run(mut self, bound: BoundTransport) -> Result<(), ScapError> {
        let result = match bound {
            BoundTransport::Stream(listener) => self.run_stream(listener).await,
            BoundTransport::Datagram(socket) => self.run_datagram(socket).await,
        };

        // Sockets were owned by the branch above and are closed by now.
        self.phase.send_modify(ReceiverPhase::finish_stop);
        match &result {
            Ok(()) => info!(frames = self.slot.frames_total(), "receiver stopped"),
            Err(e) => error!(frames = self.slot.frames_total(), "receiver failed: {e}"),
        }
        self.emit(ReceiverEvent::Stopped {
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    async fn run_stream(&mut self, listener: TcpListener) -> Result<(), ScapError> {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = self.control.recv() => return self.begin_stop(),
        };
        // One capture source at a time.
        drop(listener);
        stream.set_nodelay(true)?;

        transition(&self.phase, |p| p.accept(peer))?;
        info!(%peer, "capture source connected");
        self.emit(ReceiverEvent::Connected { peer });
        transition(&self.phase, ReceiverPhase::begin_receive)?;

        let mut reader = ExactReader::new(stream);
        let mut decoder = StreamFrameDecoder::new(self.limits())
            .with_dimensions(self.config.frame_width, self.config.frame_height)
            .with_format(self.config.pixel_format);

        loop {
            tokio::select! {
                frame = decoder.next_frame(&mut reader) => match frame {
                    Ok(frame) => self.publish(frame),
                    Err(e) if e.is_recoverable(TransportKind::Stream) => {
                        debug!("dropping frame: {e}");
                    }
                    Err(e) => return Err(e),
                },
                _ = self.control.recv() => return self.begin_stop(),
            }
        }
    }

    async fn run_datagram(&mut self, mut socket: UdpSocket) -> Result<(), ScapError> {
        transition(&self.phase, ReceiverPhase::begin_receive)?;

        let mut decoder = DatagramFrameDecoder::new(
            self.limits(),
            self.config.chunk_payload_size,
            self.config.frame_timeout(),
        )
        .with_format(self.config.pixel_format);

        loop {
            tokio::select! {
                frame = decoder.next_frame(&mut socket) => {
                    if let Some(frame) = frame? {
                        self.publish(frame);
                    }
                    self.slot.set_abandoned(decoder.abandoned_frames());
                }
                _ = self.control.recv() => return self.begin_stop(),
            }
        }
    }

    fn publish(&mut self, frame: Frame) {
        let event = ReceiverEvent::FrameArrived {
            sequence: frame.sequence,
            bytes: frame.len(),
            receive_duration: frame.receive_duration,
        };
        trace!(sequence = frame.sequence, bytes = frame.len(), "frame complete");

        let stats = self.slot.publish(frame);
        self.emit(event);
        if let Some(stats) = stats {
            debug!(
                fps = stats.approx_fps,
                latency_ms = stats.avg_latency_ms,
                bps = stats.throughput_bps,
                "stats window"
            );
            self.emit(ReceiverEvent::Stats(stats));
        }
    }

    fn begin_stop(&mut self) -> Result<(), ScapError> {
        transition(&self.phase, ReceiverPhase::begin_stop)?;
        info!("stop requested");
        Ok(())
    }

    /// Never blocks the receive loop: events are dropped when the owner
    /// is not keeping up or has gone away.
    fn emit(&self, event: ReceiverEvent) {
        if let Err(mpsc::error::TrySendError::Full(ev)) = self.events.try_send(event) {
            trace!("event channel full, dropping {ev:?}");
        }
    }

    fn limits(&self) -> SanityLimits {
        SanityLimits {
            max_total_size: self.config.max_total_size,
            max_chunk_count: self.config.max_chunk_count,
        }
    }
}

/// Apply a validated phase transition and notify phase watchers.
fn transition<F>(phase: &watch::Sender<ReceiverPhase>, f: F) -> Result<(), ScapError>
where
    F: FnOnce(&mut ReceiverPhase) -> Result<(), ScapError>,
{
    let mut result = Ok(());
    phase.send_modify(|p| result = f(p));
    result
}

// ── Tests ────────────────────────────────────────────────────────
