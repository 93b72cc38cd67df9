//! Single-slot "latest frame" buffer between the receive task and consumers.
//!
//! The receive task owns the [`LatestFrameSlot`] and overwrites it on every
//! completed frame; consumers hold [`SlotReader`]s and read whatever is
//! newest. The slot is a `tokio::sync::watch` channel, so a read never
//! blocks on the producer and always sees either nothing or one whole frame.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::error::ScapError;
use crate::frame::Frame;
use crate::throughput::ThroughputMeter;

/// Callback invoked with every closed statistics window.
pub type StatsCallback = Box<dyn Fn(&FrameStats) + Send + Sync + 'static>;

// ── FrameStats ───────────────────────────────────────────────────

/// Snapshot emitted once per statistics window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Frames per second over the window.
    pub approx_fps: f64,
    /// Mean assembly time of the window's frames.
    pub avg_latency_ms: f64,
    /// Received pixel bytes per second over the last second.
    pub throughput_bps: u64,
    /// Frames published since the receiver started.
    pub frames_total: u64,
    /// Frames abandoned since the receiver started.
    pub frames_abandoned: u64,
    /// Dimensions of the newest frame.
    pub width: u32,
    pub height: u32,
}

// ── LatestFrameSlot ──────────────────────────────────────────────

/// Producer side of the latest-frame slot, plus windowed statistics.
pub struct LatestFrameSlot {
    frame_tx: watch::Sender<Option<Arc<Frame>>>,
    stats_tx: watch::Sender<FrameStats>,
    callbacks: Vec<StatsCallback>,
    window: u32,
    frame_count: u32,
    /// Inter-frame gaps covered by the open window.
    intervals: u32,
    total_latency_ms: f64,
    window_started: Option<Instant>,
    frames_total: u64,
    frames_abandoned: u64,
    throughput: ThroughputMeter,
}

impl LatestFrameSlot {
    /// Create an empty slot that reports statistics every `window` frames.
    pub fn new(window: u32) -> Self {
        let (frame_tx, _) = watch::channel(None);
        let (stats_tx, _) = watch::channel(FrameStats::default());
        Self {
            frame_tx,
            stats_tx,
            callbacks: Vec::new(),
            window: window.max(1),
            frame_count: 0,
            intervals: 0,
            total_latency_ms: 0.0,
            window_started: None,
            frames_total: 0,
            frames_abandoned: 0,
            throughput: ThroughputMeter::default(),
        }
    }

    /// A cloneable consumer handle.
    pub fn reader(&self) -> SlotReader {
        SlotReader {
            rx: self.frame_tx.subscribe(),
        }
    }

    /// Receiver for the most recent statistics snapshot.
    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_tx.subscribe()
    }

    /// Register a callback for every closed statistics window.
    pub fn on_stats<F>(&mut self, f: F)
    where
        F: Fn(&FrameStats) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(f));
    }

    pub(crate) fn add_callbacks(&mut self, callbacks: Vec<StatsCallback>) {
        self.callbacks.extend(callbacks);
    }

    /// Replace the held frame. Returns the statistics snapshot when this
    /// frame closed a window.
    pub fn publish(&mut self, frame: Frame) -> Option<FrameStats> {
        self.publish_at(frame, Instant::now())
    }

    fn publish_at(&mut self, frame: Frame, now: Instant) -> Option<FrameStats> {
        // The very first frame opens the clock; later windows start at the
        // frame that closed the previous one.
        let window_started = match self.window_started {
            Some(started) => {
                self.intervals += 1;
                started
            }
            None => *self.window_started.insert(now),
        };

        self.frame_count += 1;
        self.frames_total += 1;
        self.total_latency_ms += frame.receive_duration_ms();
        self.throughput.record(now, frame.len() as u64);
        let (width, height) = (frame.width, frame.height);

        self.frame_tx.send_replace(Some(Arc::new(frame)));

        if self.frame_count < self.window {
            return None;
        }

        let elapsed = now.duration_since(window_started).as_secs_f64();
        let stats = FrameStats {
            approx_fps: if elapsed > 0.0 {
                f64::from(self.intervals) / elapsed
            } else {
                0.0
            },
            avg_latency_ms: self.total_latency_ms / f64::from(self.frame_count),
            throughput_bps: self.throughput.bytes_per_sec(),
            frames_total: self.frames_total,
            frames_abandoned: self.frames_abandoned,
            width,
            height,
        };

        self.frame_count = 0;
        self.intervals = 0;
        self.total_latency_ms = 0.0;
        self.window_started = Some(now);

        for callback in &self.callbacks {
            callback(&stats);
        }
        self.stats_tx.send_replace(stats.clone());
        Some(stats)
    }

    /// The held frame, without consuming it.
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.frame_tx.borrow().clone()
    }

    /// Update the abandoned-frame total reported in statistics.
    pub fn set_abandoned(&mut self, total: u64) {
        self.frames_abandoned = total;
    }

    /// Frames published since creation.
    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }
}

impl std::fmt::Debug for LatestFrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestFrameSlot")
            .field("window", &self.window)
            .field("frame_count", &self.frame_count)
            .field("frames_total", &self.frames_total)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

// ── SlotReader ───────────────────────────────────────────────────

/// Consumer side of the slot. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SlotReader {
    rx: watch::Receiver<Option<Arc<Frame>>>,
}

impl SlotReader {
    /// The newest frame, or `None` if nothing has been published yet.
    ///
    /// Between publishes every call returns the same `Arc`.
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }

    /// Like [`peek`](Self::peek), but marks the frame as seen for
    /// [`has_changed`](Self::has_changed).
    pub fn take_latest(&mut self) -> Option<Arc<Frame>> {
        self.rx.borrow_and_update().clone()
    }

    /// Whether a frame was published since the last `take_latest`/`changed`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next publish and return the new frame.
    ///
    /// Fails with [`ScapError::ChannelClosed`] once the producer is gone.
    pub async fn changed(&mut self) -> Result<Option<Arc<Frame>>, ScapError> {
        self.rx
            .changed()
            .await
            .map_err(|_| ScapError::ChannelClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    fn frame(sequence: u64, latency_ms: u64) -> Frame {
        Frame {
            pixels: Bytes::from(vec![sequence as u8; 8]),
            width: 1,
            height: 2,
            format: PixelFormat::Bgra8,
            sequence,
            receive_duration: Duration::from_millis(latency_ms),
        }
    }

    #[test]
    fn empty_slot_peeks_none() {
        let slot = LatestFrameSlot::new(30);
        assert!(slot.peek().is_none());
        assert!(slot.reader().peek().is_none());
    }

    #[test]
    fn publish_then_peek_returns_same_frame() {
        let mut slot = LatestFrameSlot::new(30);
        let reader = slot.reader();
        slot.publish(frame(7, 1));

        let a = reader.peek().unwrap();
        let b = reader.peek().unwrap();
        assert_eq!(a.sequence, 7);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &slot.peek().unwrap()));
    }

    #[test]
    fn publish_overwrites() {
        let mut slot = LatestFrameSlot::new(30);
        let reader = slot.reader();
        slot.publish(frame(1, 1));
        slot.publish(frame(2, 1));
        assert_eq!(reader.peek().unwrap().sequence, 2);
    }

    #[test]
    fn publish_without_readers_still_stores() {
        let mut slot = LatestFrameSlot::new(30);
        slot.publish(frame(3, 1));
        assert_eq!(slot.peek().unwrap().sequence, 3);
    }

    #[test]
    fn stats_emitted_per_window_and_reset() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut slot = LatestFrameSlot::new(3);
        let sink = Arc::clone(&seen);
        slot.on_stats(move |s| sink.lock().unwrap().push(s.clone()));
        slot.set_abandoned(2);

        assert!(slot.publish(frame(0, 10)).is_none());
        assert!(slot.publish(frame(1, 20)).is_none());
        let stats = slot.publish(frame(2, 30)).unwrap();
        assert!((stats.avg_latency_ms - 20.0).abs() < 1e-6);
        assert_eq!(stats.frames_total, 3);
        assert_eq!(stats.frames_abandoned, 2);
        assert_eq!((stats.width, stats.height), (1, 2));

        // Accumulators reset: the next window averages only its own frames.
        slot.publish(frame(3, 1));
        slot.publish(frame(4, 1));
        let stats = slot.publish(frame(5, 1)).unwrap();
        assert!((stats.avg_latency_ms - 1.0).abs() < 1e-6);

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(*slot.stats_receiver().borrow(), stats);
    }

    #[test]
    fn fps_counts_gaps_between_frames() {
        let mut slot = LatestFrameSlot::new(3);
        let t0 = Instant::now();
        let second = |s: u64| t0 + Duration::from_secs(s);

        // Three frames one second apart: two gaps over two seconds.
        assert!(slot.publish_at(frame(0, 1), second(0)).is_none());
        assert!(slot.publish_at(frame(1, 1), second(1)).is_none());
        let first = slot.publish_at(frame(2, 1), second(2)).unwrap();
        assert!((first.approx_fps - 1.0).abs() < 1e-9, "{}", first.approx_fps);
        assert_eq!(first.throughput_bps, 8);

        // The next window is measured from the frame that closed the last.
        slot.publish_at(frame(3, 1), second(3));
        slot.publish_at(frame(4, 1), second(4));
        let next = slot.publish_at(frame(5, 1), second(5)).unwrap();
        assert!((next.approx_fps - 1.0).abs() < 1e-9, "{}", next.approx_fps);
    }

    #[tokio::test]
    async fn reader_is_notified_of_publish() {
        let mut slot = LatestFrameSlot::new(30);
        let mut reader = slot.reader();
        assert!(!reader.has_changed());

        let waiter = tokio::spawn(async move { reader.changed().await });
        tokio::task::yield_now().await;
        slot.publish(frame(9, 1));

        let got = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(got.sequence, 9);
    }

    #[tokio::test]
    async fn reader_sees_closed_slot() {
        let slot = LatestFrameSlot::new(30);
        let mut reader = slot.reader();
        drop(slot);
        assert!(matches!(
            reader.changed().await,
            Err(ScapError::ChannelClosed)
        ));
    }
}
