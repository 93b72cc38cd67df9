//! Consumer-side view of the latest-frame slot.
//!
//! A renderer polling at its own pace sees only some of the frames the
//! receiver publishes; the rest are overwritten in the slot. The monitor
//! counts both so the log shows what a consumer actually got.

use std::io;
use std::path::Path;
use std::sync::Arc;

use scapstream_core::Frame;

/// Tracks frames observed across polls of the latest-frame slot.
#[derive(Debug, Default)]
pub struct FrameMonitor {
    last: Option<Arc<Frame>>,
    observed: u64,
    overwritten: u64,
    polls: u64,
}

impl FrameMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one poll. Returns the frame if it is new since the last poll.
    pub fn observe(&mut self, latest: Option<Arc<Frame>>) -> Option<Arc<Frame>> {
        self.polls += 1;
        let frame = latest?;
        let next_expected = match &self.last {
            Some(last) if last.sequence >= frame.sequence => return None,
            Some(last) => last.sequence + 1,
            None => 0,
        };
        self.overwritten += frame.sequence - next_expected;
        self.observed += 1;
        self.last = Some(Arc::clone(&frame));
        Some(frame)
    }

    /// Distinct frames seen by polling.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Frames published but replaced before any poll saw them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// The newest frame seen so far.
    pub fn last_frame(&self) -> Option<&Arc<Frame>> {
        self.last.as_ref()
    }
}

/// Write a frame's raw pixels to `path`, optionally as RGBA.
pub fn dump_frame(path: &Path, frame: &Frame, rgba: bool) -> io::Result<()> {
    if rgba {
        std::fs::write(path, frame.to_rgba())
    } else {
        std::fs::write(path, &frame.pixels)
    }
}
