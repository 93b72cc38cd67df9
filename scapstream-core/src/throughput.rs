//! Received-bytes rate over a trailing time window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Byte rate of completed frames over the trailing `span`.
///
/// Each sample marks the instant a frame finished arriving. The rate is
/// measured between the oldest and newest sample still in the span, so the
/// oldest sample's bytes belong to the interval before it and are left out.
#[derive(Debug)]
pub struct ThroughputMeter {
    span: Duration,
    arrivals: VecDeque<(Instant, u64)>,
    /// Bytes of every arrival after the oldest one.
    counted: u64,
}

impl ThroughputMeter {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            arrivals: VecDeque::new(),
            counted: 0,
        }
    }

    /// Note `bytes` finishing at `at`, forgetting arrivals older than the span.
    pub fn record(&mut self, at: Instant, bytes: u64) {
        if !self.arrivals.is_empty() {
            self.counted += bytes;
        }
        self.arrivals.push_back((at, bytes));

        while self.arrivals.len() > 1 {
            let oldest = self.arrivals[0].0;
            if at.duration_since(oldest) <= self.span {
                break;
            }
            self.arrivals.pop_front();
            // The next arrival becomes the reference point.
            if let Some(&(_, reference)) = self.arrivals.front() {
                self.counted -= reference;
            }
        }
    }

    /// Bytes per second, or `0` until two arrivals fall within the span.
    pub fn bytes_per_sec(&self) -> u64 {
        let (Some(&(first, _)), Some(&(last, _))) = (self.arrivals.front(), self.arrivals.back())
        else {
            return 0;
        };
        let elapsed = last.duration_since(first).as_secs_f64();
        if elapsed <= 0.0 {
            return 0;
        }
        (self.counted as f64 / elapsed) as u64
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
