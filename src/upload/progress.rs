//! Progress accounting for an upload session
//!
//! The aggregator accumulates acknowledged bytes, derives throughput from the
//! most recent increment and publishes a [`ProgressSnapshot`] to every
//! registered observer. Publication happens while the internal lock is held,
//! so observers see snapshots in exactly the order increments were recorded.
//! Observers must not call back into the aggregator.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Callback receiving progress snapshots
pub type ProgressObserver = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Point-in-time view of an upload's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Cumulative bytes confirmed written
    pub bytes_acked: u64,
    /// Size of the source
    pub total_bytes: u64,
    /// Rounded percentage, clamped to 0..=100
    pub percent: u8,
    /// Bytes per second over the most recent increment
    pub throughput_bps: f64,
    /// Seconds remaining at the current throughput, `None` while it is zero
    pub eta_seconds: Option<f64>,
}

impl ProgressSnapshot {
    fn compute(bytes_acked: u64, total_bytes: u64, throughput_bps: f64) -> Self {
        let percent = if total_bytes == 0 {
            100
        } else {
            (bytes_acked as f64 * 100.0 / total_bytes as f64)
                .round()
                .clamp(0.0, 100.0) as u8
        };

        let eta_seconds = if throughput_bps > 0.0 {
            Some(total_bytes.saturating_sub(bytes_acked) as f64 / throughput_bps)
        } else {
            None
        };

        Self {
            bytes_acked,
            total_bytes,
            percent,
            throughput_bps,
            eta_seconds,
        }
    }

    /// Remaining time as a `Duration`
    pub fn eta(&self) -> Option<Duration> {
        self.eta_seconds
            .filter(|secs| secs.is_finite())
            .map(Duration::from_secs_f64)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_acked >= self.total_bytes
    }
}

struct ProgressState {
    bytes_acked: u64,
    last_sample: Instant,
    throughput_bps: f64,
    halted: bool,
}

/// Session-scoped progress accumulator
pub struct ProgressAggregator {
    total_bytes: u64,
    state: Mutex<ProgressState>,
    observers: Mutex<Vec<ProgressObserver>>,
}

impl ProgressAggregator {
    /// Create an aggregator whose first sample is measured from now
    pub fn new(total_bytes: u64) -> Self {
        Self::starting_at(total_bytes, Instant::now())
    }

    /// Create an aggregator whose first sample is measured from `start`
    pub fn starting_at(total_bytes: u64, start: Instant) -> Self {
        Self {
            total_bytes,
            state: Mutex::new(ProgressState {
                bytes_acked: 0,
                last_sample: start,
                throughput_bps: 0.0,
                halted: false,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer
    pub fn subscribe(&self, observer: ProgressObserver) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Record an increment sampled now
    pub fn record(&self, bytes: u64) -> Option<ProgressSnapshot> {
        self.record_at(bytes, Instant::now())
    }

    /// Record an increment sampled at `now`
    ///
    /// Returns `None` once the aggregator has been halted.
    pub fn record_at(&self, bytes: u64, now: Instant) -> Option<ProgressSnapshot> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.halted {
            return None;
        }

        state.bytes_acked = state.bytes_acked.saturating_add(bytes);

        let elapsed = now.saturating_duration_since(state.last_sample).as_secs_f64();
        if elapsed > 0.0 {
            state.throughput_bps = bytes as f64 / elapsed;
        }
        state.last_sample = now;

        let snapshot =
            ProgressSnapshot::compute(state.bytes_acked, self.total_bytes, state.throughput_bps);

        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer(&snapshot);
        }

        Some(snapshot)
    }

    /// Measure the next increment from now
    pub fn reset_clock(&self) {
        self.reset_clock_at(Instant::now());
    }

    /// Measure the next increment from `start`
    pub fn reset_clock_at(&self, start: Instant) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_sample = start;
    }

    /// Record whatever is left to reach `total_bytes`
    pub fn record_remaining(&self) -> Option<ProgressSnapshot> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_acked());
        if remaining == 0 {
            return None;
        }
        self.record(remaining)
    }

    /// Current snapshot without recording anything
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        ProgressSnapshot::compute(state.bytes_acked, self.total_bytes, state.throughput_bps)
    }

    pub fn bytes_acked(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes_acked
    }

    /// Stop publishing; later increments are ignored
    pub fn halt(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .halted
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("total_bytes", &self.total_bytes)
            .field("snapshot", &self.snapshot())
            .field("halted", &self.is_halted())
            .finish()
    }
}
