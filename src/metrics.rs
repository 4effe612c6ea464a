//! Stream metrics
//!
//! Each counter has exactly one writer-role (receive thread, playout thread,
//! transmission thread, or an audio callback); everything else reads through
//! [`StreamMetrics::snapshot`]. The snapshot is what periodic logging and
//! shutdown summaries consume.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counter set for one stream session
#[derive(Debug, Default)]
pub struct StreamMetrics {
    // Sender side
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_errors: AtomicU64,
    send_retries: AtomicU64,
    timing_errors: AtomicU64,
    adaptive_delay_us: AtomicU64,

    // Receiver side
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_lost: AtomicU64,
    packets_late: AtomicU64,
    packets_duplicate: AtomicU64,
    malformed_packets: AtomicU64,
    decode_errors: AtomicU64,
    concealed_frames: AtomicU64,
    jitter_us: AtomicU64,
    jitter_depth: AtomicU32,
    jitter_target_depth: AtomicU32,

    // Bridge
    underruns: AtomicU64,
    overruns: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timing_error(&self) {
        self.timing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_adaptive_delay_us(&self, us: u64) {
        self.adaptive_delay_us.store(us, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_lost(&self, count: u64) {
        self.packets_lost.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_late(&self) {
        self.packets_late.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.packets_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_concealed(&self) {
        self.concealed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_jitter_us(&self, us: u64) {
        self.jitter_us.store(us, Ordering::Relaxed);
    }

    pub fn set_jitter_depth(&self, occupancy: u32, target: u32) {
        self.jitter_depth.store(occupancy, Ordering::Relaxed);
        self.jitter_target_depth.store(target, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Read-only view of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            timing_errors: self.timing_errors.load(Ordering::Relaxed),
            adaptive_delay_us: self.adaptive_delay_us.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_lost: self.packets_lost.load(Ordering::Relaxed),
            packets_late: self.packets_late.load(Ordering::Relaxed),
            packets_duplicate: self.packets_duplicate.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            concealed_frames: self.concealed_frames.load(Ordering::Relaxed),
            jitter_us: self.jitter_us.load(Ordering::Relaxed),
            jitter_depth: self.jitter_depth.load(Ordering::Relaxed),
            jitter_target_depth: self.jitter_target_depth.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all stream counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub send_retries: u64,
    pub timing_errors: u64,
    pub adaptive_delay_us: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_lost: u64,
    pub packets_late: u64,
    pub packets_duplicate: u64,
    pub malformed_packets: u64,
    pub decode_errors: u64,
    pub concealed_frames: u64,
    pub jitter_us: u64,
    pub jitter_depth: u32,
    pub jitter_target_depth: u32,
    pub underruns: u64,
    pub overruns: u64,
}

impl MetricsSnapshot {
    /// Fraction of expected packets that were lost
    pub fn loss_rate(&self) -> f64 {
        let total = self.packets_received + self.packets_lost;
        if total == 0 {
            0.0
        } else {
            self.packets_lost as f64 / total as f64
        }
    }
}

/// Interarrival jitter estimator (RFC 3550 style).
///
/// Tracks the smoothed variation between packet transit times, where transit
/// is arrival time minus the sender's capture timestamp. Clock offset between
/// hosts cancels out of the difference.
#[derive(Debug, Default)]
pub struct JitterEstimator {
    last_transit_us: Option<i64>,
    jitter_us: f64,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet; returns the current estimate in microseconds.
    pub fn update(&mut self, send_timestamp_us: u64, arrival_us: u64) -> u64 {
        let transit = arrival_us as i64 - send_timestamp_us as i64;

        if let Some(last) = self.last_transit_us {
            let d = (transit - last).abs() as f64;
            self.jitter_us += (d - self.jitter_us) / 16.0;
        }
        self.last_transit_us = Some(transit);

        self.jitter_us as u64
    }

    pub fn jitter_us(&self) -> u64 {
        self.jitter_us as u64
    }
}
