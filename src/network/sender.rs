//! Paced packet transmission
//!
//! Emits exactly one datagram per frame period regardless of how unevenly
//! the capture side delivers audio. The deadline advances by one period per
//! attempt whether or not the send succeeded, so pacing never accumulates
//! drift. Under detected congestion a small adaptive delay is inserted
//! before each send and decays once the network settles.

use std::collections::VecDeque;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::metrics::StreamMetrics;

/// Deadline slack treated as "on time"
const TIMING_PRECISION: Duration = Duration::from_millis(1);

/// Drift beyond this counts as a timing error
const DRIFT_TOLERANCE: Duration = Duration::from_millis(5);

/// Pause between retries of a failed send
const RETRY_PAUSE: Duration = Duration::from_micros(500);

/// Congestion delay growth per congested send
const ADAPTIVE_DELAY_STEP: Duration = Duration::from_millis(1);

/// Congestion delay ceiling
const ADAPTIVE_DELAY_MAX: Duration = Duration::from_millis(10);

/// How long the network must stay nominal before the delay decays
const CONGESTION_COOLDOWN: Duration = Duration::from_secs(1);

/// Ring of recent send instants used for interval averaging
const RECENT_SEND_WINDOW: usize = 32;

/// Result of one pacing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Datagram handed to the kernel
    Sent,
    /// Retry budget exhausted, packet dropped
    Dropped,
}

/// Precision transmission scheduler
pub struct PacedSender {
    socket: UdpSocket,
    frame_interval: Duration,
    next_deadline: Instant,
    adaptive_delay: Duration,
    congestion: bool,
    clear_since: Option<Instant>,
    recent_sends: VecDeque<Instant>,
    retry_count: u32,
    metrics: Arc<StreamMetrics>,
}

impl PacedSender {
    pub fn new(
        socket: UdpSocket,
        frame_interval: Duration,
        retry_count: u32,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            socket,
            frame_interval,
            next_deadline: Instant::now(),
            adaptive_delay: Duration::ZERO,
            congestion: false,
            clear_since: None,
            recent_sends: VecDeque::with_capacity(RECENT_SEND_WINDOW),
            retry_count,
            metrics,
        }
    }

    /// True once the current frame period's deadline has arrived.
    pub fn deadline_elapsed(&self) -> bool {
        Instant::now() + TIMING_PRECISION >= self.next_deadline
    }

    /// Wait for the pacing deadline, transmit with bounded retry, and advance
    /// the deadline by exactly one frame period.
    pub fn send_frame(&mut self, datagram: &[u8]) -> SendOutcome {
        self.wait_for_deadline();

        if self.adaptive_delay > Duration::ZERO {
            thread::sleep(self.adaptive_delay);
        }

        let outcome = self.transmit(datagram);

        let now = Instant::now();
        let drift = if now > self.next_deadline {
            now - self.next_deadline
        } else {
            self.next_deadline - now
        };
        if drift > DRIFT_TOLERANCE {
            self.metrics.record_timing_error();
        }

        self.update_congestion(now);
        self.next_deadline += self.frame_interval;

        outcome
    }

    pub fn congestion(&self) -> bool {
        self.congestion
    }

    pub fn adaptive_delay(&self) -> Duration {
        self.adaptive_delay
    }

    fn wait_for_deadline(&self) {
        loop {
            let now = Instant::now();
            if now + TIMING_PRECISION >= self.next_deadline {
                return;
            }
            let remaining = self.next_deadline - now;
            // Fractional sleep, re-checking as the deadline approaches
            thread::sleep((remaining * 4 / 5).min(Duration::from_millis(10)));
        }
    }

    fn transmit(&self, datagram: &[u8]) -> SendOutcome {
        let mut attempts = 0;
        loop {
            match self.socket.send(datagram) {
                Ok(bytes) => {
                    self.metrics.record_sent(bytes);
                    return SendOutcome::Sent;
                }
                Err(e) if attempts < self.retry_count => {
                    attempts += 1;
                    self.metrics.record_send_retry();
                    tracing::debug!("Send failed (attempt {}): {}", attempts, e);
                    thread::sleep(RETRY_PAUSE);
                }
                Err(e) => {
                    self.metrics.record_send_error();
                    tracing::warn!("Dropping packet after {} attempts: {}", attempts + 1, e);
                    return SendOutcome::Dropped;
                }
            }
        }
    }

    fn update_congestion(&mut self, now: Instant) {
        self.recent_sends.push_back(now);
        if self.recent_sends.len() > RECENT_SEND_WINDOW {
            self.recent_sends.pop_front();
        }

        if self.recent_sends.len() >= 2 {
            let span = *self.recent_sends.back().unwrap() - *self.recent_sends.front().unwrap();
            let mean = span / (self.recent_sends.len() - 1) as u32;
            let threshold = self.frame_interval * 3 / 2;

            if mean > threshold {
                if !self.congestion {
                    self.congestion = true;
                    self.clear_since = None;
                    tracing::debug!("Congestion detected: mean interval {:?}", mean);
                }
                self.adaptive_delay =
                    (self.adaptive_delay + ADAPTIVE_DELAY_STEP).min(ADAPTIVE_DELAY_MAX);
            } else {
                if self.congestion {
                    self.congestion = false;
                    self.clear_since = Some(now);
                    tracing::debug!("Congestion cleared");
                }
                if self.adaptive_delay > Duration::ZERO {
                    if let Some(cleared) = self.clear_since {
                        if now.duration_since(cleared) >= CONGESTION_COOLDOWN {
                            // Geometric decay back toward zero
                            self.adaptive_delay /= 2;
                            if self.adaptive_delay < Duration::from_micros(100) {
                                self.adaptive_delay = Duration::ZERO;
                            }
                        }
                    }
                }
            }
        }

        self.metrics
            .set_adaptive_delay_us(self.adaptive_delay.as_micros() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::udp;
    use std::net::SocketAddr;

    fn socket_pair() -> (UdpSocket, UdpSocket) {
        let receiver = udp::bind_receiver(0, 65536).unwrap();
        let target = SocketAddr::from(([127, 0, 0, 1], receiver.local_addr().unwrap().port()));
        let sender = udp::connect_sender(target, 8192).unwrap();
        (sender, receiver)
    }

    #[test]
    fn test_pacing_holds_frame_interval() {
        let (tx, rx) = socket_pair();
        let metrics = StreamMetrics::new();
        let interval = Duration::from_millis(5);
        let mut sender = PacedSender::new(tx, interval, 2, metrics.clone());

        let frames = 20u32;
        let start = Instant::now();
        for _ in 0..frames {
            assert_eq!(sender.send_frame(&[0u8; 32]), SendOutcome::Sent);
        }
        let elapsed = start.elapsed();

        // First frame goes out immediately, the rest are paced. The lower
        // bound is exact up to TIMING_PRECISION per frame; the upper bound
        // just guards against runaway drift on a loaded machine.
        let nominal = interval * (frames - 1);
        assert!(elapsed + TIMING_PRECISION * frames >= nominal);
        assert!(elapsed < nominal * 3);

        assert_eq!(metrics.snapshot().packets_sent, frames as u64);

        // All datagrams actually arrived
        let mut buf = [0u8; 64];
        for _ in 0..frames {
            rx.recv(&mut buf).unwrap();
        }
    }

    #[test]
    fn test_slow_producer_flags_congestion() {
        let (tx, _rx) = socket_pair();
        let metrics = StreamMetrics::new();
        let interval = Duration::from_millis(2);
        let mut sender = PacedSender::new(tx, interval, 2, metrics);

        // Produce frames at 4x the nominal interval: the trailing mean
        // inter-send interval exceeds 1.5x and congestion must latch.
        for _ in 0..6 {
            sender.send_frame(&[0u8; 16]);
            thread::sleep(interval * 4);
        }

        assert!(sender.congestion());
        assert!(sender.adaptive_delay() > Duration::ZERO);
    }

    #[test]
    fn test_deadline_elapsed_after_interval() {
        let (tx, _rx) = socket_pair();
        let metrics = StreamMetrics::new();
        let interval = Duration::from_millis(5);
        let mut sender = PacedSender::new(tx, interval, 0, metrics);

        // Fresh sender is immediately due
        assert!(sender.deadline_elapsed());
        sender.send_frame(&[0u8; 16]);
        // Right after a send the next deadline is one interval away
        assert!(!sender.deadline_elapsed());
        thread::sleep(interval + Duration::from_millis(1));
        assert!(sender.deadline_elapsed());
    }
}
