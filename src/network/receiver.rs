//! UDP receive loop
//!
//! Blocks on the socket with a short timeout, parses datagrams, classifies
//! their sequence numbers, and admits them to the jitter buffer. Malformed
//! datagrams and duplicates are dropped here and only show up in counters;
//! nothing on this path is fatal once the stream is running.

use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::constants::MAX_PACKET_SIZE;
use crate::jitter::JitterBuffer;
use crate::metrics::{JitterEstimator, StreamMetrics};
use crate::network::sequence::{SequenceEvent, SequenceTracker};
use crate::protocol;

/// Receive-thread state; consumed by [`ReceiveLoop::run`].
pub struct ReceiveLoop {
    socket: UdpSocket,
    engine: Arc<Mutex<JitterBuffer>>,
    metrics: Arc<StreamMetrics>,
    running: Arc<AtomicBool>,
    tracker: SequenceTracker,
    jitter: JitterEstimator,
    stats_interval: u64,
    started: Instant,
}

impl ReceiveLoop {
    pub fn new(
        socket: UdpSocket,
        engine: Arc<Mutex<JitterBuffer>>,
        metrics: Arc<StreamMetrics>,
        running: Arc<AtomicBool>,
        stats_interval: u64,
    ) -> Self {
        Self {
            socket,
            engine,
            metrics,
            running,
            tracker: SequenceTracker::new(),
            jitter: JitterEstimator::new(),
            stats_interval: stats_interval.max(1),
            started: Instant::now(),
        }
    }

    /// Run until the shared running flag clears. The socket read timeout
    /// bounds how long each iteration can block.
    pub fn run(mut self) {
        let mut buf = [0u8; MAX_PACKET_SIZE + 64];

        while self.running.load(Ordering::Relaxed) {
            match self.socket.recv(&mut buf) {
                Ok(len) => self.handle_datagram(&buf[..len]),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    if self.running.load(Ordering::Relaxed) {
                        tracing::warn!("Socket receive error: {}", e);
                    }
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8]) {
        let packet = match protocol::decode(data) {
            Ok(packet) => packet,
            Err(_) => {
                self.metrics.record_malformed();
                tracing::debug!("Dropping malformed datagram ({} bytes)", data.len());
                return;
            }
        };

        self.metrics.record_received(data.len());

        let arrival_us = self.started.elapsed().as_micros() as u64;
        let jitter = self.jitter.update(packet.timestamp, arrival_us);
        self.metrics.set_jitter_us(jitter);

        match self.tracker.observe(packet.sequence) {
            SequenceEvent::Duplicate => {
                self.metrics.record_duplicate();
                return;
            }
            SequenceEvent::Late => {
                // Reordered arrival; the jitter buffer decides whether its
                // slot is still open.
                self.metrics.record_late();
            }
            SequenceEvent::Gap(missing) => {
                tracing::debug!(
                    "Sequence gap: {} packets missing before {}",
                    missing,
                    packet.sequence
                );
            }
            SequenceEvent::First | SequenceEvent::OnTime => {}
        }

        self.engine.lock().admit(packet);

        let received = self.metrics.packets_received();
        if received % self.stats_interval == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            let snap = self.metrics.snapshot();
            tracing::info!(
                "Received {} packets ({:.1} pkt/s), loss {:.2}%, jitter {:.1}ms, buffer {}/{}",
                received,
                received as f64 / elapsed.max(1e-9),
                snap.loss_rate() * 100.0,
                snap.jitter_us as f64 / 1000.0,
                snap.jitter_depth,
                snap.jitter_target_depth,
            );
        }
    }
}
