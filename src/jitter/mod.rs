//! Adaptive jitter buffer
//!
//! Receive-side holding area keyed by sequence number. Packets are admitted
//! in arrival order and released strictly in sequence order at the playout
//! cadence; a slot whose packet never shows up is eventually conceded as
//! lost and replaced with concealment audio.
//!
//! The target depth adapts continuously: bursts grow it (buffer more,
//! tolerate more reordering), sustained calm shrinks it (less latency).
//! Once a sequence is conceded, it is never released retroactively — a
//! straggler that arrives afterwards lands in the late path and is dropped.

use bytes::Bytes;
use std::collections::BTreeMap;

use crate::network::sequence::seq_before;
use crate::protocol::Packet;

/// Consecutive all-empty playout cycles before the target depth steps down
const DEPTH_DECAY_CYCLES: u32 = 25;

/// Hard occupancy bound as a multiple of the depth ceiling
const SLOT_CAPACITY_FACTOR: u32 = 4;

/// One pending packet awaiting release
#[derive(Debug, Clone)]
pub struct JitterSlot {
    pub sequence: u32,
    pub timestamp: u64,
    pub payload: Bytes,
}

/// Decision for one playout cycle
#[derive(Debug, Clone)]
pub enum Playout {
    /// The expected packet is buffered; decode and play it
    Frame(JitterSlot),
    /// The expected packet is conceded lost; play concealment for it
    Conceal(u32),
    /// Keep waiting, nothing to play this cycle
    Wait,
}

/// Sequence-ordered packet buffer with adaptive depth
#[derive(Debug)]
pub struct JitterBuffer {
    slots: BTreeMap<u32, JitterSlot>,
    expected: Option<u32>,
    last_released: Option<u32>,
    target_depth: u32,
    min_depth: u32,
    max_depth: u32,
    /// Hard occupancy bound; admission past it is refused
    capacity: u32,
    /// Playout cycles spent waiting for the current expected sequence
    wait_cycles: u32,
    /// Consecutive cycles with an empty buffer, drives depth decay
    empty_cycles: u32,
}

impl JitterBuffer {
    pub fn new(min_depth: u32, max_depth: u32) -> Self {
        assert!(min_depth <= max_depth);
        Self {
            slots: BTreeMap::new(),
            expected: None,
            last_released: None,
            target_depth: min_depth,
            min_depth,
            max_depth,
            capacity: (max_depth * SLOT_CAPACITY_FACTOR).max(16),
            wait_cycles: 0,
            empty_cycles: 0,
        }
    }

    /// Admit an arriving packet.
    ///
    /// Returns false when the packet is dropped: already past its playout
    /// slot, a duplicate of a buffered entry, or the buffer is at its hard
    /// occupancy bound. The first admitted packet seeds the expected
    /// sequence.
    pub fn admit(&mut self, packet: Packet) -> bool {
        let sequence = packet.sequence;

        match self.expected {
            Some(expected) if seq_before(sequence, expected) => return false,
            Some(_) => {}
            None => self.expected = Some(sequence),
        }

        if self.slots.contains_key(&sequence) {
            return false;
        }

        if self.occupancy() >= self.capacity {
            return false;
        }

        self.slots.insert(
            sequence,
            JitterSlot {
                sequence,
                timestamp: packet.timestamp,
                payload: packet.payload,
            },
        );
        true
    }

    /// Decide what to play this cycle. Call once per frame period.
    ///
    /// The expected slot is released if buffered. Otherwise the engine waits:
    /// once it has spent `target_depth` cycles on the slot, or later packets
    /// have piled up past `target_depth`, the slot is conceded lost. An empty
    /// buffer is starvation rather than loss, so it only ever yields `Wait`.
    pub fn release_due(&mut self) -> Playout {
        let expected = match self.expected {
            Some(e) => e,
            None => return Playout::Wait,
        };

        let action = if let Some(slot) = self.slots.remove(&expected) {
            self.wait_cycles = 0;
            self.last_released = Some(expected);
            self.expected = Some(expected.wrapping_add(1));
            Playout::Frame(slot)
        } else if !self.slots.is_empty()
            && (self.wait_cycles >= self.target_depth || self.occupancy() > self.target_depth)
        {
            self.wait_cycles = 0;
            self.expected = Some(expected.wrapping_add(1));
            Playout::Conceal(expected)
        } else {
            if !self.slots.is_empty() {
                self.wait_cycles += 1;
            }
            Playout::Wait
        };

        self.adapt();
        action
    }

    /// Continuous depth adaptation: grow on bursts, shrink after sustained
    /// calm. Bounded by `[min_depth, max_depth]`.
    fn adapt(&mut self) {
        let occupancy = self.occupancy();

        if occupancy > self.target_depth {
            self.empty_cycles = 0;
            if self.target_depth < self.max_depth {
                self.target_depth += 1;
                tracing::debug!("Jitter buffer depth increased to {}", self.target_depth);
            }
        } else if occupancy == 0 {
            self.empty_cycles += 1;
            if self.empty_cycles >= DEPTH_DECAY_CYCLES {
                self.empty_cycles = 0;
                if self.target_depth > self.min_depth {
                    self.target_depth -= 1;
                    tracing::debug!("Jitter buffer depth decreased to {}", self.target_depth);
                }
            }
        } else {
            self.empty_cycles = 0;
        }
    }

    /// Number of buffered packets
    pub fn occupancy(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn target_depth(&self) -> u32 {
        self.target_depth
    }

    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    pub fn last_released(&self) -> Option<u32> {
        self.last_released
    }

    /// Clear all state back to stream-start values.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.expected = None;
        self.last_released = None;
        self.target_depth = self.min_depth;
        self.wait_cycles = 0;
        self.empty_cycles = 0;
    }
}

/// Builds substitute PCM for lost playout slots.
///
/// Replays the most recently released frame through a linear fade from half
/// amplitude down to silence, so a gap never lands as a hard discontinuity.
/// Repeated concealment decays geometrically toward silence. With no prior
/// frame, the output is silence.
#[derive(Debug)]
pub struct Concealer {
    last_frame: Option<Vec<f32>>,
    frame_len: usize,
    channels: usize,
}

impl Concealer {
    /// `frame_len` is the interleaved sample count of one frame.
    pub fn new(frame_len: usize, channels: u16) -> Self {
        Self {
            last_frame: None,
            frame_len,
            channels: channels.max(1) as usize,
        }
    }

    /// Record the most recently released decoded frame.
    pub fn remember(&mut self, frame: &[f32]) {
        self.last_frame = Some(frame.to_vec());
    }

    /// Produce one concealment frame.
    pub fn conceal(&mut self) -> Vec<f32> {
        match self.last_frame.take() {
            Some(last) => {
                let frames = (last.len() / self.channels).max(1);
                let concealed: Vec<f32> = last
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let position = (i / self.channels) as f32 / frames as f32;
                        s * 0.5 * (1.0 - position)
                    })
                    .collect();
                // Keep the faded copy so back-to-back losses keep decaying
                self.last_frame = Some(concealed.clone());
                concealed
            }
            None => vec![0.0; self.frame_len],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    fn packet(sequence: u32) -> Packet {
        protocol::decode(&protocol::encode(
            sequence,
            sequence as u64 * 20_000,
            &[sequence as u8; 4],
        ))
        .unwrap()
    }

    /// Drive the engine until it yields a non-Wait action or gives up.
    fn next_action(buffer: &mut JitterBuffer, max_cycles: u32) -> Option<Playout> {
        for _ in 0..max_cycles {
            match buffer.release_due() {
                Playout::Wait => continue,
                action => return Some(action),
            }
        }
        None
    }

    #[test]
    fn test_in_order_release() {
        let mut buffer = JitterBuffer::new(2, 10);

        for seq in 1..=3 {
            assert!(buffer.admit(packet(seq)));
        }

        for expected in 1..=3u32 {
            match buffer.release_due() {
                Playout::Frame(slot) => assert_eq!(slot.sequence, expected),
                other => panic!("expected frame {}, got {:?}", expected, other),
            }
        }
        assert!(matches!(buffer.release_due(), Playout::Wait));
    }

    #[test]
    fn test_reorder_released_in_sequence() {
        let mut buffer = JitterBuffer::new(2, 10);

        // 5 arrives before 4
        buffer.admit(packet(3));
        buffer.admit(packet(5));
        buffer.admit(packet(4));

        let mut released = Vec::new();
        for _ in 0..3 {
            if let Playout::Frame(slot) = buffer.release_due() {
                released.push(slot.sequence);
            }
        }
        assert_eq!(released, vec![3, 4, 5]);
    }

    #[test]
    fn test_duplicate_admission_rejected() {
        let mut buffer = JitterBuffer::new(2, 10);

        assert!(buffer.admit(packet(1)));
        assert!(!buffer.admit(packet(1)));
        assert_eq!(buffer.occupancy(), 1);
    }

    #[test]
    fn test_late_admission_rejected_after_release() {
        let mut buffer = JitterBuffer::new(2, 10);

        buffer.admit(packet(1));
        buffer.admit(packet(2));
        assert!(matches!(buffer.release_due(), Playout::Frame(_)));

        // 1 was already released
        assert!(!buffer.admit(packet(1)));
    }

    #[test]
    fn test_missing_slot_concealed_after_wait() {
        // The concrete scenario: 1, 2, 4, 5 admitted, 3 missing, depth 2.
        let mut buffer = JitterBuffer::new(2, 10);
        for seq in [1u32, 2, 4, 5] {
            buffer.admit(packet(seq));
        }

        let mut outputs = Vec::new();
        let mut losses = 0;
        for _ in 0..32 {
            match buffer.release_due() {
                Playout::Frame(slot) => outputs.push(Some(slot.sequence)),
                Playout::Conceal(seq) => {
                    outputs.push(None);
                    losses += 1;
                    assert_eq!(seq, 3);
                }
                Playout::Wait => {}
            }
            if outputs.len() == 5 {
                break;
            }
        }

        assert_eq!(
            outputs,
            vec![Some(1), Some(2), None, Some(4), Some(5)],
            "exactly five outputs with concealment in slot 3"
        );
        assert_eq!(losses, 1);
    }

    #[test]
    fn test_conceded_sequence_never_released_late() {
        let mut buffer = JitterBuffer::new(1, 1);

        buffer.admit(packet(1));
        buffer.admit(packet(3));
        assert!(matches!(buffer.release_due(), Playout::Frame(_)));

        // Wait out slot 2 until it is conceded
        match next_action(&mut buffer, 16) {
            Some(Playout::Conceal(2)) => {}
            other => panic!("expected concealment of 2, got {:?}", other),
        }

        // The straggler arrives after concession: dropped, never re-released
        assert!(!buffer.admit(packet(2)));
        match next_action(&mut buffer, 16) {
            Some(Playout::Frame(slot)) => assert_eq!(slot.sequence, 3),
            other => panic!("expected frame 3, got {:?}", other),
        }
    }

    #[test]
    fn test_strictly_increasing_release_order() {
        // Shuffled admission with duplicates and a gap: releases must be
        // strictly increasing with no repeats.
        let mut buffer = JitterBuffer::new(2, 10);
        for seq in [1u32, 4, 3, 1, 6, 4, 2] {
            buffer.admit(packet(seq));
        }

        let mut released = Vec::new();
        for _ in 0..64 {
            match buffer.release_due() {
                Playout::Frame(slot) => released.push(slot.sequence),
                Playout::Conceal(seq) => {
                    // 5 is the only missing sequence in 1..=6
                    assert_eq!(seq, 5);
                }
                Playout::Wait => {}
            }
            if buffer.occupancy() == 0 {
                break;
            }
        }

        assert_eq!(released, vec![1, 2, 3, 4, 6]);
        for pair in released.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_empty_buffer_is_starvation_not_loss() {
        let mut buffer = JitterBuffer::new(2, 10);

        buffer.admit(packet(1));
        assert!(matches!(buffer.release_due(), Playout::Frame(_)));

        // Nothing else buffered: trailing silence must not be declared loss
        for _ in 0..100 {
            assert!(matches!(buffer.release_due(), Playout::Wait));
        }
    }

    #[test]
    fn test_depth_grows_on_burst_and_decays_when_calm() {
        let mut buffer = JitterBuffer::new(2, 10);

        // Burst: far more buffered than the target depth
        for seq in 1..=8 {
            buffer.admit(packet(seq));
        }
        let before = buffer.target_depth();
        buffer.release_due();
        assert!(buffer.target_depth() > before);

        // Drain and stay calm: depth steps back down toward the floor
        while buffer.occupancy() > 0 {
            buffer.release_due();
        }
        let grown = buffer.target_depth();
        for _ in 0..(DEPTH_DECAY_CYCLES * (grown - 2 + 1)) {
            buffer.release_due();
        }
        assert_eq!(buffer.target_depth(), 2);
    }

    #[test]
    fn test_occupancy_hard_bounded() {
        let mut buffer = JitterBuffer::new(2, 10);

        // Flood far past any reasonable backlog; the map must stay bounded
        // no matter how many packets are admitted.
        for seq in 1..=10_000u32 {
            buffer.admit(packet(seq));
        }
        assert!(buffer.occupancy() <= 10 * SLOT_CAPACITY_FACTOR);
    }

    #[test]
    fn test_depth_bounded_by_max() {
        let mut buffer = JitterBuffer::new(1, 3);

        for seq in 1..=50 {
            buffer.admit(packet(seq));
        }
        for _ in 0..50 {
            buffer.release_due();
        }
        assert!(buffer.target_depth() <= 3);
    }

    #[test]
    fn test_loss_accounting() {
        // Sequences 1..=20 with a known subset dropped before admission
        let dropped = [4u32, 9, 15];
        let mut buffer = JitterBuffer::new(2, 10);

        for seq in 1..=20u32 {
            if !dropped.contains(&seq) {
                buffer.admit(packet(seq));
            }
        }

        let mut concealed = Vec::new();
        let mut released = 0;
        for _ in 0..256 {
            match buffer.release_due() {
                Playout::Frame(_) => released += 1,
                Playout::Conceal(seq) => concealed.push(seq),
                Playout::Wait => {}
            }
            if buffer.occupancy() == 0 {
                break;
            }
        }

        assert_eq!(concealed, dropped);
        assert_eq!(released, 17);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut buffer = JitterBuffer::new(2, 10);

        for seq in 1..=8 {
            buffer.admit(packet(seq));
        }
        buffer.release_due();
        buffer.reset();

        assert_eq!(buffer.occupancy(), 0);
        assert_eq!(buffer.expected(), None);
        assert_eq!(buffer.target_depth(), 2);
        assert!(matches!(buffer.release_due(), Playout::Wait));
    }

    #[test]
    fn test_concealer_silence_without_history() {
        let mut concealer = Concealer::new(8, 2);
        assert_eq!(concealer.conceal(), vec![0.0; 8]);
    }

    #[test]
    fn test_concealer_fades_last_frame() {
        let mut concealer = Concealer::new(4, 1);
        concealer.remember(&[1.0, 1.0, 1.0, 1.0]);

        let out = concealer.conceal();
        assert_eq!(out.len(), 4);
        // Starts at half amplitude and fades monotonically toward zero
        assert!((out[0] - 0.5).abs() < 1e-6);
        for pair in out.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!(*out.last().unwrap() >= 0.0);
    }

    #[test]
    fn test_concealer_repeated_losses_decay() {
        let mut concealer = Concealer::new(4, 1);
        concealer.remember(&[1.0, 1.0, 1.0, 1.0]);

        let first = concealer.conceal();
        let second = concealer.conceal();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(b <= a);
        }
    }

    #[test]
    fn test_concealer_stereo_fade_matches_across_channels() {
        let mut concealer = Concealer::new(8, 2);
        concealer.remember(&[1.0; 8]);

        let out = concealer.conceal();
        // Interleaved pairs share one gain value per sample frame
        for pair in out.chunks(2) {
            assert!((pair[0] - pair[1]).abs() < 1e-6);
        }
    }
}
