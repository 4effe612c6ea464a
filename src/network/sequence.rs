//! Arrival-order sequence tracking
//!
//! Classifies each accepted packet as on-time, late, duplicate, or evidence
//! of a gap. Loss is inferred here only from sequence gaps, never from
//! timeouts; timeout-based loss decisions belong to the jitter buffer, which
//! can see playback urgency.

use std::collections::HashSet;

use crate::constants::{SEQUENCE_COMPACT_INTERVAL, SEQUENCE_WINDOW};

/// Returns true if `a` comes before `b` in the circular 32-bit sequence
/// space, using the standard half-space comparison.
pub(crate) fn seq_before(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < u32::MAX / 2
}

/// Classification of one arriving sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// First packet of the stream
    First,
    /// Exactly the expected next sequence
    OnTime,
    /// Arrived after its slot already passed the arrival high-water mark
    Late,
    /// Sequence number already seen
    Duplicate,
    /// Jumped ahead; this many packets are presumed lost in between
    Gap(u32),
}

/// Bounded set of recently seen sequence numbers, used for duplicate
/// detection. Compacting every [`SEQUENCE_COMPACT_INTERVAL`] insertions keeps
/// memory proportional to [`SEQUENCE_WINDOW`] regardless of stream length.
#[derive(Debug, Default)]
pub struct SequenceWindow {
    seen: HashSet<u32>,
    high_water: Option<u32>,
    insertions: u64,
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.seen.contains(&sequence)
    }

    pub fn insert(&mut self, sequence: u32) {
        self.seen.insert(sequence);

        match self.high_water {
            Some(high) if !seq_before(high, sequence) => {}
            _ => self.high_water = Some(sequence),
        }

        self.insertions += 1;
        if self.insertions % SEQUENCE_COMPACT_INTERVAL == 0 {
            self.compact();
        }
    }

    /// Drop entries that fell behind the retention window.
    fn compact(&mut self) {
        if let Some(high) = self.high_water {
            self.seen
                .retain(|&seq| high.wrapping_sub(seq) < SEQUENCE_WINDOW);
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Classifies packets in arrival order
#[derive(Debug, Default)]
pub struct SequenceTracker {
    expected_next: Option<u32>,
    seen: SequenceWindow,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one arriving sequence number and classify it.
    ///
    /// The expectation never moves backwards: late arrivals are reported but
    /// do not rewind the tracker.
    pub fn observe(&mut self, sequence: u32) -> SequenceEvent {
        if self.seen.contains(sequence) {
            return SequenceEvent::Duplicate;
        }

        let event = match self.expected_next {
            None => SequenceEvent::First,
            Some(expected) if sequence == expected => SequenceEvent::OnTime,
            Some(expected) if seq_before(sequence, expected) => SequenceEvent::Late,
            Some(expected) => SequenceEvent::Gap(sequence.wrapping_sub(expected)),
        };

        if !matches!(event, SequenceEvent::Late) {
            self.expected_next = Some(sequence.wrapping_add(1));
        }
        self.seen.insert(sequence);

        event
    }

    pub fn window_len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_before() {
        assert!(seq_before(0, 1));
        assert!(seq_before(u32::MAX, 0)); // wrap
        assert!(!seq_before(1, 0));
        assert!(!seq_before(5, 5));
    }

    #[test]
    fn test_in_order_stream() {
        let mut tracker = SequenceTracker::new();

        assert_eq!(tracker.observe(1), SequenceEvent::First);
        assert_eq!(tracker.observe(2), SequenceEvent::OnTime);
        assert_eq!(tracker.observe(3), SequenceEvent::OnTime);
    }

    #[test]
    fn test_gap_and_late() {
        let mut tracker = SequenceTracker::new();

        tracker.observe(1);
        tracker.observe(2);
        // 3 and 4 missing
        assert_eq!(tracker.observe(5), SequenceEvent::Gap(2));
        // 4 shows up afterwards: late, expectation stays at 6
        assert_eq!(tracker.observe(4), SequenceEvent::Late);
        assert_eq!(tracker.observe(6), SequenceEvent::OnTime);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut tracker = SequenceTracker::new();

        tracker.observe(1);
        tracker.observe(2);
        assert_eq!(tracker.observe(2), SequenceEvent::Duplicate);
        // Late packets re-sent are also duplicates once seen
        tracker.observe(5);
        tracker.observe(4);
        assert_eq!(tracker.observe(4), SequenceEvent::Duplicate);
    }

    #[test]
    fn test_first_packet_not_sequence_zero() {
        let mut tracker = SequenceTracker::new();

        assert_eq!(tracker.observe(100), SequenceEvent::First);
        assert_eq!(tracker.observe(101), SequenceEvent::OnTime);
    }

    #[test]
    fn test_sequence_wrap() {
        let mut tracker = SequenceTracker::new();

        assert_eq!(tracker.observe(u32::MAX - 1), SequenceEvent::First);
        assert_eq!(tracker.observe(u32::MAX), SequenceEvent::OnTime);
        assert_eq!(tracker.observe(0), SequenceEvent::OnTime);
        assert_eq!(tracker.observe(1), SequenceEvent::OnTime);
    }

    #[test]
    fn test_window_stays_bounded() {
        let mut tracker = SequenceTracker::new();

        for seq in 0..10_000u32 {
            tracker.observe(seq);
        }

        // Compaction runs every SEQUENCE_COMPACT_INTERVAL insertions and
        // trims to the retention window, so the set can never hold more than
        // one interval beyond the window.
        assert!(
            tracker.window_len() <= (SEQUENCE_WINDOW as u64 + SEQUENCE_COMPACT_INTERVAL) as usize
        );
    }

    #[test]
    fn test_compacted_entries_forgotten() {
        let mut window = SequenceWindow::new();

        for seq in 0..2_000u32 {
            window.insert(seq);
        }

        // Old entries were compacted away; recent ones remain
        assert!(!window.contains(0));
        assert!(window.contains(1_999));
    }
}
