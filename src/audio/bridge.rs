//! Real-time / network boundary queues
//!
//! A fixed-capacity single-producer single-consumer frame queue sits on each
//! side of the audio callback: capture callback → transmission thread, and
//! playout thread → render callback. Both ends are non-blocking; overflow
//! drops the oldest frame so latency stays bounded, underflow hands back
//! nothing and the caller substitutes silence.

use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Audio frame containing interleaved samples
#[derive(Clone)]
pub struct AudioFrame {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self { samples, channels }
    }

    /// Silence of the given interleaved length
    pub fn silence(len: usize, channels: u16) -> Self {
        Self {
            samples: vec![0.0; len],
            channels,
        }
    }

    /// Number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Bounded SPSC frame queue for the real-time boundary
pub struct FrameQueue {
    queue: ArrayQueue<AudioFrame>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Push a frame, displacing the oldest queued frame when full.
    ///
    /// Returns the displaced frame so the caller can count the overrun.
    pub fn push(&self, frame: AudioFrame) -> Option<AudioFrame> {
        self.queue.force_push(frame)
    }

    /// Pop the next frame; `None` means the consumer ran dry.
    pub fn pop(&self) -> Option<AudioFrame> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a frame queue
pub type SharedFrameQueue = Arc<FrameQueue>;

/// Create a new shared frame queue
pub fn create_shared_queue(capacity: usize) -> SharedFrameQueue {
    Arc::new(FrameQueue::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(marker: f32) -> AudioFrame {
        AudioFrame::new(vec![marker; 4], 2)
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(4);

        assert!(queue.push(frame(1.0)).is_none());
        assert!(queue.push(frame(2.0)).is_none());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().samples[0], 1.0);
        assert_eq!(queue.pop().unwrap().samples[0], 2.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = FrameQueue::new(2);

        assert!(queue.push(frame(1.0)).is_none());
        assert!(queue.push(frame(2.0)).is_none());

        // Full: the newest frame is admitted, the oldest comes back out
        let displaced = queue.push(frame(3.0)).unwrap();
        assert_eq!(displaced.samples[0], 1.0);

        assert_eq!(queue.pop().unwrap().samples[0], 2.0);
        assert_eq!(queue.pop().unwrap().samples[0], 3.0);
    }

    #[test]
    fn test_pop_empty_is_non_blocking() {
        let queue = FrameQueue::new(2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_samples_per_channel() {
        let frame = AudioFrame::new(vec![0.0; 960 * 2], 2);
        assert_eq!(frame.samples_per_channel(), 960);

        let silence = AudioFrame::silence(8, 2);
        assert_eq!(silence.samples.len(), 8);
        assert!(silence.samples.iter().all(|&s| s == 0.0));
    }
}
