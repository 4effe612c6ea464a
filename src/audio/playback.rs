//! Audio playback to the output device
//!
//! Mirror of the capture side: the cpal output stream lives on its own
//! thread and its callback only drains the render bridge. Decoded frame
//! sizes need not match the device's block size — leftover samples carry
//! over to the next callback, and a dry queue fills the rest with silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::bridge::SharedFrameQueue;
use crate::audio::device::find_output_device;
use crate::error::AudioError;
use crate::metrics::StreamMetrics;

/// Audio playback instance for a single output device
pub struct AudioPlayback {
    device_selector: Option<String>,
    running: Arc<AtomicBool>,

    /// Bridge supplying decoded (or concealed) frames
    input_queue: SharedFrameQueue,

    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
    config: StreamConfig,
    metrics: Arc<StreamMetrics>,
}

impl AudioPlayback {
    pub fn new(
        device_selector: Option<String>,
        sample_rate: u32,
        channels: u16,
        input_queue: SharedFrameQueue,
        metrics: Arc<StreamMetrics>,
    ) -> Result<Self, AudioError> {
        // Resolve the device now so a bad selector fails at startup
        find_output_device(device_selector.as_deref())?;

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device_selector,
            running: Arc::new(AtomicBool::new(false)),
            input_queue,
            thread_handle: None,
            error_rx: None,
            config,
            metrics,
        })
    }

    /// Start playback
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = find_output_device(self.device_selector.as_deref())?;
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let input_queue = self.input_queue.clone();
        let metrics = self.metrics.clone();
        let config = self.config.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                // Carry-over between callbacks when frame and block sizes differ
                let mut pending: Vec<f32> = Vec::new();
                let mut pending_pos = 0usize;

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }

                        let mut filled = 0;
                        while filled < data.len() {
                            if pending_pos < pending.len() {
                                let take = (pending.len() - pending_pos).min(data.len() - filled);
                                data[filled..filled + take]
                                    .copy_from_slice(&pending[pending_pos..pending_pos + take]);
                                pending_pos += take;
                                filled += take;
                            } else {
                                match input_queue.pop() {
                                    Some(frame) => {
                                        pending = frame.samples;
                                        pending_pos = 0;
                                    }
                                    None => {
                                        // Queue dry: silence, never block
                                        data[filled..].fill(0.0);
                                        metrics.record_underrun();
                                        break;
                                    }
                                }
                            }
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start playback stream: {}", e);
                            return;
                        }

                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build playback stream: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Check for asynchronous stream errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bridge::create_shared_queue;
    use crate::audio::device::list_devices;

    #[test]
    fn test_playback_creation() {
        let devices = list_devices();
        if devices.iter().any(|d| d.is_output) {
            let queue = create_shared_queue(64);
            let playback = AudioPlayback::new(None, 48000, 2, queue, StreamMetrics::new());
            assert!(playback.is_ok());
        }
    }
}
