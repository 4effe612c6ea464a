//! Sending session
//!
//! Capture callback → bridge → frame accumulation → Opus encode → paced UDP
//! transmission. The transmission thread owns the encoder and scheduler; the
//! capture callback never blocks on either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::bridge::{create_shared_queue, SharedFrameQueue};
use crate::audio::capture::AudioCapture;
use crate::codec::OpusEncoder;
use crate::config::AppConfig;
use crate::constants::BRIDGE_CAPACITY;
use crate::error::Result;
use crate::metrics::StreamMetrics;
use crate::network::sender::PacedSender;
use crate::network::udp;
use crate::protocol;

/// One live sending session
pub struct SenderSession {
    config: AppConfig,
    running: Arc<AtomicBool>,
    metrics: Arc<StreamMetrics>,
    capture: Option<AudioCapture>,
    tx_handle: Option<JoinHandle<()>>,
}

impl SenderSession {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            metrics: StreamMetrics::new(),
            capture: None,
            tx_handle: None,
        }
    }

    /// Acquire the socket, encoder, and capture device, then start streaming.
    ///
    /// Resource acquisition failures here are fatal; once running, errors are
    /// absorbed into counters.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let audio = &self.config.audio;
        let stream = &self.config.stream;
        let frame_samples = stream.frame_samples(audio.sample_rate);

        let socket = udp::connect_sender(
            self.config.network.target_addr(),
            self.config.network.send_buffer_size,
        )?;
        let encoder = OpusEncoder::new(
            audio.sample_rate,
            audio.channels,
            stream.bitrate,
            frame_samples,
        )?;

        let capture_queue = create_shared_queue(BRIDGE_CAPACITY);
        let mut capture = AudioCapture::new(
            audio.input_device.clone(),
            audio.sample_rate,
            audio.channels,
            capture_queue.clone(),
            self.metrics.clone(),
        )?;

        self.running.store(true, Ordering::SeqCst);
        capture.start()?;

        let paced = PacedSender::new(
            socket,
            stream.frame_interval(),
            self.config.network.retry_count,
            self.metrics.clone(),
        );

        let running = self.running.clone();
        let channels = audio.channels;
        let handle = thread::Builder::new()
            .name("audio-tx".to_string())
            .spawn(move || {
                transmission_loop(running, capture_queue, encoder, paced, frame_samples, channels)
            })?;

        self.capture = Some(capture);
        self.tx_handle = Some(handle);

        tracing::info!(
            "Sender started: {} -> {}",
            audio.sample_rate,
            self.config.network.target_addr()
        );
        Ok(())
    }

    /// Signal all loops to stop, then join them before releasing resources.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.tx_handle.take() {
            let _ = handle.join();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }
}

impl Drop for SenderSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accumulate capture blocks into exact frame-sized chunks and send them at
/// the pacing cadence. When the capture side starves past a deadline, an
/// encoded silence frame goes out instead so the cadence never breaks.
fn transmission_loop(
    running: Arc<AtomicBool>,
    capture_queue: SharedFrameQueue,
    mut encoder: OpusEncoder,
    mut paced: PacedSender,
    frame_samples: usize,
    channels: u16,
) {
    let samples_per_frame = frame_samples * channels as usize;
    let mut accumulator: Vec<f32> = Vec::with_capacity(samples_per_frame * 2);
    let mut sequence: u32 = 0;
    let started = Instant::now();
    let silence = vec![0.0f32; samples_per_frame];

    while running.load(Ordering::Relaxed) {
        while accumulator.len() < samples_per_frame {
            match capture_queue.pop() {
                Some(block) => accumulator.extend_from_slice(&block.samples),
                None => break,
            }
        }

        if accumulator.len() >= samples_per_frame {
            let frame: Vec<f32> = accumulator.drain(..samples_per_frame).collect();
            send_one(&mut encoder, &mut paced, &frame, &mut sequence, started);
        } else if paced.deadline_elapsed() {
            send_one(&mut encoder, &mut paced, &silence, &mut sequence, started);
        } else {
            thread::sleep(Duration::from_micros(500));
        }
    }
}

fn send_one(
    encoder: &mut OpusEncoder,
    paced: &mut PacedSender,
    samples: &[f32],
    sequence: &mut u32,
    started: Instant,
) {
    match encoder.encode(samples) {
        Ok(payload) => {
            let timestamp = started.elapsed().as_micros() as u64;
            let datagram = protocol::encode(*sequence, timestamp, &payload);
            paced.send_frame(&datagram);
            *sequence = sequence.wrapping_add(1);
        }
        Err(e) => {
            tracing::warn!("Encoding failed: {}", e);
        }
    }
}
