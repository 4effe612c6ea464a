//! Receiving session
//!
//! UDP receive thread → jitter buffer → playout thread (decode/conceal) →
//! render bridge → playback callback. The playout tick runs on wall-clock
//! deadlines, independent of packet arrival, so concealment timing does not
//! depend on the network delivering anything.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::bridge::{create_shared_queue, AudioFrame, SharedFrameQueue};
use crate::audio::playback::AudioPlayback;
use crate::codec::OpusDecoder;
use crate::config::AppConfig;
use crate::constants::BRIDGE_CAPACITY;
use crate::error::Result;
use crate::jitter::{Concealer, JitterBuffer, Playout};
use crate::metrics::StreamMetrics;
use crate::network::receiver::ReceiveLoop;
use crate::network::udp;

/// One live receiving session
pub struct ReceiverSession {
    config: AppConfig,
    running: Arc<AtomicBool>,
    metrics: Arc<StreamMetrics>,
    engine: Arc<Mutex<JitterBuffer>>,
    playback: Option<AudioPlayback>,
    rx_handle: Option<JoinHandle<()>>,
    playout_handle: Option<JoinHandle<()>>,
}

impl ReceiverSession {
    pub fn new(config: AppConfig) -> Self {
        let engine = Arc::new(Mutex::new(JitterBuffer::new(
            config.stream.jitter_min_depth,
            config.stream.jitter_max_depth,
        )));
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            metrics: StreamMetrics::new(),
            engine,
            playback: None,
            rx_handle: None,
            playout_handle: None,
        }
    }

    /// Bind the socket, open the output device, and start all loops.
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

        let socket = udp::bind_receiver(
            self.config.network.port,
            self.config.network.recv_buffer_size,
        )?;
        let decoder = OpusDecoder::new(audio.sample_rate, audio.channels, frame_samples)?;

        let render_queue = create_shared_queue(BRIDGE_CAPACITY);
        let mut playback = AudioPlayback::new(
            audio.output_device.clone(),
            audio.sample_rate,
            audio.channels,
            render_queue.clone(),
            self.metrics.clone(),
        )?;

        self.engine.lock().reset();
        self.running.store(true, Ordering::SeqCst);
        playback.start()?;

        let rx = ReceiveLoop::new(
            socket,
            self.engine.clone(),
            self.metrics.clone(),
            self.running.clone(),
            self.config.logging.stats_interval,
        );
        let rx_handle = thread::Builder::new()
            .name("net-rx".to_string())
            .spawn(move || rx.run())?;

        let running = self.running.clone();
        let engine = self.engine.clone();
        let metrics = self.metrics.clone();
        let concealer = Concealer::new(frame_samples * audio.channels as usize, audio.channels);
        let frame_interval = stream.frame_interval();
        let channels = audio.channels;
        let playout_handle = thread::Builder::new()
            .name("playout".to_string())
            .spawn(move || {
                playout_loop(
                    running,
                    engine,
                    decoder,
                    concealer,
                    render_queue,
                    metrics,
                    frame_interval,
                    channels,
                )
            })?;

        self.playback = Some(playback);
        self.rx_handle = Some(rx_handle);
        self.playout_handle = Some(playout_handle);

        tracing::info!("Receiver started on port {}", self.config.network.port);
        Ok(())
    }

    /// Signal all loops to stop, then join them before releasing resources.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.rx_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.playout_handle.take() {
            let _ = handle.join();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }
}

impl Drop for ReceiverSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fixed-period playout: one engine decision per frame interval, with decode
/// and concealment kept outside the engine lock.
#[allow(clippy::too_many_arguments)]
fn playout_loop(
    running: Arc<AtomicBool>,
    engine: Arc<Mutex<JitterBuffer>>,
    mut decoder: OpusDecoder,
    mut concealer: Concealer,
    render_queue: SharedFrameQueue,
    metrics: Arc<StreamMetrics>,
    frame_interval: Duration,
    channels: u16,
) {
    let mut next_tick = Instant::now() + frame_interval;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next_tick {
            thread::sleep((next_tick - now).min(Duration::from_millis(10)));
            continue;
        }
        next_tick += frame_interval;

        playout_cycle(
            &engine,
            &mut decoder,
            &mut concealer,
            &render_queue,
            &metrics,
            channels,
        );
    }
}

/// One playout decision: ask the engine what is due, then decode or conceal.
fn playout_cycle(
    engine: &Mutex<JitterBuffer>,
    decoder: &mut OpusDecoder,
    concealer: &mut Concealer,
    render_queue: &SharedFrameQueue,
    metrics: &StreamMetrics,
    channels: u16,
) {
    let (action, occupancy, depth) = {
        let mut engine = engine.lock();
        let action = engine.release_due();
        (action, engine.occupancy(), engine.target_depth())
    };
    metrics.set_jitter_depth(occupancy, depth);

    let pcm = match action {
        Playout::Frame(slot) => match decoder.decode(&slot.payload) {
            Ok(pcm) => {
                concealer.remember(&pcm);
                Some(pcm)
            }
            Err(e) => {
                // A corrupt payload is a lost slot: conceal and move on
                tracing::debug!("Decode failed for frame {}: {}", slot.sequence, e);
                metrics.record_decode_error();
                metrics.record_lost(1);
                metrics.record_concealed();
                Some(concealer.conceal())
            }
        },
        Playout::Conceal(sequence) => {
            tracing::debug!("Concealing missing frame {}", sequence);
            metrics.record_lost(1);
            metrics.record_concealed();
            Some(concealer.conceal())
        }
        Playout::Wait => None,
    };

    if let Some(samples) = pcm {
        if render_queue.push(AudioFrame::new(samples, channels)).is_some() {
            metrics.record_overrun();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OpusEncoder;
    use crate::protocol;

    fn opus_packet(encoder: &mut OpusEncoder, sequence: u32) -> crate::protocol::Packet {
        let samples = vec![0.1f32; encoder.samples_per_frame()];
        let payload = encoder.encode(&samples).unwrap();
        protocol::decode(&protocol::encode(sequence, sequence as u64 * 20_000, &payload)).unwrap()
    }

    #[test]
    fn test_session_lifecycle_without_start() {
        let session = ReceiverSession::new(AppConfig::default());
        assert!(!session.is_running());
        assert_eq!(session.metrics().snapshot().packets_received, 0);
    }

    #[test]
    fn test_playout_pipeline_releases_and_conceals() {
        // Full receive-side pipeline minus devices: engine → decode/conceal
        // → render bridge, with sequence 3 missing.
        let mut encoder = OpusEncoder::new(48000, 2, 128_000, 960).unwrap();
        let mut decoder = OpusDecoder::new(48000, 2, 960).unwrap();
        let engine = Mutex::new(JitterBuffer::new(2, 2));
        let mut concealer = Concealer::new(1920, 2);
        let render_queue = create_shared_queue(BRIDGE_CAPACITY);
        let metrics = StreamMetrics::new();

        for seq in [1u32, 2, 4, 5] {
            engine.lock().admit(opus_packet(&mut encoder, seq));
        }

        // Run cycles until the pipeline drains
        for _ in 0..32 {
            playout_cycle(
                &engine,
                &mut decoder,
                &mut concealer,
                &render_queue,
                &metrics,
                2,
            );
            if engine.lock().occupancy() == 0 && render_queue.len() >= 5 {
                break;
            }
        }

        // Exactly five output frames: 1, 2, concealment, 4, 5
        assert_eq!(render_queue.len(), 5);
        let snap = metrics.snapshot();
        assert_eq!(snap.packets_lost, 1);
        assert_eq!(snap.concealed_frames, 1);

        let mut frames = Vec::new();
        while let Some(frame) = render_queue.pop() {
            frames.push(frame);
        }
        // Every frame, concealed included, is one full frame of audio
        for frame in &frames {
            assert_eq!(frame.samples.len(), 1920);
        }
    }

    #[test]
    fn test_decode_failure_counts_as_loss() {
        let mut decoder = OpusDecoder::new(48000, 2, 960).unwrap();
        let engine = Mutex::new(JitterBuffer::new(1, 1));
        let mut concealer = Concealer::new(1920, 2);
        let render_queue = create_shared_queue(BRIDGE_CAPACITY);
        let metrics = StreamMetrics::new();

        // Payload that is not valid Opus: a zero-length payload
        let bad = protocol::decode(&protocol::encode(1, 0, &[])).unwrap();
        engine.lock().admit(bad);

        playout_cycle(
            &engine,
            &mut decoder,
            &mut concealer,
            &render_queue,
            &metrics,
            2,
        );

        let snap = metrics.snapshot();
        // Either the decoder rejected it (decode error + concealment) or it
        // produced silence; in both cases exactly one frame reached the
        // bridge and playback never stalled.
        assert_eq!(render_queue.len(), 1);
        if snap.decode_errors > 0 {
            assert_eq!(snap.packets_lost, 1);
            assert_eq!(snap.concealed_frames, 1);
        }
    }
}
