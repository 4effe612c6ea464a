//! Opus decoder wrapper

use opus::{Channels, Decoder};

use crate::error::CodecError;

/// Opus decoder wrapper
pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    channels: u16,
    /// Samples per frame, per channel
    frame_samples: usize,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<f32>,
    frames_decoded: u64,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16, frame_samples: usize) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        // Sized for the largest Opus frame: 120ms at 48kHz stereo
        let decode_buffer = vec![0.0f32; 48000 * 2 * 120 / 1000];

        Ok(Self {
            decoder,
            sample_rate,
            channels,
            frame_samples,
            decode_buffer,
            frames_decoded: 0,
        })
    }

    /// Decode one compressed payload to interleaved f32 samples.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let samples = self
            .decoder
            .decode_float(data, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let total_samples = samples * self.channels as usize;
        self.frames_decoded += 1;

        Ok(self.decode_buffer[..total_samples].to_vec())
    }

    /// Reset decoder state (e.g. on stream restart)
    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::DecoderInit(e.to_string()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per frame, per channel
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}
