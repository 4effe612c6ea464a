//! # UDP Audio Relay
//!
//! Low-latency point-to-point audio streaming over UDP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SENDER ────────────────────────────┐
//! │  ┌──────────┐    ┌────────────┐    ┌──────────┐    ┌────────┐  │
//! │  │ Capture  │───▶│  Capture   │───▶│   Opus   │───▶│ Paced  │  │
//! │  │ Callback │    │  Bridge    │    │ Encoder  │    │ Sender │  │
//! │  └──────────┘    │  (SPSC)    │    └──────────┘    └───┬────┘  │
//! │                  └────────────┘  frame accumulation    │       │
//! └────────────────────────────────────────────────────────┼───────┘
//!                                                          │ UDP
//!                            [seq | timestamp | len | opus payload]
//!                                                          │
//! ┌──────────────────────────── RECEIVER ──────────────────┼───────┐
//! │  ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌─────▼─────┐ │
//! │  │ Playback │◀───│  Render  │◀───│  Jitter  │◀───│  Receive  │ │
//! │  │ Callback │    │  Bridge  │    │  Buffer  │    │  Thread   │ │
//! │  └──────────┘    │  (SPSC)  │    └────┬─────┘    └───────────┘ │
//! │                  └──────────┘         │ playout tick:          │
//! │                                       │ decode / conceal       │
//! └───────────────────────────────────────┴────────────────────────┘
//! ```
//!
//! The real-time audio callbacks touch only the bridge queues. All timing
//! decisions (playout deadlines, concealment, pacing, congestion response)
//! run on ordinary threads with bounded wake-up intervals.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod jitter;
pub mod metrics;
pub mod network;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 128_000;

    /// Default frame duration in milliseconds (one packet of audio)
    pub const DEFAULT_FRAME_DURATION_MS: u32 = 20;

    /// Default UDP port for audio streaming
    pub const DEFAULT_UDP_PORT: u16 = 5004;

    /// Wire header size: sequence(4) + timestamp(8) + payload length(4)
    pub const HEADER_SIZE: usize = 16;

    /// Maximum packet size for UDP (MTU minus IP/UDP headers)
    pub const MAX_PACKET_SIZE: usize = 1472;

    /// Bridge queue capacity (in frames)
    pub const BRIDGE_CAPACITY: usize = 64;

    /// Socket receive timeout, bounds shutdown latency of the receive loop
    pub const SOCKET_TIMEOUT_MS: u64 = 100;

    /// Sequence window retained around the high-water mark
    pub const SEQUENCE_WINDOW: u32 = 500;

    /// Insertions between sequence-window compactions
    pub const SEQUENCE_COMPACT_INTERVAL: u64 = 1000;
}
