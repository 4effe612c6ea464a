//! Application configuration
//!
//! Loaded from a JSON file merged over defaults. A missing file is created
//! with the defaults so a fresh install has something to edit.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Target address for the sender
    pub target_ip: IpAddr,
    /// UDP port (sender target / receiver listen)
    pub port: u16,
    /// SO_SNDBUF size in bytes
    pub send_buffer_size: usize,
    /// SO_RCVBUF size in bytes
    pub recv_buffer_size: usize,
    /// Bounded retry budget for transient send failures
    pub retry_count: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            target_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_UDP_PORT,
            send_buffer_size: 8192,
            recv_buffer_size: 65536,
            retry_count: 2,
        }
    }
}

impl NetworkConfig {
    /// Sender target address
    pub fn target_addr(&self) -> SocketAddr {
        SocketAddr::new(self.target_ip, self.port)
    }
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Substring matched against device names; `None` selects the default device
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            input_device: None,
            output_device: None,
        }
    }
}

/// Streaming engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Audio duration of one packet, in milliseconds
    pub frame_duration_ms: u32,
    /// Opus bitrate in bits per second
    pub bitrate: u32,
    /// Jitter buffer depth floor, in frames
    pub jitter_min_depth: u32,
    /// Jitter buffer depth ceiling, in frames
    pub jitter_max_depth: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            bitrate: DEFAULT_BITRATE,
            jitter_min_depth: 2,
            jitter_max_depth: 10,
        }
    }
}

impl StreamConfig {
    /// Nominal interval between packets
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    /// Samples per frame, per channel
    pub fn frame_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Packets between periodic stats lines
    pub stats_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults.
    ///
    /// A missing file is created with the default configuration. A present
    /// but unparseable file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.stream.frame_duration_ms == 0 {
            return Err(Error::Config("frame_duration_ms must be non-zero".into()));
        }
        if self.stream.jitter_min_depth > self.stream.jitter_max_depth {
            return Err(Error::Config(
                "jitter_min_depth must not exceed jitter_max_depth".into(),
            ));
        }
        if !matches!(self.audio.channels, 1 | 2) {
            return Err(Error::Config(format!(
                "unsupported channel count: {}",
                self.audio.channels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.stream.frame_duration_ms, 20);
        assert_eq!(config.network.port, DEFAULT_UDP_PORT);
        assert!(config.stream.jitter_min_depth <= config.stream.jitter_max_depth);
    }

    #[test]
    fn test_frame_samples() {
        let stream = StreamConfig::default();
        // 20ms at 48kHz
        assert_eq!(stream.frame_samples(48000), 960);
        assert_eq!(stream.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let json = r#"{ "network": { "port": 6000 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.network.port, 6000);
        // Untouched sections keep their defaults
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.network.recv_buffer_size, 65536);
    }

    #[test]
    fn test_invalid_depths_rejected() {
        let mut config = AppConfig::default();
        config.stream.jitter_min_depth = 8;
        config.stream.jitter_max_depth = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.network.port, config.network.port);
        assert_eq!(back.stream.bitrate, config.stream.bitrate);
    }
}
