//! Audio Receiver Application
//!
//! Receives the audio stream over UDP, reorders and conceals through the
//! jitter buffer, and plays it back on an output device.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_audio_relay::{
    audio::device::list_devices, config::AppConfig, session::ReceiverSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting UDP Audio Receiver");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load(&config_path)?;

    // List available output devices
    println!("\n=== Available Output Devices ===");
    for device in list_devices().iter().filter(|d| d.is_output) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
    }
    println!();

    let port = config.network.port;
    let stats_every = Duration::from_secs(5);

    let mut session = ReceiverSession::new(config);
    session.start()?;

    tracing::info!("Listening on port {} - press Ctrl+C to stop", port);

    let mut stats = tokio::time::interval(stats_every);
    stats.tick().await; // consume the immediate first tick
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats.tick() => {
                let snap = session.metrics().snapshot();
                tracing::info!(
                    "Received {} packets, lost {} ({:.2}%), {} late, {} dup, jitter {:.1}ms, buffer {}/{}, {} underruns",
                    snap.packets_received,
                    snap.packets_lost,
                    snap.loss_rate() * 100.0,
                    snap.packets_late,
                    snap.packets_duplicate,
                    snap.jitter_us as f64 / 1000.0,
                    snap.jitter_depth,
                    snap.jitter_target_depth,
                    snap.underruns,
                );
            }
        }
    }

    tracing::info!("Stopping...");
    session.stop();

    let snap = session.metrics().snapshot();
    println!("\n=== Final Statistics ===");
    println!("  Packets received: {}", snap.packets_received);
    println!("  Packets lost:     {}", snap.packets_lost);
    println!("  Loss rate:        {:.3}%", snap.loss_rate() * 100.0);
    println!("  Late packets:     {}", snap.packets_late);
    println!("  Duplicates:       {}", snap.packets_duplicate);
    println!("  Malformed:        {}", snap.malformed_packets);
    println!("  Decode errors:    {}", snap.decode_errors);
    println!("  Concealed frames: {}", snap.concealed_frames);
    println!("  Underruns:        {}", snap.underruns);
    println!("  Overruns:         {}", snap.overruns);

    Ok(())
}
