//! Audio Sender Application
//!
//! Captures audio from an input device and streams it to the receiver over
//! UDP.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_audio_relay::{
    audio::device::list_devices, config::AppConfig, session::SenderSession,
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

    tracing::info!("Starting UDP Audio Sender");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load(&config_path)?;

    // List available input devices
    println!("\n=== Available Input Devices ===");
    for device in list_devices().iter().filter(|d| d.is_input) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
    }
    println!();

    let target = config.network.target_addr();
    let stats_every = Duration::from_secs(5);

    let mut session = SenderSession::new(config);
    session.start()?;

    tracing::info!("Streaming to {} - press Ctrl+C to stop", target);

    let mut stats = tokio::time::interval(stats_every);
    stats.tick().await; // consume the immediate first tick
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats.tick() => {
                let snap = session.metrics().snapshot();
                tracing::info!(
                    "Sent {} packets ({:.1} KB), {} retries, {} dropped, {} timing errors, delay {:.1}ms",
                    snap.packets_sent,
                    snap.bytes_sent as f64 / 1024.0,
                    snap.send_retries,
                    snap.send_errors,
                    snap.timing_errors,
                    snap.adaptive_delay_us as f64 / 1000.0,
                );
            }
        }
    }

    tracing::info!("Stopping...");
    session.stop();

    let snap = session.metrics().snapshot();
    println!("\n=== Final Statistics ===");
    println!("  Packets sent:   {}", snap.packets_sent);
    println!("  Bytes sent:     {}", snap.bytes_sent);
    println!("  Send retries:   {}", snap.send_retries);
    println!("  Packets dropped:{}", snap.send_errors);
    println!("  Timing errors:  {}", snap.timing_errors);
    println!("  Overruns:       {}", snap.overruns);

    Ok(())
}
