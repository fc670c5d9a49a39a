//! radio-mirror-daemon: mirrors the GTA San Andreas User Radio onto a music player
//!
//! This daemon runs in the background and provides:
//! - Memory polling of the game for vehicle and radio station
//! - Explicit state machine for the User Radio on/off state
//! - Playback control through the remote API or the desktop player window
//! - Global previous/next hotkeys while the User Radio is active

mod config;
mod events;
mod hotkey;
mod lifecycle;
mod memory;
mod monitor;
mod playback;
mod retry;
mod sampler;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::hotkey::{forward_navigation, HotkeyListener, KeyDebouncer};
use crate::lifecycle::ShutdownSignal;
use crate::memory::ProcessAttacher;
use crate::monitor::{PollIntervals, RadioMonitor};
use crate::sampler::RadioSampler;
use crate::state::RadioState;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "radio-mirror-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(
        process = %config.process_name,
        game_version = %config.layout.version,
        backend = %config.backend,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    let radio_state = RadioState::new();
    let playback = Arc::new(playback::connect(&config, radio_state.clone()).await);
    if !playback.is_enabled() {
        warn!("running without playback control, radio changes will only be logged");
    }

    // Hotkey listener -> navigation forwarder
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    let hotkey_listener = HotkeyListener::new(config.hotkeys, hotkey_tx);

    // Start the hotkey listener (runs on dedicated thread)
    match hotkey_listener.start() {
        Ok(()) => {
            info!(
                previous = ?config.hotkeys.previous,
                next = ?config.hotkeys.next,
                "hotkey listener started"
            );
        }
        Err(e) => {
            error!(error = %e, "failed to start hotkey listener");
            warn!("continuing without track navigation hotkeys");
        }
    }

    let navigation = tokio::spawn(forward_navigation(
        hotkey_rx,
        KeyDebouncer::new(config.debounce),
        Arc::clone(&playback),
    ));

    let monitor = RadioMonitor::new(
        ProcessAttacher::new(config.layout.preferred_base),
        config.process_name.clone(),
        RadioSampler::new(config.layout),
        radio_state.clone(),
        Arc::clone(&playback),
        PollIntervals {
            sample: config.sample_interval,
            attach_retry: config.attach_retry_interval,
        },
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(monitor.run(stop_rx));

    info!("daemon initialized, monitoring game");

    shutdown.wait().await;

    // Cleanup
    info!("shutting down...");

    if stop_tx.send(true).is_err() {
        warn!("radio monitor already stopped");
    }
    match tokio::time::timeout(config.shutdown_timeout, monitor_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "radio monitor task failed"),
        Err(_) => warn!(
            timeout_ms = config.shutdown_timeout.as_millis() as u64,
            "radio monitor did not stop in time"
        ),
    }

    hotkey_listener.stop();
    navigation.abort();
    radio_state.reset();

    info!("radio-mirror-daemon stopped");

    Ok(())
}
