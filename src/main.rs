// src/main.rs

pub mod bridge;
pub mod config;
pub mod display;
pub mod drive;
pub mod engine;
pub mod error;
pub mod host;
pub mod input;
pub mod os;

use crate::{
    bridge::{Bridge, StopHandle},
    config::{Config, DisplayBackend, InputBackend},
    display::{DisplayDevice, FbDevice, HeadlessDisplay},
    engine::Engine,
    input::{evdev::EvdevInput, InputSubsystem, NullInput},
};
use anyhow::{Context, Result};
use log::{error, info};
use nix::sys::signal::{SigSet, Signal};
use std::thread;

#[cfg(feature = "puredoom")]
fn create_engine() -> Box<dyn Engine> {
    info!("Engine: PureDOOM");
    Box::new(engine::puredoom::PureDoomEngine::new())
}

#[cfg(not(feature = "puredoom"))]
fn create_engine() -> Box<dyn Engine> {
    info!("Engine: built-in test card (build with --features puredoom for DOOM)");
    Box::new(engine::test_card::TestCardEngine::new())
}

fn create_display(config: &Config) -> Box<dyn DisplayDevice> {
    match config.display.backend {
        DisplayBackend::Fbdev => Box::new(FbDevice::new(&config.display.device)),
        DisplayBackend::Headless => Box::new(HeadlessDisplay::new(
            config.display.headless_width,
            config.display.headless_height,
        )),
    }
}

fn create_input(config: &Config) -> Box<dyn InputSubsystem> {
    match config.input.backend {
        InputBackend::Evdev => Box::new(EvdevInput::new(&config.input)),
        InputBackend::None => Box::new(NullInput::default()),
    }
}

/// Blocks SIGINT and SIGTERM on the calling thread. Threads spawned
/// afterwards inherit the mask, so only [`spawn_signal_waiter`] sees them.
fn block_shutdown_signals() -> Result<SigSet> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals
        .thread_block()
        .context("Failed to block SIGINT/SIGTERM")?;
    Ok(signals)
}

fn spawn_signal_waiter(signals: SigSet, stop: StopHandle) -> Result<()> {
    thread::Builder::new()
        .name("signal-waiter".to_string())
        .spawn(move || match signals.wait() {
            Ok(signal) => {
                info!("Received {:?}, stopping", signal);
                stop.request_stop();
            }
            Err(e) => error!("sigwait failed: {}", e),
        })
        .context("Failed to spawn signal-waiter thread")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting fb-doom-bridge...");

    let config = Config::load_or_default().context("Failed to load configuration")?;
    let signals = block_shutdown_signals()?;

    let mut display = create_display(&config);
    let input = create_input(&config);
    let engine = create_engine();

    let mut bridge = Bridge::start(&config, display.as_mut(), input, engine)
        .context("Failed to start the bridge")?;
    spawn_signal_waiter(signals, bridge.stop_handle())?;

    let result = bridge.wait();
    let arena = bridge.host().arena();
    info!(
        "Arena: {} bytes handed out from {} chunk(s)",
        arena.allocated_bytes(),
        arena.chunk_count()
    );

    bridge.shutdown()?;
    result
}
