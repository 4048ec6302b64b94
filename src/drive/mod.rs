// src/drive/mod.rs

//! The drive loop: a background thread that runs the engine at a fixed
//! cadence.
//!
//! Each cycle drains queued input into the engine, advances it one step,
//! reads back its frame and composites it onto the display surface, then
//! sleeps for the cycle period. The stop signal is checked at the top of
//! every cycle and also cuts the sleep short, so a stop request (from the
//! engine's exit callback or from outside) ends the loop within one cycle.
//!
//! The thread owns the engine and the surface while it runs and hands both
//! back on join.

pub mod stop;

use crate::config::DriveConfig;
use crate::display::{compositor, DisplaySurface};
use crate::engine::{Engine, PIXEL_BYTES};
use crate::error::BridgeError;
use crate::input::InputQueue;
use anyhow::{Context, Result};
use log::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use stop::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriveState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Terminated = 3,
}

impl DriveState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => DriveState::Idle,
            1 => DriveState::Running,
            2 => DriveState::Stopping,
            _ => DriveState::Terminated,
        }
    }
}

/// Marks the loop terminated however the thread ends, panics included.
struct TerminatedOnDrop(Arc<AtomicU8>);

impl Drop for TerminatedOnDrop {
    fn drop(&mut self) {
        self.0.store(DriveState::Terminated as u8, Ordering::SeqCst);
    }
}

type DriveOutput = (Box<dyn Engine>, DisplaySurface);

pub struct DriveLoop {
    thread_handle: Option<JoinHandle<DriveOutput>>,
    stop: StopSignal,
    state: Arc<AtomicU8>,
}

impl DriveLoop {
    /// Moves `engine` and `surface` onto a new `drive-loop` thread and starts
    /// cycling. If the thread cannot be spawned both are dropped, which
    /// releases the surface.
    pub fn spawn(
        engine: Box<dyn Engine>,
        surface: DisplaySurface,
        input: Arc<InputQueue>,
        stop: StopSignal,
        config: &DriveConfig,
    ) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(DriveState::Idle as u8));
        let cycle = Cycle {
            engine,
            surface,
            input,
            stop: stop.clone(),
            period: config.cycle_period(),
            max_cycles: config.max_cycles,
            state: state.clone(),
        };

        let thread_handle = thread::Builder::new()
            .name("drive-loop".to_string())
            .spawn(move || cycle.run())
            .context("Failed to spawn drive-loop thread")?;

        info!("DriveLoop spawned (period {:?})", config.cycle_period());
        Ok(DriveLoop {
            thread_handle: Some(thread_handle),
            stop,
            state,
        })
    }

    pub fn state(&self) -> DriveState {
        DriveState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Asks the loop to stop; it finishes its current cycle first.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Waits for the thread and takes back the engine and surface. A panic
    /// in the engine comes back as [`BridgeError::EngineFault`].
    pub fn join(mut self) -> Result<DriveOutput> {
        let handle = self
            .thread_handle
            .take()
            .context("Drive loop was already joined")?;
        handle.join().map_err(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("DriveLoop: Engine panicked: {}", reason);
            BridgeError::EngineFault(reason).into()
        })
    }
}

impl Drop for DriveLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            self.stop.request();
            if handle.join().is_err() {
                error!("DriveLoop thread panicked");
            }
        }
    }
}

/// Everything the `drive-loop` thread owns.
struct Cycle {
    engine: Box<dyn Engine>,
    surface: DisplaySurface,
    input: Arc<InputQueue>,
    stop: StopSignal,
    period: Duration,
    max_cycles: Option<u64>,
    state: Arc<AtomicU8>,
}

impl Cycle {
    fn run(mut self) -> DriveOutput {
        let _terminated = TerminatedOnDrop(self.state.clone());
        self.state
            .store(DriveState::Running as u8, Ordering::SeqCst);
        info!("DriveLoop: Started");

        let mut cycles: u64 = 0;
        let mut blit_failures: u64 = 0;
        loop {
            if self.stop.is_requested() {
                break;
            }
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                info!("DriveLoop: Cycle limit of {} reached", cycles);
                self.stop.request();
                break;
            }

            for event in self.input.drain() {
                self.engine.handle_input(event);
            }
            self.engine.update();

            let frame = self.engine.framebuffer(PIXEL_BYTES);
            let result = match self.surface.view() {
                Some(mut view) => compositor::blit(&mut view, &frame).map(|_| ()),
                None => Err(BridgeError::Composite("surface is not mapped".to_string())),
            };
            if let Err(e) = result {
                blit_failures += 1;
                if blit_failures == 1 {
                    warn!("DriveLoop: Frame skipped: {}", e);
                } else {
                    trace!("DriveLoop: Frame skipped: {}", e);
                }
            }

            cycles += 1;
            self.stop.wait_timeout(self.period);
        }

        self.state
            .store(DriveState::Stopping as u8, Ordering::SeqCst);
        if blit_failures > 0 {
            warn!("DriveLoop: {} of {} frames were skipped", blit_failures, cycles);
        }
        if self.input.dropped() > 0 {
            warn!("DriveLoop: {} input events were dropped", self.input.dropped());
        }
        info!("DriveLoop: Thread exiting after {} cycles", cycles);
        (self.engine, self.surface)
    }
}
