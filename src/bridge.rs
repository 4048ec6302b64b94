// src/bridge.rs

//! Lifecycle controller.
//!
//! [`Bridge::start`] brings the system up in a fixed order:
//!
//! 1. register the input intake with the input subsystem
//! 2. acquire the display surface and check the engine's frame fits it
//! 3. install the host services into the engine
//! 4. initialise the engine with its launch arguments
//! 5. spawn the drive loop
//!
//! A failure at any step undoes the completed ones in reverse and returns
//! the error. Teardown stops the drive loop, unregisters input, then
//! releases the surface. One `Bridge` value owns all of it.

use crate::config::Config;
use crate::display::{DisplayDevice, DisplaySurface};
use crate::drive::stop::StopSignal;
use crate::drive::{DriveLoop, DriveState};
use crate::engine::{Engine, LaunchConfig, PIXEL_BYTES};
use crate::host::BridgeHost;
use crate::input::{InputIntake, InputQueue, InputSubsystem};
use anyhow::{bail, Context, Result};
use log::*;
use std::sync::Arc;

/// Lets another thread end the drive loop.
#[derive(Debug, Clone)]
pub struct StopHandle(StopSignal);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.request();
    }
}

pub struct Bridge {
    input: Box<dyn InputSubsystem>,
    drive: Option<DriveLoop>,
    /// Handed back by the drive loop once it has been joined.
    surface: Option<DisplaySurface>,
    engine: Option<Box<dyn Engine>>,
    host: Arc<BridgeHost>,
    stop: StopSignal,
    shutdown_requested: bool,
}

/// Step 2: the surface must hold the engine's frame at 4 bytes per pixel.
fn acquire_surface(display: &mut dyn DisplayDevice, frame: (u32, u32)) -> Result<DisplaySurface> {
    let surface = DisplaySurface::acquire(display)
        .with_context(|| format!("Failed to acquire display surface on {}", display.describe()))?;
    let geometry = surface.geometry();
    if geometry.bits_per_pixel as usize != PIXEL_BYTES * 8 {
        bail!(
            "Display is {}bpp, the engine renders {}bpp",
            geometry.bits_per_pixel,
            PIXEL_BYTES * 8
        );
    }
    if geometry.width < frame.0 || geometry.height < frame.1 {
        bail!(
            "Display {}x{} is smaller than the engine frame {}x{}",
            geometry.width,
            geometry.height,
            frame.0,
            frame.1
        );
    }
    Ok(surface)
}

impl Bridge {
    pub fn start(
        config: &Config,
        display: &mut dyn DisplayDevice,
        mut input: Box<dyn InputSubsystem>,
        mut engine: Box<dyn Engine>,
    ) -> Result<Self> {
        info!("Bridge: Starting");
        let stop = StopSignal::new();
        let queue = Arc::new(InputQueue::new(config.input.queue_capacity));
        let intake = Arc::new(InputIntake::new(queue.clone(), config.input.max_bindings));

        input
            .register(intake)
            .context("Failed to register input handler")?;
        info!("Bridge: Input handler registered");

        let surface = match acquire_surface(display, engine.resolution()) {
            Ok(surface) => surface,
            Err(e) => {
                error!("Bridge: {:#}", e);
                input.unregister();
                return Err(e);
            }
        };

        let host = match BridgeHost::new(config, stop.clone()) {
            Ok(host) => Arc::new(host),
            Err(e) => return Err(unwind(e, surface, input.as_mut())),
        };
        if let Err(e) = engine.install_host(host.clone()) {
            return Err(unwind(e, surface, input.as_mut()));
        }

        let launch = LaunchConfig::from_config(&config.engine);
        info!("Bridge: Initialising engine with {:?}", launch.args);
        if let Err(e) = engine.init(&launch).context("Engine initialisation failed") {
            return Err(unwind(e, surface, input.as_mut()));
        }

        // A failed spawn drops the surface along with the thread closure.
        let drive = match DriveLoop::spawn(engine, surface, queue, stop.clone(), &config.drive)
        {
            Ok(drive) => drive,
            Err(e) => {
                error!("Bridge: {:#}", e);
                input.unregister();
                return Err(e);
            }
        };

        info!("Bridge: Started");
        Ok(Bridge {
            input,
            drive: Some(drive),
            surface: None,
            engine: None,
            host,
            stop,
            shutdown_requested: false,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    pub fn drive_state(&self) -> DriveState {
        match &self.drive {
            Some(drive) => drive.state(),
            None => DriveState::Terminated,
        }
    }

    pub fn host(&self) -> &Arc<BridgeHost> {
        &self.host
    }

    /// Blocks until the drive loop ends: engine exit, cycle limit or a stop
    /// request. An engine panic is returned as an error.
    pub fn wait(&mut self) -> Result<()> {
        let Some(drive) = self.drive.take() else {
            return Ok(());
        };
        let (engine, surface) = drive.join()?;
        self.engine = Some(engine);
        self.surface = Some(surface);
        info!("Bridge: Drive loop finished");
        Ok(())
    }

    /// Stops and joins the drive loop, unregisters input, releases the
    /// surface.
    pub fn shutdown(mut self) -> Result<()> {
        self.cleanup()
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.shutdown_requested {
            return Ok(());
        }
        self.shutdown_requested = true;
        info!("Bridge: Shutting down");

        self.stop.request();
        let joined = self.wait();

        self.input.unregister();
        info!("Bridge: Input handler unregistered");

        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
        self.engine = None;
        info!("Bridge: Shutdown complete");
        joined
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.shutdown_requested {
            if let Err(e) = self.cleanup() {
                error!("Error during bridge cleanup in Drop: {:#}", e);
            }
        }
    }
}

/// Undoes steps 2 and 1 after a later step failed.
fn unwind(
    err: anyhow::Error,
    mut surface: DisplaySurface,
    input: &mut dyn InputSubsystem,
) -> anyhow::Error {
    error!("Bridge: Start failed, unwinding: {:#}", err);
    surface.release();
    input.unregister();
    err
}
