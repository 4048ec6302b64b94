// src/input/mod.rs

//! Input intake.
//!
//! An [`InputSubsystem`] offers devices to the [`InputIntake`]; the intake
//! binds the ones that look like keyboards or pointers, translates their raw
//! events and queues them for the drive loop. Events run in the subsystem's
//! context and never block: the only shared state they touch is the binding
//! table and the bounded [`InputQueue`].

pub mod codes;
pub mod evdev;
pub mod queue;
#[cfg(test)]
pub mod sim;
pub mod translate;

use crate::error::BridgeError;
use anyhow::Result;
use codes::{DeviceCapabilities, EV_ABS, EV_KEY, EV_REL};
use log::{debug, info, trace};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use translate::AbsPosition;

pub use queue::InputQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// A device as the subsystem presents it to the intake.
pub trait InputDevice {
    fn name(&self) -> &str;
    fn capabilities(&self) -> DeviceCapabilities;
    /// Starts event delivery from the device.
    fn open(&mut self) -> Result<(), BridgeError>;
    fn close(&mut self);
}

/// Source of devices and events. `register` hands over the intake and
/// connects every present device; `unregister` disconnects them all and
/// stops delivering events.
pub trait InputSubsystem: Send {
    fn register(&mut self, intake: Arc<InputIntake>) -> Result<()>;
    fn unregister(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Registered,
    Open,
}

#[derive(Debug, Clone)]
pub struct InputBinding {
    pub id: DeviceId,
    pub name: String,
    pub state: BindingState,
    pub position: AbsPosition,
}

pub struct InputIntake {
    queue: Arc<InputQueue>,
    bindings: Mutex<HashMap<DeviceId, InputBinding>>,
    max_bindings: usize,
}

impl InputIntake {
    pub fn new(queue: Arc<InputQueue>, max_bindings: usize) -> Self {
        InputIntake {
            queue,
            bindings: Mutex::new(HashMap::new()),
            max_bindings,
        }
    }

    pub fn queue(&self) -> &Arc<InputQueue> {
        &self.queue
    }

    pub fn matches(&self, device: &dyn InputDevice) -> bool {
        codes::matches(&device.capabilities())
    }

    /// Binds and opens `device`. A failed open leaves no binding behind.
    pub fn connect(&self, id: DeviceId, device: &mut dyn InputDevice) -> Result<(), BridgeError> {
        if !self.matches(device) {
            return Err(BridgeError::RegistrationFailure(format!(
                "{} ({}) is neither a keyboard nor a pointer",
                device.name(),
                id
            )));
        }

        {
            let mut bindings = self.lock_bindings();
            if bindings.contains_key(&id) {
                return Err(BridgeError::RegistrationFailure(format!(
                    "{} is already bound",
                    id
                )));
            }
            if bindings.len() >= self.max_bindings {
                return Err(BridgeError::RegistrationFailure(format!(
                    "binding table full ({} devices)",
                    self.max_bindings
                )));
            }
            bindings.insert(
                id,
                InputBinding {
                    id,
                    name: device.name().to_string(),
                    state: BindingState::Registered,
                    position: AbsPosition::default(),
                },
            );
        }

        if let Err(e) = device.open() {
            self.lock_bindings().remove(&id);
            debug!("Input: Open of {} failed, registration undone", device.name());
            return Err(e);
        }

        if let Some(binding) = self.lock_bindings().get_mut(&id) {
            binding.state = BindingState::Open;
        }
        info!("Input: Connected to {}", device.name());
        Ok(())
    }

    /// Closes and unbinds `device`. Unknown ids are ignored.
    pub fn disconnect(&self, id: DeviceId, device: &mut dyn InputDevice) {
        if !self.lock_bindings().contains_key(&id) {
            debug!("Input: Disconnect of unbound {} ignored", id);
            return;
        }
        info!("Input: Disconnected from: {}", device.name());
        device.close();
        self.lock_bindings().remove(&id);
    }

    /// Handles one raw event from a bound device.
    pub fn on_event(&self, id: DeviceId, event_type: u16, code: u16, value: i32) {
        match event_type {
            EV_KEY => debug!("Input: Key event code={}, value={}", code, value),
            EV_REL => debug!("Input: Mouse movement code={}, value={}", code, value),
            EV_ABS => debug!("Input: Absolute event code={}, value={}", code, value),
            _ => {}
        }

        let event = {
            let mut bindings = self.lock_bindings();
            match bindings.get_mut(&id) {
                Some(binding) if binding.state == BindingState::Open => {
                    translate::translate(&mut binding.position, event_type, code, value)
                }
                _ => {
                    trace!("Input: Event from unbound {} dropped", id);
                    None
                }
            }
        };

        if let Some(event) = event {
            self.queue.push(event);
        }
    }

    pub fn binding_count(&self) -> usize {
        self.lock_bindings().len()
    }

    pub fn binding(&self, id: DeviceId) -> Option<InputBinding> {
        self.lock_bindings().get(&id).cloned()
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceId, InputBinding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subsystem with no devices. The bridge runs without input.
#[derive(Debug, Default)]
pub struct NullInput {
    registered: bool,
}

impl InputSubsystem for NullInput {
    fn register(&mut self, _intake: Arc<InputIntake>) -> Result<()> {
        info!("Input: No input backend configured, running without devices");
        self.registered = true;
        Ok(())
    }

    fn unregister(&mut self) {
        if self.registered {
            debug!("Input: NullInput unregistered");
            self.registered = false;
        }
    }
}
