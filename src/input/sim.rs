// src/input/sim.rs

//! Simulated input subsystem for tests. Devices are plain values; the test
//! keeps a [`SimProbe`] to inject events and read back what happened.

use super::codes::DeviceCapabilities;
use super::{DeviceId, InputDevice, InputIntake, InputSubsystem};
use crate::error::BridgeError;
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
    pub caps: DeviceCapabilities,
    pub open_fails: bool,
    pub is_open: bool,
    pub opens: usize,
    pub closes: usize,
}

impl SimDevice {
    pub fn new(name: &str, caps: DeviceCapabilities) -> Self {
        SimDevice {
            name: name.to_string(),
            caps,
            open_fails: false,
            is_open: false,
            opens: 0,
            closes: 0,
        }
    }
}

impl InputDevice for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    fn open(&mut self) -> Result<(), BridgeError> {
        if self.open_fails {
            return Err(BridgeError::unavailable(format!("{} refused to open", self.name)));
        }
        self.opens += 1;
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
        self.is_open = false;
    }
}

#[derive(Default)]
struct SimState {
    journal: Vec<String>,
    intake: Option<Arc<InputIntake>>,
}

/// Test-side view of a [`SimInput`] after it has been handed to the bridge.
#[derive(Clone, Default)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn record(&self, entry: &str) {
        self.state.lock().unwrap().journal.push(entry.to_string());
    }

    pub fn intake(&self) -> Option<Arc<InputIntake>> {
        self.state.lock().unwrap().intake.clone()
    }

    /// Delivers a raw event as if device `id` produced it.
    pub fn inject(&self, id: DeviceId, event_type: u16, code: u16, value: i32) {
        if let Some(intake) = self.intake() {
            intake.on_event(id, event_type, code, value);
        }
    }
}

pub struct SimInput {
    devices: Vec<(DeviceId, SimDevice)>,
    probe: SimProbe,
    fail_register: bool,
}

impl SimInput {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        SimInput {
            devices: devices
                .into_iter()
                .enumerate()
                .map(|(i, device)| (DeviceId(i as u64), device))
                .collect(),
            probe: SimProbe::default(),
            fail_register: false,
        }
    }

    /// A subsystem whose registration is refused.
    pub fn refusing() -> Self {
        let mut sim = Self::new(Vec::new());
        sim.fail_register = true;
        sim
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    /// Sharing one journal lets a test order input calls against others.
    pub fn with_probe(mut self, probe: SimProbe) -> Self {
        self.probe = probe;
        self
    }
}

impl InputSubsystem for SimInput {
    fn register(&mut self, intake: Arc<InputIntake>) -> Result<()> {
        if self.fail_register {
            self.probe.record("input.register.refused");
            bail!(BridgeError::RegistrationFailure(
                "simulated subsystem refused the handler".to_string()
            ));
        }
        self.probe.record("input.register");
        for (id, device) in self.devices.iter_mut() {
            if intake.matches(device) {
                // Per-device failures are local; the device is skipped.
                let _ = intake.connect(*id, device);
            }
        }
        self.probe.state.lock().unwrap().intake = Some(intake);
        Ok(())
    }

    fn unregister(&mut self) {
        let intake = self.probe.state.lock().unwrap().intake.take();
        if let Some(intake) = intake {
            for (id, device) in self.devices.iter_mut() {
                intake.disconnect(*id, device);
            }
            self.probe.record("input.unregister");
        }
    }
}
