// src/engine/mock.rs

//! Recording engine for drive-loop and lifecycle tests.

use super::{Engine, Frame, InputEvent, LaunchConfig, ENGINE_HEIGHT, ENGINE_WIDTH};
use crate::host::HostServices;
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockState {
    pub journal: Vec<String>,
    pub updates: u64,
    pub inputs: Vec<InputEvent>,
    pub launch: Option<LaunchConfig>,
}

/// Shared view of a [`MockEngine`] that stays with the test.
#[derive(Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    pub fn updates(&self) -> u64 {
        self.state.lock().unwrap().updates
    }

    pub fn inputs(&self) -> Vec<InputEvent> {
        self.state.lock().unwrap().inputs.clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn record(&self, entry: &str) {
        self.state.lock().unwrap().journal.push(entry.to_string());
    }

    pub fn launch(&self) -> Option<LaunchConfig> {
        self.state.lock().unwrap().launch.clone()
    }
}

pub struct MockEngine {
    probe: MockProbe,
    host: Option<Arc<dyn HostServices>>,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Call the host's exit on this update.
    pub exit_on_update: Option<u64>,
    pub panic_on_update: Option<u64>,
    pub fail_init: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_resolution(ENGINE_WIDTH, ENGINE_HEIGHT)
    }

    pub fn with_resolution(width: u32, height: u32) -> Self {
        MockEngine {
            probe: MockProbe::default(),
            host: None,
            pixels: Vec::new(),
            width,
            height,
            exit_on_update: None,
            panic_on_update: None,
            fail_init: false,
        }
    }

    pub fn with_probe(mut self, probe: MockProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Engine for MockEngine {
    fn install_host(&mut self, host: Arc<dyn HostServices>) -> Result<()> {
        self.probe.record("engine.install_host");
        self.host = Some(host);
        Ok(())
    }

    fn init(&mut self, launch: &LaunchConfig) -> Result<()> {
        self.probe.record("engine.init");
        if self.fail_init {
            bail!("mock engine refused to initialise");
        }
        self.probe.state.lock().unwrap().launch = Some(launch.clone());
        Ok(())
    }

    fn update(&mut self) {
        let updates = {
            let mut state = self.probe.state.lock().unwrap();
            state.updates += 1;
            state.updates
        };
        if self.panic_on_update == Some(updates) {
            panic!("mock engine fault on update {}", updates);
        }
        if self.exit_on_update == Some(updates) {
            if let Some(host) = &self.host {
                host.exit(0);
            }
        }
    }

    /// Every pixel holds the current update count.
    fn framebuffer(&mut self, bytes_per_pixel: usize) -> Frame<'_> {
        let updates = self.probe.updates() as u32;
        let count = self.width as usize * self.height as usize;
        self.pixels.clear();
        for _ in 0..count {
            self.pixels
                .extend_from_slice(&updates.to_ne_bytes()[..bytes_per_pixel.min(4)]);
        }
        Frame {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
        }
    }

    fn handle_input(&mut self, event: InputEvent) {
        self.probe.state.lock().unwrap().inputs.push(event);
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
