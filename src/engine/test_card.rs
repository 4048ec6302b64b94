// src/engine/test_card.rs

//! Built-in engine that draws a moving test card. Lets the bridge run end to
//! end without the C library: bars scroll one column per update, the arrow
//! keys and mouse motion move a marker, and Escape asks the host to exit.

use super::{Engine, EngineKey, Frame, InputEvent, LaunchConfig, ENGINE_HEIGHT, ENGINE_WIDTH};
use crate::host::HostServices;
use anyhow::{bail, Result};
use log::{debug, info};
use std::sync::Arc;

/// Colour bars, 0x00RRGGBB.
const BARS: [u32; 8] = [
    0x00c0c0c0, 0x00c0c000, 0x0000c0c0, 0x0000c000, 0x00c000c0, 0x00c00000, 0x000000c0, 0x00101010,
];
const MARKER_COLOUR: u32 = 0x00ffffff;
const MARKER_SIZE: i32 = 8;

pub struct TestCardEngine {
    host: Option<Arc<dyn HostServices>>,
    pixels: Vec<u8>,
    tick: u64,
    marker: (i32, i32),
    initialised: bool,
}

impl Default for TestCardEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCardEngine {
    pub fn new() -> Self {
        TestCardEngine {
            host: None,
            pixels: Vec::new(),
            tick: 0,
            marker: (ENGINE_WIDTH as i32 / 2, ENGINE_HEIGHT as i32 / 2),
            initialised: false,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn marker(&self) -> (i32, i32) {
        self.marker
    }

    fn move_marker(&mut self, dx: i32, dy: i32) {
        let max_x = ENGINE_WIDTH as i32 - MARKER_SIZE;
        let max_y = ENGINE_HEIGHT as i32 - MARKER_SIZE;
        self.marker.0 = (self.marker.0 + dx).clamp(0, max_x);
        self.marker.1 = (self.marker.1 + dy).clamp(0, max_y);
    }

    fn render(&mut self, bytes_per_pixel: usize) {
        let (w, h) = (ENGINE_WIDTH as usize, ENGINE_HEIGHT as usize);
        self.pixels.resize(w * h * bytes_per_pixel, 0);
        let bar_width = w / BARS.len();
        let shift = (self.tick % w as u64) as usize;
        let (mx, my) = (self.marker.0 as usize, self.marker.1 as usize);
        let marker_end = MARKER_SIZE as usize;

        for (i, px) in self.pixels.chunks_exact_mut(bytes_per_pixel).enumerate() {
            let (x, y) = (i % w, i / w);
            let in_marker = (mx..mx + marker_end).contains(&x) && (my..my + marker_end).contains(&y);
            let colour = if in_marker {
                MARKER_COLOUR
            } else {
                BARS[((x + shift) % w) / bar_width % BARS.len()]
            };
            let bytes = colour.to_le_bytes();
            let n = px.len().min(bytes.len());
            px[..n].copy_from_slice(&bytes[..n]);
        }
    }
}

impl Engine for TestCardEngine {
    fn install_host(&mut self, host: Arc<dyn HostServices>) -> Result<()> {
        if self.host.is_some() {
            bail!("Test card already has host services");
        }
        self.host = Some(host);
        Ok(())
    }

    fn init(&mut self, launch: &LaunchConfig) -> Result<()> {
        let Some(host) = &self.host else {
            bail!("Test card initialised before host services were installed");
        };
        host.print(&format!("TestCard: init {:?}\n", launch.args));
        info!("TestCard: Initialised ({}x{})", ENGINE_WIDTH, ENGINE_HEIGHT);
        self.initialised = true;
        Ok(())
    }

    fn update(&mut self) {
        if self.initialised {
            self.tick += 1;
        }
    }

    fn framebuffer(&mut self, bytes_per_pixel: usize) -> Frame<'_> {
        self.render(bytes_per_pixel);
        Frame {
            pixels: &self.pixels,
            width: ENGINE_WIDTH,
            height: ENGINE_HEIGHT,
        }
    }

    fn handle_input(&mut self, event: InputEvent) {
        debug!("TestCard: {:?}", event);
        match event {
            InputEvent::Key {
                key: EngineKey::ESCAPE,
                pressed: true,
            } => {
                if let Some(host) = &self.host {
                    host.exit(0);
                }
            }
            InputEvent::Key { key, pressed: true } => match key {
                EngineKey::LEFT_ARROW => self.move_marker(-MARKER_SIZE, 0),
                EngineKey::RIGHT_ARROW => self.move_marker(MARKER_SIZE, 0),
                EngineKey::UP_ARROW => self.move_marker(0, -MARKER_SIZE),
                EngineKey::DOWN_ARROW => self.move_marker(0, MARKER_SIZE),
                _ => {}
            },
            InputEvent::Motion { dx, dy } => self.move_marker(dx, dy),
            _ => {}
        }
    }
}
