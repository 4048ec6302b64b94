// src/engine/mod.rs

//! The hosted engine contract.
//!
//! The engine owns its own simulation and rendering. The bridge only talks to
//! it through the [`Engine`] trait: hand it the host services once, initialise
//! it with a launch configuration, then call `update` and read back the frame
//! once per cycle. Input reaches it as [`InputEvent`]s drained from the intake
//! queue at the top of each cycle.

#[cfg(any(test, feature = "puredoom"))]
pub mod callbacks;
#[cfg(test)]
pub mod mock;
#[cfg(feature = "puredoom")]
pub mod puredoom;
pub mod test_card;

use crate::config::EngineConfig;
use crate::host::HostServices;
use anyhow::Result;
use std::sync::Arc;

/// Width of the frame the engine renders.
pub const ENGINE_WIDTH: u32 = 320;
/// Height of the frame the engine renders.
pub const ENGINE_HEIGHT: u32 = 200;
/// Bytes per pixel requested from the engine; matches 32-bpp display memory.
pub const PIXEL_BYTES: usize = 4;

/// A borrowed view of the engine's most recent output.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// The fixed argument vector the engine is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub args: Vec<String>,
    pub flags: i32,
}

impl LaunchConfig {
    /// Builds `[program, "-file", content_path]`.
    pub fn from_config(config: &EngineConfig) -> Self {
        LaunchConfig {
            args: vec![
                config.program_name.clone(),
                "-file".to_string(),
                config.content_path.to_string_lossy().into_owned(),
            ],
            flags: config.init_flags,
        }
    }
}

/// Engine key code. Values follow the engine's own key numbering: printable
/// keys are their lowercase ASCII value, specials live above 0x80.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineKey(pub i32);

impl EngineKey {
    pub const TAB: EngineKey = EngineKey(9);
    pub const ENTER: EngineKey = EngineKey(13);
    pub const ESCAPE: EngineKey = EngineKey(27);
    pub const SPACE: EngineKey = EngineKey(32);
    pub const BACKSPACE: EngineKey = EngineKey(0x7f);
    pub const LEFT_ARROW: EngineKey = EngineKey(0xac);
    pub const UP_ARROW: EngineKey = EngineKey(0xad);
    pub const RIGHT_ARROW: EngineKey = EngineKey(0xae);
    pub const DOWN_ARROW: EngineKey = EngineKey(0xaf);
    pub const CTRL: EngineKey = EngineKey(0x80 + 0x1d);
    pub const SHIFT: EngineKey = EngineKey(0x80 + 0x36);
    pub const ALT: EngineKey = EngineKey(0x80 + 0x38);
    pub const F1: EngineKey = EngineKey(0x80 + 0x3b);
    pub const F11: EngineKey = EngineKey(0x80 + 0x57);
    pub const F12: EngineKey = EngineKey(0x80 + 0x58);
    pub const PAUSE: EngineKey = EngineKey(0xff);

    /// Printable key from its ASCII character.
    pub const fn ascii(c: u8) -> EngineKey {
        EngineKey(c as i32)
    }

    /// F1..=F10 by number.
    pub const fn function(n: u8) -> EngineKey {
        EngineKey(Self::F1.0 + (n as i32 - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
}

/// Input in the engine's model, produced by the intake's translation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key { key: EngineKey, pressed: bool },
    Button { button: MouseButton, pressed: bool },
    Motion { dx: i32, dy: i32 },
}

/// Entry points the bridge consumes from the hosted engine.
///
/// The engine is trusted and cooperative: `update` is assumed to return
/// promptly, and a panic inside it is fatal to the bridge.
pub trait Engine: Send {
    /// Registers the host services. Called exactly once, before `init`.
    fn install_host(&mut self, host: Arc<dyn HostServices>) -> Result<()>;

    fn init(&mut self, launch: &LaunchConfig) -> Result<()>;

    /// Runs one simulation/render step.
    fn update(&mut self);

    /// Most recent frame with `bytes_per_pixel` bytes per pixel.
    fn framebuffer(&mut self, bytes_per_pixel: usize) -> Frame<'_>;

    fn handle_input(&mut self, event: InputEvent);

    /// Frame dimensions the engine renders at.
    fn resolution(&self) -> (u32, u32) {
        (ENGINE_WIDTH, ENGINE_HEIGHT)
    }
}
