// src/config.rs

//! Defines the configuration structures for the bridge.
//!
//! Every section derives `Deserialize` with `#[serde(default)]`, so a config
//! file only needs to name the settings it changes. The file is JSON and is
//! located through the `FB_DOOM_BRIDGE_CONFIG` environment variable; when the
//! variable is unset the defaults below are used unchanged.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV_VAR: &str = "FB_DOOM_BRIDGE_CONFIG";

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub input: InputConfig,
    pub engine: EngineConfig,
    pub drive: DriveConfig,
    pub memory: MemoryConfig,
}

impl Config {
    /// Loads the config named by `FB_DOOM_BRIDGE_CONFIG`, or the defaults.
    pub fn load_or_default() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                info!("{} not set, using default configuration", CONFIG_ENV_VAR);
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// --- Display ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    /// Linux framebuffer device (`/dev/fbN`).
    #[default]
    Fbdev,
    /// Heap-backed surface, nothing reaches a screen.
    Headless,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub backend: DisplayBackend,
    /// Framebuffer device node probed by the fbdev backend.
    pub device: PathBuf,
    pub headless_width: u32,
    pub headless_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            backend: DisplayBackend::Fbdev,
            device: PathBuf::from("/dev/fb0"),
            headless_width: 1920,
            headless_height: 1080,
        }
    }
}

// --- Input ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputBackend {
    /// Linux event devices (`/dev/input/eventN`).
    #[default]
    Evdev,
    /// No devices are ever offered to the intake.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub backend: InputBackend,
    pub device_dir: PathBuf,
    /// Take exclusive ownership of bound devices (`EVIOCGRAB`) so key
    /// presses do not also reach the console.
    pub grab_devices: bool,
    /// Capacity of the queue between the intake and the drive loop. When it
    /// is full the oldest event is dropped.
    pub queue_capacity: usize,
    pub max_bindings: usize,
    pub rescan_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            backend: InputBackend::Evdev,
            device_dir: PathBuf::from("/dev/input"),
            grab_devices: false,
            queue_capacity: 256,
            max_bindings: 16,
            rescan_interval_ms: 1000,
        }
    }
}

impl InputConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }
}

// --- Engine ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// argv[0] handed to the engine.
    pub program_name: String,
    /// Content file passed after `-file`.
    pub content_path: PathBuf,
    /// The only environment variable the engine can see is `HOME`, and it
    /// resolves to this directory.
    pub home_dir: String,
    pub init_flags: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            program_name: "doom".to_string(),
            content_path: PathBuf::from("/DOOM/DOOM.WAD"),
            home_dir: "/".to_string(),
            init_flags: 0,
        }
    }
}

// --- Drive loop ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    /// Fixed sleep after each cycle. 33 ms gives roughly 30 cycles/second;
    /// the real cadence drifts by however long the cycle's work took.
    pub cycle_period_ms: u64,
    /// Stop on its own after this many cycles. Used for smoke runs.
    pub max_cycles: Option<u64>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            cycle_period_ms: 33,
            max_cycles: None,
        }
    }
}

impl DriveConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }
}

// --- Memory ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Size of each arena chunk handed out to the engine's allocator.
    pub arena_chunk_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            arena_chunk_bytes: 4 * 1024 * 1024,
        }
    }
}
