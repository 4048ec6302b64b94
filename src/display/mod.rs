// src/display/mod.rs
//! Display side of the bridge.
//!
//! - DisplayDevice: probe + map primitives (fbdev, headless)
//! - DisplaySurface: owns the mapping between acquire and release
//! - compositor: centers engine frames on the surface

pub mod compositor;
pub mod device;
pub mod fbdev;
pub mod headless;
pub mod surface;

pub use device::{DisplayDevice, DisplayGeometry, MappedMemory};
pub use fbdev::FbDevice;
pub use headless::HeadlessDisplay;
pub use surface::{DisplaySurface, SurfaceView};
