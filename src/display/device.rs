// src/display/device.rs

//! DisplayDevice trait - the two primitives the surface manager needs from a
//! display: read the geometry, then map the display memory.

use crate::error::BridgeError;

/// Geometry and memory range reported by a probed display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayGeometry {
    /// Driver identification string.
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes from the start of one row to the start of the next.
    pub stride_bytes: u32,
    /// Physical start of display memory, as reported by the device.
    pub phys_base: u64,
    /// Length of display memory in bytes.
    pub phys_len: usize,
}

impl DisplayGeometry {
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bits_per_pixel / 8
    }

    /// Bytes needed to hold `height` rows at `stride_bytes`.
    pub fn required_len(&self) -> usize {
        self.stride_bytes as usize * self.height as usize
    }
}

/// Display memory mapped into the bridge's address space. Dropping it
/// releases the mapping.
pub trait MappedMemory: Send {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];
}

pub trait DisplayDevice {
    /// Human-readable name for logs (e.g. the device node).
    fn describe(&self) -> String;

    fn probe(&mut self) -> Result<DisplayGeometry, BridgeError>;

    fn map(&mut self, geometry: &DisplayGeometry) -> Result<Box<dyn MappedMemory>, BridgeError>;
}
