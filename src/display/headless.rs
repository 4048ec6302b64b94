// src/display/headless.rs

//! Headless display device backed by heap memory.

use crate::display::device::{DisplayDevice, DisplayGeometry, MappedMemory};
use crate::error::BridgeError;
use log::info;

pub struct HeadlessDisplay {
    width: u32,
    height: u32,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

struct HeadlessMemory(Vec<u8>);

impl MappedMemory for HeadlessMemory {
    fn as_slice(&self) -> &[u8] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl DisplayDevice for HeadlessDisplay {
    fn describe(&self) -> String {
        format!("headless {}x{}", self.width, self.height)
    }

    fn probe(&mut self) -> Result<DisplayGeometry, BridgeError> {
        let stride_bytes = self.width.checked_mul(4);
        let phys_len = stride_bytes
            .and_then(|stride| (stride as usize).checked_mul(self.height as usize));
        let (Some(stride_bytes), Some(phys_len)) = (stride_bytes, phys_len) else {
            return Err(BridgeError::unavailable(format!(
                "headless display {}x{} is too large",
                self.width, self.height
            )));
        };
        info!(
            "HeadlessDisplay: Probe - returning {}x{} at 32bpp",
            self.width, self.height
        );
        Ok(DisplayGeometry {
            id: "headless".to_string(),
            width: self.width,
            height: self.height,
            bits_per_pixel: 32,
            stride_bytes,
            phys_base: 0,
            phys_len,
        })
    }

    fn map(&mut self, geometry: &DisplayGeometry) -> Result<Box<dyn MappedMemory>, BridgeError> {
        Ok(Box::new(HeadlessMemory(vec![0u8; geometry.phys_len])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_packed_32bpp_geometry() {
        let geometry = HeadlessDisplay::new(640, 480).probe().expect("probe");
        assert_eq!(geometry.stride_bytes, 2560);
        assert_eq!(geometry.phys_len, 2560 * 480);
    }

    #[test]
    fn oversized_geometry_is_unavailable() {
        assert!(matches!(
            HeadlessDisplay::new(u32::MAX / 2, 2).probe(),
            Err(BridgeError::ResourceUnavailable { .. })
        ));
    }
}
