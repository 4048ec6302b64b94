// src/display/surface.rs

//! DisplaySurface - the single owner of mapped display memory.
//!
//! The mapping is created in [`DisplaySurface::acquire`] and released in
//! [`DisplaySurface::release`] (or on drop). Nothing else holds the raw
//! memory; the compositor only ever sees a [`SurfaceView`] borrowed for the
//! duration of one blit.

use crate::display::device::{DisplayDevice, DisplayGeometry, MappedMemory};
use crate::error::BridgeError;
use log::{debug, info};

pub struct DisplaySurface {
    memory: Option<Box<dyn MappedMemory>>,
    geometry: DisplayGeometry,
}

/// Write access to the surface for one composite pass.
pub struct SurfaceView<'a> {
    pub(crate) pixels: &'a mut [u8],
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bits_per_pixel: u32,
    pub(crate) stride_bytes: u32,
}

impl<'a> SurfaceView<'a> {
    pub fn new(pixels: &'a mut [u8], geometry: &DisplayGeometry) -> Self {
        SurfaceView {
            pixels,
            width: geometry.width,
            height: geometry.height,
            bits_per_pixel: geometry.bits_per_pixel,
            stride_bytes: geometry.stride_bytes,
        }
    }
}

fn validate(geometry: &DisplayGeometry) -> Result<(), String> {
    if geometry.width == 0 || geometry.height == 0 {
        return Err(format!(
            "empty resolution {}x{}",
            geometry.width, geometry.height
        ));
    }
    if geometry.bits_per_pixel == 0 || geometry.bits_per_pixel % 8 != 0 {
        return Err(format!("unsupported depth {}bpp", geometry.bits_per_pixel));
    }
    let min_stride = geometry.width as u64 * geometry.bytes_per_pixel() as u64;
    if (geometry.stride_bytes as u64) < min_stride {
        return Err(format!(
            "row stride {} shorter than a row of {} bytes",
            geometry.stride_bytes, min_stride
        ));
    }
    if geometry.phys_len < geometry.required_len() {
        return Err(format!(
            "memory length {} smaller than {} rows of {} bytes",
            geometry.phys_len, geometry.height, geometry.stride_bytes
        ));
    }
    Ok(())
}

impl DisplaySurface {
    /// Probes `device`, checks its geometry and maps its memory.
    pub fn acquire(device: &mut dyn DisplayDevice) -> Result<Self, BridgeError> {
        let name = device.describe();
        let geometry = device.probe()?;

        info!("Found framebuffer: {} ({})", geometry.id, name);
        info!(
            "Resolution: {}x{}, {}bpp, stride {} bytes",
            geometry.width, geometry.height, geometry.bits_per_pixel, geometry.stride_bytes
        );

        validate(&geometry).map_err(|reason| {
            BridgeError::unavailable(format!("display {}: {}", name, reason))
        })?;

        let memory = device.map(&geometry)?;
        if memory.as_slice().len() < geometry.required_len() {
            return Err(BridgeError::unavailable(format!(
                "display {}: mapping of {} bytes is too small",
                name,
                memory.as_slice().len()
            )));
        }

        info!(
            "Display: Mapped {} bytes of display memory (phys {:#x})",
            geometry.phys_len, geometry.phys_base
        );
        Ok(DisplaySurface {
            memory: Some(memory),
            geometry,
        })
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn is_mapped(&self) -> bool {
        self.memory.is_some()
    }

    /// Borrowed write access for one blit; `None` once released.
    pub fn view(&mut self) -> Option<SurfaceView<'_>> {
        let geometry = &self.geometry;
        self.memory
            .as_mut()
            .map(|memory| SurfaceView::new(memory.as_mut_slice(), geometry))
    }

    /// Current contents of the mapped memory.
    #[cfg(test)]
    pub fn contents(&self) -> Option<&[u8]> {
        self.memory.as_ref().map(|memory| memory.as_slice())
    }

    /// Unmaps the display memory. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(memory) = self.memory.take() {
            drop(memory);
            info!("Display: Released display memory mapping");
        } else {
            debug!("Display: Release on an already released surface");
        }
    }
}

impl Drop for DisplaySurface {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::headless::HeadlessDisplay;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingMemory {
        bytes: Vec<u8>,
        unmaps: Arc<AtomicUsize>,
    }

    impl MappedMemory for CountingMemory {
        fn as_slice(&self) -> &[u8] {
            &self.bytes
        }
        fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.bytes
        }
    }

    impl Drop for CountingMemory {
        fn drop(&mut self) {
            self.unmaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeDevice {
        geometry: Option<DisplayGeometry>,
        map_fails: bool,
        unmaps: Arc<AtomicUsize>,
    }

    impl FakeDevice {
        fn new(geometry: DisplayGeometry) -> Self {
            FakeDevice {
                geometry: Some(geometry),
                map_fails: false,
                unmaps: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl DisplayDevice for FakeDevice {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        fn probe(&mut self) -> Result<DisplayGeometry, BridgeError> {
            self.geometry
                .clone()
                .ok_or_else(|| BridgeError::unavailable("no display device"))
        }

        fn map(&mut self, geometry: &DisplayGeometry) -> Result<Box<dyn MappedMemory>, BridgeError> {
            if self.map_fails {
                return Err(BridgeError::unavailable("mapping refused"));
            }
            Ok(Box::new(CountingMemory {
                bytes: vec![0; geometry.phys_len],
                unmaps: self.unmaps.clone(),
            }))
        }
    }

    fn geometry(width: u32, height: u32) -> DisplayGeometry {
        DisplayGeometry {
            id: "fake".to_string(),
            width,
            height,
            bits_per_pixel: 32,
            stride_bytes: width * 4,
            phys_base: 0xfd00_0000,
            phys_len: (width * 4 * height) as usize,
        }
    }

    #[test_log::test]
    fn acquire_maps_and_release_unmaps_once() {
        let mut device = FakeDevice::new(geometry(64, 48));
        let unmaps = device.unmaps.clone();

        let mut surface = DisplaySurface::acquire(&mut device).expect("acquire");
        assert!(surface.is_mapped());
        assert_eq!(surface.geometry().width, 64);
        assert!(surface.view().is_some());

        surface.release();
        surface.release();
        assert!(!surface.is_mapped());
        assert!(surface.view().is_none());
        drop(surface);
        assert_eq!(unmaps.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn drop_releases_mapping() {
        let mut device = FakeDevice::new(geometry(8, 8));
        let unmaps = device.unmaps.clone();
        drop(DisplaySurface::acquire(&mut device).expect("acquire"));
        assert_eq!(unmaps.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn absent_device_fails() {
        let mut device = FakeDevice::new(geometry(8, 8));
        device.geometry = None;
        assert!(matches!(
            DisplaySurface::acquire(&mut device),
            Err(BridgeError::ResourceUnavailable { .. })
        ));
    }

    #[test_log::test]
    fn mapping_failure_is_reported() {
        let mut device = FakeDevice::new(geometry(8, 8));
        device.map_fails = true;
        assert!(DisplaySurface::acquire(&mut device).is_err());
    }

    #[test_log::test]
    fn inconsistent_geometry_is_rejected_before_mapping() {
        let mut short_stride = geometry(100, 10);
        short_stride.stride_bytes = 100;
        let mut device = FakeDevice::new(short_stride);
        device.map_fails = true;
        let err = DisplaySurface::acquire(&mut device).err().expect("must fail");
        assert!(err.to_string().contains("stride"));

        let mut short_memory = geometry(100, 10);
        short_memory.phys_len = 100;
        assert!(DisplaySurface::acquire(&mut FakeDevice::new(short_memory)).is_err());

        assert!(DisplaySurface::acquire(&mut FakeDevice::new(geometry(0, 10))).is_err());
    }

    #[test_log::test]
    fn headless_surface_starts_black() {
        let mut device = HeadlessDisplay::new(32, 16);
        let surface = DisplaySurface::acquire(&mut device).expect("acquire");
        let contents = surface.contents().expect("mapped");
        assert_eq!(contents.len(), 32 * 16 * 4);
        assert!(contents.iter().all(|&b| b == 0));
    }
}
