// src/display/fbdev.rs

//! Linux framebuffer device (`/dev/fbN`).
//!
//! Geometry comes from `FBIOGET_VSCREENINFO` and `FBIOGET_FSCREENINFO`; the
//! whole display memory (`smem_len` bytes) is mapped shared and writable.
//! The device node is closed once the mapping exists, the mapping itself
//! stays valid until it is unmapped.

use crate::display::device::{DisplayDevice, DisplayGeometry, MappedMemory};
use crate::error::BridgeError;
use log::{debug, trace, warn};
use nix::sys::mman::{self, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// `struct fb_var_screeninfo` from `<linux/fb.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreenInfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo` from `<linux/fb.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbFixScreenInfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, FbVarScreenInfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, FbFixScreenInfo);

fn driver_id(raw: &[u8; 16]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

pub struct FbDevice {
    path: PathBuf,
    file: Option<File>,
}

impl FbDevice {
    pub fn new(path: &Path) -> Self {
        FbDevice {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn geometry_error(&self, err: nix::Error) -> BridgeError {
        BridgeError::GeometryQuery {
            path: self.path.clone(),
            source: err.into(),
        }
    }
}

/// Shared mapping of framebuffer memory.
struct FbMapping {
    base: NonNull<c_void>,
    len: usize,
}

// SAFETY: the mapping is exclusively owned; it is device memory, not tied to a thread.
unsafe impl Send for FbMapping {}

impl MappedMemory for FbMapping {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: `base` points at `len` mapped bytes for as long as `self` lives.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().cast::<u8>(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().cast::<u8>(), self.len) }
    }
}

impl Drop for FbMapping {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` are exactly what mmap returned and nobody else unmaps them.
        if let Err(e) = unsafe { mman::munmap(self.base, self.len) } {
            warn!("Failed to unmap framebuffer memory: {}", e);
        } else {
            debug!("Unmapped {} bytes of framebuffer memory", self.len);
        }
    }
}

impl DisplayDevice for FbDevice {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn probe(&mut self) -> Result<DisplayGeometry, BridgeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                BridgeError::unavailable_io(format!("failed to open {}", self.path.display()), e)
            })?;

        let mut var = FbVarScreenInfo::default();
        let mut fix = FbFixScreenInfo::default();
        // SAFETY: both structs match the kernel layout the ioctls write into.
        unsafe { fbioget_vscreeninfo(file.as_raw_fd(), &mut var) }
            .map_err(|e| self.geometry_error(e))?;
        unsafe { fbioget_fscreeninfo(file.as_raw_fd(), &mut fix) }
            .map_err(|e| self.geometry_error(e))?;

        trace!("FbDevice: var={:?} fix={:?}", var, fix);

        self.file = Some(file);
        Ok(DisplayGeometry {
            id: driver_id(&fix.id),
            width: var.xres,
            height: var.yres,
            bits_per_pixel: var.bits_per_pixel,
            stride_bytes: fix.line_length,
            phys_base: fix.smem_start as u64,
            phys_len: fix.smem_len as usize,
        })
    }

    fn map(&mut self, geometry: &DisplayGeometry) -> Result<Box<dyn MappedMemory>, BridgeError> {
        let file = self.file.take().ok_or_else(|| {
            BridgeError::unavailable(format!("{} was not probed", self.path.display()))
        })?;
        let len = NonZeroUsize::new(geometry.phys_len).ok_or_else(|| {
            BridgeError::unavailable(format!("{} reports no display memory", self.path.display()))
        })?;

        // SAFETY: a fresh shared mapping of the device; no existing Rust memory is aliased.
        let base = unsafe {
            mman::mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        }
        .map_err(|e| {
            BridgeError::unavailable_io(
                format!("failed to map framebuffer memory of {}", self.path.display()),
                e.into(),
            )
        })?;

        debug!("FbDevice: mapped {} at {:p}", self.path.display(), base);
        Ok(Box::new(FbMapping {
            base,
            len: len.get(),
        }))
    }
}
