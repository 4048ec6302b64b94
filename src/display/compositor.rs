// src/display/compositor.rs

//! Copies the engine's frame onto the display surface, centered.
//!
//! No scaling and no pixel format conversion: both sides use 4-byte pixels.
//! A frame that does not fit the surface is rejected before anything is
//! written.

use crate::display::surface::SurfaceView;
use crate::engine::{Frame, PIXEL_BYTES};
use crate::error::BridgeError;

/// Top-left corner that centers a `src_w`×`src_h` frame on a
/// `dst_w`×`dst_h` surface. The frame must not be larger than the surface.
pub fn centering_offset(dst_w: u32, dst_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    ((dst_w - src_w) / 2, (dst_h - src_h) / 2)
}

/// Writes `frame` into `view` and returns the offset it was placed at.
pub fn blit(view: &mut SurfaceView<'_>, frame: &Frame<'_>) -> Result<(u32, u32), BridgeError> {
    if view.bits_per_pixel as usize != PIXEL_BYTES * 8 {
        return Err(BridgeError::Composite(format!(
            "surface is {}bpp, frames are {}bpp",
            view.bits_per_pixel,
            PIXEL_BYTES * 8
        )));
    }

    let expected_len = frame.width as usize * frame.height as usize * PIXEL_BYTES;
    if frame.pixels.len() != expected_len {
        return Err(BridgeError::Composite(format!(
            "frame of {}x{} carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.pixels.len(),
            expected_len
        )));
    }

    if frame.width > view.width || frame.height > view.height {
        return Err(BridgeError::Composite(format!(
            "frame {}x{} does not fit surface {}x{}",
            frame.width, frame.height, view.width, view.height
        )));
    }

    let (off_x, off_y) = centering_offset(view.width, view.height, frame.width, frame.height);
    let row_bytes = frame.width as usize * PIXEL_BYTES;
    if row_bytes == 0 || frame.height == 0 {
        return Ok((off_x, off_y));
    }

    let stride_pixels = view.stride_bytes as usize / PIXEL_BYTES;
    let last_row_end =
        ((off_y + frame.height - 1) as usize * stride_pixels + off_x as usize) * PIXEL_BYTES
            + row_bytes;
    if last_row_end > view.pixels.len() {
        return Err(BridgeError::Composite(format!(
            "surface memory of {} bytes ends before byte {}",
            view.pixels.len(),
            last_row_end
        )));
    }

    for (y, src_row) in frame.pixels.chunks_exact(row_bytes).enumerate() {
        let start = ((off_y as usize + y) * stride_pixels + off_x as usize) * PIXEL_BYTES;
        view.pixels[start..start + row_bytes].copy_from_slice(src_row);
    }

    Ok((off_x, off_y))
}
