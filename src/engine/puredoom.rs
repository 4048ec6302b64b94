// src/engine/puredoom.rs

//! The PureDOOM C library as an [`Engine`].
//!
//! The library keeps all of its state in globals, so at most one
//! `PureDoomEngine` may exist per process.

use super::callbacks::{self, *};
use super::{Engine, Frame, InputEvent, LaunchConfig, ENGINE_HEIGHT, ENGINE_WIDTH};
use crate::host::HostServices;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::ffi::{c_char, c_int, c_uchar, c_void, CString};
use std::sync::Arc;

type OpenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
type CloseFn = unsafe extern "C" fn(*mut c_void);
type ReadFn = unsafe extern "C" fn(*mut c_void, *mut c_void, c_int) -> c_int;
type WriteFn = unsafe extern "C" fn(*mut c_void, *const c_void, c_int) -> c_int;
type SeekFn = unsafe extern "C" fn(*mut c_void, c_int, c_int) -> c_int;
type TellFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type EofFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type MallocFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type ExitFn = unsafe extern "C" fn(c_int);
type GetEnvFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type GetTimeFn = unsafe extern "C" fn(*mut c_int, *mut c_int);
type PrintFn = unsafe extern "C" fn(*const c_char);

extern "C" {
    fn doom_set_file_io(
        open: OpenFn,
        close: CloseFn,
        read: ReadFn,
        write: WriteFn,
        seek: SeekFn,
        tell: TellFn,
        eof: EofFn,
    );
    fn doom_set_malloc(malloc: MallocFn, free: FreeFn);
    fn doom_set_exit(exit: ExitFn);
    fn doom_set_getenv(getenv: GetEnvFn);
    fn doom_set_gettime(gettime: GetTimeFn);
    fn doom_set_print(print: PrintFn);

    fn doom_init(argc: c_int, argv: *mut *mut c_char, flags: c_int);
    fn doom_update();
    fn doom_get_framebuffer(channels: c_int) -> *const c_uchar;

    fn doom_key_down(key: c_int);
    fn doom_key_up(key: c_int);
    fn doom_button_down(button: c_int);
    fn doom_button_up(button: c_int);
    fn doom_mouse_move(delta_x: c_int, delta_y: c_int);
}

#[derive(Default)]
pub struct PureDoomEngine {
    /// `doom_init` may keep pointers into argv, so the strings live as long
    /// as the engine.
    argv_storage: Vec<CString>,
    argv: Vec<*mut c_char>,
    host_installed: bool,
    initialised: bool,
}

// SAFETY: the raw argv pointers point into `argv_storage`, which moves with
// the engine; the C library is only ever driven from one thread at a time.
unsafe impl Send for PureDoomEngine {}

impl PureDoomEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for PureDoomEngine {
    fn install_host(&mut self, host: Arc<dyn HostServices>) -> Result<()> {
        callbacks::install(host).context("Failed to install engine host services")?;
        // SAFETY: every trampoline matches the typedef the setter expects.
        unsafe {
            doom_set_file_io(
                doom_open, doom_close, doom_read, doom_write, doom_seek, doom_tell, doom_eof,
            );
            doom_set_malloc(doom_malloc, doom_free);
            doom_set_exit(doom_exit);
            doom_set_getenv(doom_getenv);
            doom_set_gettime(doom_gettime);
            doom_set_print(doom_print);
        }
        self.host_installed = true;
        debug!("PureDoom: Callback table installed");
        Ok(())
    }

    fn init(&mut self, launch: &LaunchConfig) -> Result<()> {
        if !self.host_installed {
            bail!("PureDOOM initialised before host services were installed");
        }
        self.argv_storage = launch
            .args
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<_, _>>()
            .context("Launch argument contains an interior NUL byte")?;
        self.argv = self
            .argv_storage
            .iter()
            .map(|arg| arg.as_ptr().cast_mut())
            .collect();

        info!("PureDoom: doom_init({:?}, flags={})", launch.args, launch.flags);
        // SAFETY: argv points at NUL-terminated strings that outlive the engine.
        unsafe { doom_init(self.argv.len() as c_int, self.argv.as_mut_ptr(), launch.flags) };
        self.initialised = true;
        Ok(())
    }

    fn update(&mut self) {
        if self.initialised {
            // SAFETY: the library was initialised on this engine.
            unsafe { doom_update() };
        }
    }

    fn framebuffer(&mut self, bytes_per_pixel: usize) -> Frame<'_> {
        let len = ENGINE_WIDTH as usize * ENGINE_HEIGHT as usize * bytes_per_pixel;
        let pixels: &[u8] = if self.initialised {
            // SAFETY: the library returns its internal 320x200 buffer with the
            // requested channel count; it stays valid until the next update,
            // which cannot happen while `self` is borrowed.
            unsafe {
                let ptr = doom_get_framebuffer(bytes_per_pixel as c_int);
                if ptr.is_null() {
                    &[]
                } else {
                    std::slice::from_raw_parts(ptr, len)
                }
            }
        } else {
            &[]
        };
        Frame {
            pixels,
            width: ENGINE_WIDTH,
            height: ENGINE_HEIGHT,
        }
    }

    fn handle_input(&mut self, event: InputEvent) {
        if !self.initialised {
            return;
        }
        // SAFETY: plain value calls into the initialised library.
        unsafe {
            match event {
                InputEvent::Key { key, pressed: true } => doom_key_down(key.0),
                InputEvent::Key { key, pressed: false } => doom_key_up(key.0),
                InputEvent::Button { button, pressed: true } => doom_button_down(button as c_int),
                InputEvent::Button { button, pressed: false } => doom_button_up(button as c_int),
                InputEvent::Motion { dx, dy } => doom_mouse_move(dx, dy),
            }
        }
    }
}
