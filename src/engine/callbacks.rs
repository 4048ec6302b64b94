// src/engine/callbacks.rs

//! C-ABI trampolines for the engine's callback table.
//!
//! The engine's setters take bare function pointers with no user-data
//! argument, so the trampolines reach the host through one process-wide
//! slot. The slot is written once, before the engine is initialised, and is
//! read-only afterwards.
//!
//! Storage handles cross the boundary as `Box<StorageHandle>` turned into a
//! raw pointer by `doom_open` and reclaimed by `doom_close`.

use crate::error::BridgeError;
use crate::host::{HostServices, SeekOrigin, StorageHandle};
use log::warn;
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int, c_void, CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

static HOST: OnceCell<Arc<dyn HostServices>> = OnceCell::new();

/// Fills the callback slot. Fails if it was already filled.
pub fn install(host: Arc<dyn HostServices>) -> Result<(), BridgeError> {
    HOST.set(host).map_err(|_| {
        BridgeError::RegistrationFailure("engine host services are already installed".to_string())
    })
}

fn host() -> Option<&'static Arc<dyn HostServices>> {
    let host = HOST.get();
    if host.is_none() {
        warn!("Engine callback invoked before host services were installed");
    }
    host
}

/// # Safety
/// `handle` must be null or a pointer returned by [`doom_open`] that has not
/// been closed.
unsafe fn handle_mut<'a>(handle: *mut c_void) -> Option<&'a mut StorageHandle> {
    handle.cast::<StorageHandle>().as_mut()
}

pub unsafe extern "C" fn doom_open(filename: *const c_char, mode: *const c_char) -> *mut c_void {
    let Some(host) = host() else {
        return ptr::null_mut();
    };
    if filename.is_null() {
        return ptr::null_mut();
    }
    let path = Path::new(OsStr::from_bytes(CStr::from_ptr(filename).to_bytes()));
    let mode = if mode.is_null() {
        String::new()
    } else {
        CStr::from_ptr(mode).to_string_lossy().into_owned()
    };
    match host.open(path, &mode) {
        Some(handle) => Box::into_raw(Box::new(handle)).cast::<c_void>(),
        None => ptr::null_mut(),
    }
}

pub unsafe extern "C" fn doom_close(handle: *mut c_void) {
    let Some(host) = host() else { return };
    let handle = if handle.is_null() {
        None
    } else {
        Some(*Box::from_raw(handle.cast::<StorageHandle>()))
    };
    host.close(handle);
}

pub unsafe extern "C" fn doom_read(handle: *mut c_void, buf: *mut c_void, count: c_int) -> c_int {
    let Some(host) = host() else { return 0 };
    if buf.is_null() || count <= 0 {
        return 0;
    }
    let buf = std::slice::from_raw_parts_mut(buf.cast::<u8>(), count as usize);
    host.read(handle_mut(handle), buf) as c_int
}

pub unsafe extern "C" fn doom_write(handle: *mut c_void, buf: *const c_void, count: c_int) -> c_int {
    let Some(host) = host() else { return 0 };
    if buf.is_null() || count <= 0 {
        return 0;
    }
    let buf = std::slice::from_raw_parts(buf.cast::<u8>(), count as usize);
    host.write(handle_mut(handle), buf) as c_int
}

/// Returns 0 on success and -1 on failure, like `fseek`.
pub unsafe extern "C" fn doom_seek(handle: *mut c_void, offset: c_int, origin: c_int) -> c_int {
    let Some(host) = host() else { return -1 };
    let Some(origin) = SeekOrigin::from_raw(origin) else {
        return -1;
    };
    match host.seek(handle_mut(handle), offset as i64, origin) {
        Ok(_) => 0,
        Err(_) => -1,
    }
}

pub unsafe extern "C" fn doom_tell(handle: *mut c_void) -> c_int {
    let Some(host) = host() else { return -1 };
    match host.tell(handle_mut(handle).map(|h| &*h)) {
        Some(cursor) => c_int::try_from(cursor).unwrap_or(c_int::MAX),
        None => -1,
    }
}

pub unsafe extern "C" fn doom_eof(handle: *mut c_void) -> c_int {
    let Some(host) = host() else { return 1 };
    host.eof(handle_mut(handle).map(|h| &*h)) as c_int
}

pub unsafe extern "C" fn doom_malloc(size: c_int) -> *mut c_void {
    let Some(host) = host() else {
        return ptr::null_mut();
    };
    if size < 0 {
        return ptr::null_mut();
    }
    host.allocate(size as usize)
        .map_or(ptr::null_mut(), |p| p.as_ptr().cast::<c_void>())
}

pub unsafe extern "C" fn doom_free(ptr: *mut c_void) {
    if let Some(host) = host() {
        host.free(ptr.cast::<u8>());
    }
}

pub unsafe extern "C" fn doom_exit(code: c_int) {
    if let Some(host) = host() {
        host.exit(code);
    }
}

/// The returned string lives as long as the host services, i.e. for the
/// rest of the process.
pub unsafe extern "C" fn doom_getenv(name: *const c_char) -> *mut c_char {
    let Some(host) = host() else {
        return ptr::null_mut();
    };
    if name.is_null() {
        return ptr::null_mut();
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return ptr::null_mut();
    };
    host.get_env(name)
        .map_or(ptr::null_mut(), |value| value.as_ptr().cast_mut())
}

pub unsafe extern "C" fn doom_gettime(sec: *mut c_int, usec: *mut c_int) {
    let Some(host) = host() else { return };
    let now = host.time();
    if !sec.is_null() {
        *sec = now.seconds as c_int;
    }
    if !usec.is_null() {
        *usec = now.microseconds as c_int;
    }
}

pub unsafe extern "C" fn doom_print(text: *const c_char) {
    let Some(host) = host() else { return };
    if !text.is_null() {
        host.print(&CStr::from_ptr(text).to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::drive::stop::StopSignal;
    use crate::host::BridgeHost;
    use once_cell::sync::Lazy;
    use std::ffi::CString;
    use std::io::Write;

    static STOP: Lazy<StopSignal> = Lazy::new(StopSignal::new);

    fn ensure_host() {
        HOST.get_or_init(|| {
            Arc::new(BridgeHost::new(&Config::default(), STOP.clone()).expect("host"))
        });
    }

    fn c(s: &str) -> CString {
        CString::new(s).expect("no nul")
    }

    #[test]
    fn second_install_is_refused() {
        ensure_host();
        let again = Arc::new(BridgeHost::new(&Config::default(), StopSignal::new()).expect("host"));
        assert!(matches!(
            install(again),
            Err(BridgeError::RegistrationFailure(_))
        ));
    }

    #[test_log::test]
    fn file_round_trip_through_raw_pointers() {
        ensure_host();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"IWAD0123456789").expect("write");
        let path = c(file.path().to_str().expect("utf8 path"));

        unsafe {
            let handle = doom_open(path.as_ptr(), c"rb".as_ptr());
            assert!(!handle.is_null());

            let mut magic = [0u8; 4];
            assert_eq!(doom_read(handle, magic.as_mut_ptr().cast(), 4), 4);
            assert_eq!(&magic, b"IWAD");
            assert_eq!(doom_tell(handle), 4);

            assert_eq!(doom_seek(handle, -3, 2), 0);
            assert_eq!(doom_tell(handle), 11);
            assert_eq!(doom_eof(handle), 0);
            assert_eq!(doom_seek(handle, 0, 2), 0);
            assert_eq!(doom_eof(handle), 1);

            assert_eq!(doom_seek(handle, -100, 0), 0);
            assert_eq!(doom_tell(handle), 0);
            assert_eq!(doom_seek(handle, 0, 7), -1);

            doom_close(handle);
        }
    }

    #[test_log::test]
    fn null_arguments_degrade() {
        ensure_host();
        let mut buf = [0u8; 8];
        unsafe {
            assert!(doom_open(ptr::null(), c"rb".as_ptr()).is_null());
            assert!(doom_open(c"/nonexistent/doom.wad".as_ptr(), c"rb".as_ptr()).is_null());
            assert_eq!(doom_read(ptr::null_mut(), buf.as_mut_ptr().cast(), 8), 0);
            assert_eq!(doom_write(ptr::null_mut(), buf.as_ptr().cast(), 8), 0);
            assert_eq!(doom_seek(ptr::null_mut(), 0, 0), -1);
            assert_eq!(doom_tell(ptr::null_mut()), -1);
            assert_eq!(doom_eof(ptr::null_mut()), 1);
            doom_close(ptr::null_mut());
        }
    }

    #[test_log::test]
    fn read_write_reject_empty_counts_and_null_buffers() {
        ensure_host();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"abcdef").expect("write");
        let path = c(file.path().to_str().expect("utf8 path"));
        let mut buf = [0u8; 4];

        unsafe {
            let handle = doom_open(path.as_ptr(), c"r+b".as_ptr());
            assert!(!handle.is_null());

            assert_eq!(doom_read(handle, buf.as_mut_ptr().cast(), 0), 0);
            assert_eq!(doom_read(handle, buf.as_mut_ptr().cast(), -1), 0);
            assert_eq!(doom_read(handle, ptr::null_mut(), 4), 0);
            assert_eq!(doom_write(handle, buf.as_ptr().cast(), -3), 0);
            assert_eq!(doom_write(handle, ptr::null(), 2), 0);
            assert_eq!(doom_tell(handle), 0);

            assert_eq!(doom_write(handle, b"XY".as_ptr().cast(), 2), 2);
            assert_eq!(doom_tell(handle), 2);
            assert_eq!(doom_read(handle, buf.as_mut_ptr().cast(), 4), 4);
            assert_eq!(&buf, b"cdef");

            doom_close(handle);
        }
        assert_eq!(std::fs::read(file.path()).expect("read back"), b"XYcdef");
    }

    #[test]
    fn getenv_and_gettime() {
        ensure_host();
        unsafe {
            let home = doom_getenv(c"HOME".as_ptr());
            assert!(!home.is_null());
            assert_eq!(CStr::from_ptr(home), c"/");
            assert!(doom_getenv(c"PATH".as_ptr()).is_null());
            assert!(doom_getenv(ptr::null()).is_null());

            let (mut sec, mut usec) = (0, -1);
            doom_gettime(&mut sec, &mut usec);
            assert!(sec > 0);
            assert!((0..1_000_000).contains(&usec));
            doom_gettime(ptr::null_mut(), ptr::null_mut());
        }
    }

    #[test]
    fn malloc_returns_aligned_memory() {
        ensure_host();
        unsafe {
            let p = doom_malloc(100);
            assert!(!p.is_null());
            assert_eq!(p as usize % 16, 0);
            ptr::write_bytes(p.cast::<u8>(), 0x5a, 100);
            doom_free(p);
            assert!(doom_malloc(-1).is_null());
        }
    }

    #[test]
    fn exit_requests_stop_and_print_does_not_panic() {
        ensure_host();
        unsafe {
            doom_print(c"Z_Init: Init zone memory allocation daemon.\n".as_ptr());
            doom_print(ptr::null());
            doom_exit(0);
        }
        assert!(STOP.is_requested());
    }
}
