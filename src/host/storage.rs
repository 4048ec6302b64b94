// src/host/storage.rs

//! Persistent-storage adapters handed to the engine.
//!
//! Every operation tolerates a missing (null) handle and degrades to the
//! engine's conventions instead of failing: transfers report 0 bytes, `tell`
//! reports nothing, `eof` reports true. Transfers are positioned at the
//! handle's own cursor, the way `pread`/`pwrite` behave, and move the cursor
//! by the number of bytes actually transferred.

use crate::error::BridgeError;
use log::{debug, trace, warn};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Permissions used for every storage open.
const STORAGE_FILE_MODE: u32 = 0o644;

/// Origin for [`seek`], numbered like stdio's `SEEK_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Set,
    Cur,
    End,
}

impl SeekOrigin {
    pub fn from_raw(raw: libc::c_int) -> Option<Self> {
        match raw {
            libc::SEEK_SET => Some(SeekOrigin::Set),
            libc::SEEK_CUR => Some(SeekOrigin::Cur),
            libc::SEEK_END => Some(SeekOrigin::End),
            _ => None,
        }
    }
}

/// An open storage object and its cursor.
#[derive(Debug)]
pub struct StorageHandle {
    file: File,
    path: PathBuf,
    cursor: u64,
}

impl StorageHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Opens `path` for reading and writing.
///
/// `mode` is accepted for the engine's benefit but does not change how the
/// file is opened: it is always read/write, never created or truncated.
pub fn open(path: &Path, mode: &str) -> Option<StorageHandle> {
    let result = OpenOptions::new()
        .read(true)
        .write(true)
        .mode(STORAGE_FILE_MODE)
        .open(path);

    match result {
        Ok(file) => {
            debug!(
                "Storage: Opened {} for reading and writing (requested mode '{}')",
                path.display(),
                mode
            );
            Some(StorageHandle {
                file,
                path: path.to_path_buf(),
                cursor: 0,
            })
        }
        Err(e) => {
            warn!("Storage: Failed to open {}: {}", path.display(), e);
            None
        }
    }
}

pub fn close(handle: Option<StorageHandle>) {
    match handle {
        Some(handle) => {
            debug!("Storage: Closed {}", handle.path.display());
            drop(handle);
        }
        None => warn!("Storage: Attempting to close a null handle"),
    }
}

/// Reads up to `buf.len()` bytes at the cursor.
pub fn read(handle: Option<&mut StorageHandle>, buf: &mut [u8]) -> usize {
    let Some(handle) = handle else {
        return 0;
    };
    if buf.is_empty() {
        return 0;
    }

    match handle.file.read_at(buf, handle.cursor) {
        Ok(n) => {
            handle.cursor += n as u64;
            trace!(
                "Storage: Read {} bytes from {} (cursor now {})",
                n,
                handle.path.display(),
                handle.cursor
            );
            n
        }
        Err(e) => {
            debug!("Storage: Read from {} failed: {}", handle.path.display(), e);
            0
        }
    }
}

/// Writes up to `buf.len()` bytes at the cursor.
pub fn write(handle: Option<&mut StorageHandle>, buf: &[u8]) -> usize {
    let Some(handle) = handle else {
        return 0;
    };
    if buf.is_empty() {
        return 0;
    }

    match handle.file.write_at(buf, handle.cursor) {
        Ok(n) => {
            handle.cursor += n as u64;
            trace!(
                "Storage: Wrote {} bytes to {} (cursor now {})",
                n,
                handle.path.display(),
                handle.cursor
            );
            n
        }
        Err(e) => {
            debug!("Storage: Write to {} failed: {}", handle.path.display(), e);
            0
        }
    }
}

/// Moves the cursor and returns its new position. Positions before the start
/// of the file are clamped to 0.
pub fn seek(
    handle: Option<&mut StorageHandle>,
    offset: i64,
    origin: SeekOrigin,
) -> Result<u64, BridgeError> {
    let handle = handle.ok_or(BridgeError::InvalidHandle)?;

    let base = match origin {
        SeekOrigin::Set => 0,
        SeekOrigin::Cur => handle.cursor as i64,
        SeekOrigin::End => handle.size().map_err(|source| BridgeError::GeometryQuery {
            path: handle.path.clone(),
            source,
        })? as i64,
    };

    let new_pos = base.saturating_add(offset).max(0) as u64;
    handle.cursor = new_pos;
    Ok(new_pos)
}

pub fn tell(handle: Option<&StorageHandle>) -> Option<u64> {
    handle.map(|h| h.cursor)
}

/// True once the cursor has reached the current size. Also true when there
/// is no handle or the size cannot be determined.
pub fn eof(handle: Option<&StorageHandle>) -> bool {
    let Some(handle) = handle else {
        return true;
    };
    match handle.size() {
        Ok(size) => handle.cursor >= size,
        Err(e) => {
            debug!(
                "Storage: Size query for {} failed: {}",
                handle.path.display(),
                e
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents).expect("seed temp file");
        file.flush().expect("flush temp file");
        file
    }

    #[test_log::test]
    fn open_missing_file_returns_none() {
        assert!(open(Path::new("/nonexistent/DOOM.WAD"), "rb").is_none());
    }

    #[test_log::test]
    fn open_does_not_create_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("savegame.dsg");
        assert!(open(&path, "wb").is_none());
        assert!(!path.exists());
    }

    #[test_log::test]
    fn read_advances_cursor() {
        let file = file_with(b"IWAD0123456789");
        let mut handle = open(file.path(), "rb").expect("open");

        let mut magic = [0u8; 4];
        assert_eq!(read(Some(&mut handle), &mut magic), 4);
        assert_eq!(&magic, b"IWAD");
        assert_eq!(tell(Some(&handle)), Some(4));

        let mut rest = [0u8; 32];
        assert_eq!(read(Some(&mut handle), &mut rest), 10);
        assert_eq!(&rest[..10], b"0123456789");
        assert_eq!(read(Some(&mut handle), &mut rest), 0);
    }

    #[test_log::test]
    fn write_then_read_back_through_seek() {
        let file = file_with(b"..........");
        let mut handle = open(file.path(), "r+b").expect("open");

        assert_eq!(seek(Some(&mut handle), 3, SeekOrigin::Set).unwrap(), 3);
        assert_eq!(write(Some(&mut handle), b"abc"), 3);
        assert_eq!(tell(Some(&handle)), Some(6));

        seek(Some(&mut handle), 0, SeekOrigin::Set).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(read(Some(&mut handle), &mut buf), 10);
        assert_eq!(&buf, b"...abc....");
    }

    #[test_log::test]
    fn null_handle_and_empty_buffers_transfer_nothing() {
        let mut buf = [0u8; 8];
        assert_eq!(read(None, &mut buf), 0);
        assert_eq!(write(None, b"data"), 0);

        let file = file_with(b"data");
        let mut handle = open(file.path(), "rb").expect("open");
        assert_eq!(read(Some(&mut handle), &mut []), 0);
        assert_eq!(write(Some(&mut handle), &[]), 0);
        assert_eq!(handle.cursor(), 0);
    }

    #[test_log::test]
    fn seek_never_goes_negative() {
        let file = file_with(b"0123456789");
        let mut handle = open(file.path(), "rb").expect("open");

        assert_eq!(seek(Some(&mut handle), -5, SeekOrigin::Set).unwrap(), 0);
        seek(Some(&mut handle), 4, SeekOrigin::Set).unwrap();
        assert_eq!(seek(Some(&mut handle), -9, SeekOrigin::Cur).unwrap(), 0);
        assert_eq!(seek(Some(&mut handle), -20, SeekOrigin::End).unwrap(), 0);
        assert_eq!(seek(Some(&mut handle), -2, SeekOrigin::End).unwrap(), 8);
        assert_eq!(seek(Some(&mut handle), 1, SeekOrigin::Cur).unwrap(), 9);
    }

    #[test_log::test]
    fn seek_rejects_null_handle() {
        assert!(matches!(
            seek(None, 0, SeekOrigin::Set),
            Err(BridgeError::InvalidHandle)
        ));
        assert_eq!(tell(None), None);
    }

    #[test_log::test]
    fn eof_tracks_cursor_against_size() {
        let file = file_with(b"abc");
        let mut handle = open(file.path(), "rb").expect("open");

        assert!(!eof(Some(&handle)));
        seek(Some(&mut handle), 0, SeekOrigin::End).unwrap();
        assert!(eof(Some(&handle)));
        seek(Some(&mut handle), 2, SeekOrigin::Set).unwrap();
        assert!(!eof(Some(&handle)));
        seek(Some(&mut handle), 10, SeekOrigin::Set).unwrap();
        assert!(eof(Some(&handle)));
        assert!(eof(None));
    }

    #[test]
    fn seek_origin_follows_stdio_numbering() {
        assert_eq!(SeekOrigin::from_raw(0), Some(SeekOrigin::Set));
        assert_eq!(SeekOrigin::from_raw(1), Some(SeekOrigin::Cur));
        assert_eq!(SeekOrigin::from_raw(2), Some(SeekOrigin::End));
        assert_eq!(SeekOrigin::from_raw(7), None);
    }

    #[test_log::test]
    fn close_accepts_null() {
        close(None);
        let file = file_with(b"x");
        close(open(file.path(), "rb"));
    }
}
