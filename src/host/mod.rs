// src/host/mod.rs

//! Host services offered to the engine.
//!
//! [`HostServices`] is the whole callback table the engine expects (storage,
//! memory, exit, environment, time, diagnostics) as one interface. The bridge
//! builds a single [`BridgeHost`] and installs it into the engine once,
//! before the engine is initialised; it is never replaced afterwards.

pub mod arena;
pub mod storage;

use crate::config::Config;
use crate::drive::stop::StopSignal;
use crate::error::BridgeError;
use anyhow::{Context, Result};
use arena::Arena;
use log::{error, info};
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::NonNull;
use std::time::{SystemTime, UNIX_EPOCH};

pub use storage::{SeekOrigin, StorageHandle};

/// Wall-clock time split the way the engine wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub seconds: i64,
    pub microseconds: u32,
}

impl WallClock {
    pub fn now() -> Self {
        // A clock before 1970 reads as the epoch.
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        WallClock {
            seconds: since_epoch.as_secs() as i64,
            microseconds: since_epoch.subsec_micros(),
        }
    }
}

/// The services the hosted engine calls back into.
pub trait HostServices: Send + Sync {
    fn open(&self, path: &Path, mode: &str) -> Option<StorageHandle>;
    fn close(&self, handle: Option<StorageHandle>);
    fn read(&self, handle: Option<&mut StorageHandle>, buf: &mut [u8]) -> usize;
    fn write(&self, handle: Option<&mut StorageHandle>, buf: &[u8]) -> usize;
    fn seek(
        &self,
        handle: Option<&mut StorageHandle>,
        offset: i64,
        origin: SeekOrigin,
    ) -> Result<u64, BridgeError>;
    fn tell(&self, handle: Option<&StorageHandle>) -> Option<u64>;
    fn eof(&self, handle: Option<&StorageHandle>) -> bool;

    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;
    fn free(&self, ptr: *mut u8);

    /// The engine asked to terminate.
    fn exit(&self, code: i32);
    fn get_env(&self, name: &str) -> Option<&CStr>;
    fn time(&self) -> WallClock;
    fn print(&self, text: &str);
}

/// The bridge's implementation of [`HostServices`].
pub struct BridgeHost {
    arena: Arena,
    stop: StopSignal,
    home: CString,
}

impl BridgeHost {
    pub fn new(config: &Config, stop: StopSignal) -> Result<Self> {
        let home = CString::new(config.engine.home_dir.as_str())
            .context("Home directory contains an interior NUL byte")?;
        Ok(BridgeHost {
            arena: Arena::new(config.memory.arena_chunk_bytes),
            stop,
            home,
        })
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

impl HostServices for BridgeHost {
    fn open(&self, path: &Path, mode: &str) -> Option<StorageHandle> {
        storage::open(path, mode)
    }

    fn close(&self, handle: Option<StorageHandle>) {
        storage::close(handle)
    }

    fn read(&self, handle: Option<&mut StorageHandle>, buf: &mut [u8]) -> usize {
        storage::read(handle, buf)
    }

    fn write(&self, handle: Option<&mut StorageHandle>, buf: &[u8]) -> usize {
        storage::write(handle, buf)
    }

    fn seek(
        &self,
        handle: Option<&mut StorageHandle>,
        offset: i64,
        origin: SeekOrigin,
    ) -> Result<u64, BridgeError> {
        storage::seek(handle, offset, origin)
    }

    fn tell(&self, handle: Option<&StorageHandle>) -> Option<u64> {
        storage::tell(handle)
    }

    fn eof(&self, handle: Option<&StorageHandle>) -> bool {
        storage::eof(handle)
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = self.arena.allocate(size);
        if ptr.is_none() {
            error!("{}", BridgeError::AllocationFailure { size });
        }
        ptr
    }

    fn free(&self, ptr: *mut u8) {
        self.arena.free(ptr)
    }

    fn exit(&self, code: i32) {
        info!("Engine requested exit (code {}), stopping drive loop", code);
        self.stop.request();
    }

    fn get_env(&self, name: &str) -> Option<&CStr> {
        match name {
            "HOME" => Some(self.home.as_c_str()),
            _ => None,
        }
    }

    fn time(&self) -> WallClock {
        WallClock::now()
    }

    fn print(&self, text: &str) {
        info!(target: "engine", "{}", text.trim_end_matches('\n'));
    }
}
