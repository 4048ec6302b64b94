// src/input/evdev.rs

//! Linux event devices (`/dev/input/event*`).
//!
//! A background `input-events` thread owns every opened device. It rescans
//! the device directory periodically, offers new nodes to the intake, and
//! waits on all bound fds with epoll. A device whose read fails with
//! `ENODEV` was unplugged and is disconnected.

use super::codes::{Axes, DeviceCapabilities, EventTypes, ABS_X, ABS_Y, EV_ABS, EV_REL, REL_X, REL_Y};
use super::{DeviceId, InputDevice, InputIntake, InputSubsystem};
use crate::config::InputConfig;
use crate::drive::stop::StopSignal;
use crate::error::BridgeError;
use crate::os::epoll::EventMonitor;
use anyhow::{Context, Result};
use libc::c_ulong;
use log::*;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::mem::size_of;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

nix::ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
nix::ioctl_read_buf!(eviocgbit_types, b'E', 0x20, c_ulong);
nix::ioctl_read_buf!(eviocgbit_rel, b'E', 0x20 + EV_REL, c_ulong);
nix::ioctl_read_buf!(eviocgbit_abs, b'E', 0x20 + EV_ABS, c_ulong);
nix::ioctl_write_int!(eviocgrab, b'E', 0x90);

/// Upper bound on one epoll wait so a stop request is noticed promptly.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// `struct input_event` is a `struct timeval` followed by type, code, value.
const EVENT_TIME_BYTES: usize = size_of::<libc::timeval>();
const EVENT_BYTES: usize = EVENT_TIME_BYTES + 8;
const EVENTS_PER_READ: usize = 64;

/// EVIOCGBIT bitmaps are arrays of native-endian `unsigned long` words.
const BITMAP_WORDS: usize = 64 / c_ulong::BITS as usize;

fn test_bit(words: &[c_ulong], bit: u16) -> bool {
    let width = c_ulong::BITS as usize;
    words
        .get(bit as usize / width)
        .is_some_and(|word| (word >> (bit as usize % width)) & 1 == 1)
}

fn axes_from_bits(bits: &[c_ulong], x: u16, y: u16) -> Axes {
    let mut axes = Axes::empty();
    axes.set(Axes::X, test_bit(bits, x));
    axes.set(Axes::Y, test_bit(bits, y));
    axes
}

/// Decodes as many whole `input_event` records as `buf` holds into
/// `(type, code, value)` triples.
pub fn decode_events(buf: &[u8]) -> impl Iterator<Item = (u16, u16, i32)> + '_ {
    buf.chunks_exact(EVENT_BYTES).map(|record| {
        let body = &record[EVENT_TIME_BYTES..];
        (
            u16::from_ne_bytes([body[0], body[1]]),
            u16::from_ne_bytes([body[2], body[3]]),
            i32::from_ne_bytes([body[4], body[5], body[6], body[7]]),
        )
    })
}

pub struct EvdevDevice {
    path: PathBuf,
    file: File,
    name: String,
    caps: DeviceCapabilities,
    grab: bool,
    grabbed: bool,
}

impl EvdevDevice {
    /// Opens the node non-blocking and reads its name and capabilities.
    pub fn probe(path: &Path, grab: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let fd = file.as_raw_fd();

        let mut name_buf = [0u8; 256];
        // SAFETY: the buffer outlives the call and its length is encoded in the request.
        let name = match unsafe { eviocgname(fd, &mut name_buf) } {
            Ok(_) => {
                let end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
                String::from_utf8_lossy(&name_buf[..end]).into_owned()
            }
            Err(_) => path.display().to_string(),
        };

        let mut type_bits: [c_ulong; BITMAP_WORDS] = [0; BITMAP_WORDS];
        let mut rel_bits: [c_ulong; BITMAP_WORDS] = [0; BITMAP_WORDS];
        let mut abs_bits: [c_ulong; BITMAP_WORDS] = [0; BITMAP_WORDS];
        // SAFETY: as above, for each capability bitmap.
        unsafe {
            eviocgbit_types(fd, &mut type_bits)
                .with_context(|| format!("EVIOCGBIT failed on {}", path.display()))?;
            eviocgbit_rel(fd, &mut rel_bits)
                .with_context(|| format!("EVIOCGBIT(EV_REL) failed on {}", path.display()))?;
            eviocgbit_abs(fd, &mut abs_bits)
                .with_context(|| format!("EVIOCGBIT(EV_ABS) failed on {}", path.display()))?;
        }

        let caps = DeviceCapabilities {
            events: EventTypes::from_bits_truncate(type_bits[0] as u32),
            rel: axes_from_bits(&rel_bits, REL_X, REL_Y),
            abs: axes_from_bits(&abs_bits, ABS_X, ABS_Y),
        };
        trace!("Evdev: {} ({}) caps {:?}", path.display(), name, caps);

        Ok(EvdevDevice {
            path: path.to_path_buf(),
            file,
            name,
            caps,
            grab,
            grabbed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputDevice for EvdevDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    fn open(&mut self) -> Result<(), BridgeError> {
        if self.grab {
            // SAFETY: plain integer ioctl on an fd we own.
            unsafe { eviocgrab(self.file.as_raw_fd(), 1) }.map_err(|e| {
                BridgeError::unavailable_io(
                    format!("failed to grab {}", self.path.display()),
                    e.into(),
                )
            })?;
            self.grabbed = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.grabbed {
            // SAFETY: as in `open`.
            if let Err(e) = unsafe { eviocgrab(self.file.as_raw_fd(), 0) } {
                debug!("Evdev: Releasing grab on {} failed: {}", self.path.display(), e);
            }
            self.grabbed = false;
        }
    }
}

/// `event*` nodes in `dir`, sorted.
fn scan_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut nodes: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("event"))
        })
        .collect();
    nodes.sort();
    Ok(nodes)
}

pub struct EvdevInput {
    config: InputConfig,
    worker: Option<(JoinHandle<()>, StopSignal)>,
}

impl EvdevInput {
    pub fn new(config: &InputConfig) -> Self {
        EvdevInput {
            config: config.clone(),
            worker: None,
        }
    }
}

impl InputSubsystem for EvdevInput {
    fn register(&mut self, intake: Arc<InputIntake>) -> Result<()> {
        if self.worker.is_some() {
            return Err(BridgeError::RegistrationFailure(
                "evdev subsystem already registered".to_string(),
            )
            .into());
        }

        let mut worker = Worker::new(&self.config, intake)?;
        worker.rescan();

        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("input-events".to_string())
            .spawn(move || worker.run(thread_stop))
            .context("Failed to spawn input-events thread")?;

        info!("Evdev: input-events thread spawned for {}", self.config.device_dir.display());
        self.worker = Some((handle, stop));
        Ok(())
    }

    fn unregister(&mut self) {
        if let Some((handle, stop)) = self.worker.take() {
            stop.request();
            if handle.join().is_err() {
                error!("Evdev: input-events thread panicked");
            }
            info!("Evdev: Unregistered");
        }
    }
}

impl Drop for EvdevInput {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// State owned by the `input-events` thread.
struct Worker {
    intake: Arc<InputIntake>,
    monitor: EventMonitor,
    device_dir: PathBuf,
    grab: bool,
    rescan_interval: Duration,
    devices: HashMap<DeviceId, EvdevDevice>,
    /// Nodes already bound or found not to match.
    seen: HashSet<PathBuf>,
    next_id: u64,
}

impl Worker {
    fn new(config: &InputConfig, intake: Arc<InputIntake>) -> Result<Self> {
        Ok(Worker {
            intake,
            monitor: EventMonitor::new().context("Failed to create input EventMonitor")?,
            device_dir: config.device_dir.clone(),
            grab: config.grab_devices,
            rescan_interval: config.rescan_interval(),
            devices: HashMap::new(),
            seen: HashSet::new(),
            next_id: 0,
        })
    }

    fn run(mut self, stop: StopSignal) {
        let mut ready = Vec::with_capacity(16);
        let mut read_buffer = vec![0u8; EVENT_BYTES * EVENTS_PER_READ];
        let mut next_scan = Instant::now() + self.rescan_interval;

        while !stop.is_requested() {
            let now = Instant::now();
            if now >= next_scan {
                self.rescan();
                next_scan = now + self.rescan_interval;
            }

            let timeout = next_scan.saturating_duration_since(now).min(POLL_SLICE);
            if let Err(e) = self.monitor.wait(&mut ready, timeout) {
                error!("Evdev: {:#}", e);
                break;
            }

            for readiness in &ready {
                let id = DeviceId(readiness.token);
                if !self.drain_device(id, &mut read_buffer) || readiness.is_hangup() {
                    self.remove(id);
                }
            }
        }

        let ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
        debug!("Evdev: input-events thread exiting");
    }

    /// Offers every new node in the device directory to the intake.
    fn rescan(&mut self) {
        let nodes = match scan_dir(&self.device_dir) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Evdev: Cannot scan {}: {}", self.device_dir.display(), e);
                return;
            }
        };

        for path in nodes {
            if self.seen.contains(&path) {
                continue;
            }
            let mut device = match EvdevDevice::probe(&path, self.grab) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Evdev: Skipping {}: {:#}", path.display(), e);
                    continue;
                }
            };
            self.seen.insert(path.clone());
            if !self.intake.matches(&device) {
                trace!("Evdev: {} ({}) does not match", path.display(), device.name());
                continue;
            }

            let id = DeviceId(self.next_id);
            self.next_id += 1;
            if let Err(e) = self.intake.connect(id, &mut device) {
                warn!("Evdev: Not binding {}: {}", device.name(), e);
                self.seen.remove(&path);
                continue;
            }
            if let Err(e) = self.monitor.add(device.file.as_raw_fd(), id.0) {
                warn!("Evdev: {:#}", e);
                self.intake.disconnect(id, &mut device);
                self.seen.remove(&path);
                continue;
            }
            self.devices.insert(id, device);
        }
    }

    /// Reads everything pending on `id`. Returns false once the device is gone.
    fn drain_device(&mut self, id: DeviceId, buf: &mut [u8]) -> bool {
        let Some(device) = self.devices.get_mut(&id) else {
            return true;
        };
        loop {
            match device.file.read(buf) {
                Ok(0) => return false,
                Ok(n) => {
                    for (event_type, code, value) in decode_events(&buf[..n]) {
                        self.intake.on_event(id, event_type, code, value);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if e.raw_os_error() != Some(libc::ENODEV) {
                        warn!("Evdev: Read from {} failed: {}", device.path.display(), e);
                    }
                    return false;
                }
            }
        }
    }

    fn remove(&mut self, id: DeviceId) {
        if let Some(mut device) = self.devices.remove(&id) {
            if let Err(e) = self.monitor.delete(device.file.as_raw_fd()) {
                trace!("Evdev: {:#}", e);
            }
            self.intake.disconnect(id, &mut device);
            self.seen.remove(&device.path);
        }
    }
}
