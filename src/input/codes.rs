// src/input/codes.rs

//! Event type/code numbers from `<linux/input-event-codes.h>` and the
//! capability sets the intake matches devices against.

use bitflags::bitflags;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;

pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;

/// Key values carried by EV_KEY events.
pub const KEY_RELEASED: i32 = 0;
pub const KEY_PRESSED: i32 = 1;
pub const KEY_REPEAT: i32 = 2;

bitflags! {
    /// Event types a device can emit (the low bits of its `evbit`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventTypes: u32 {
        const SYN = 1 << EV_SYN;
        const KEY = 1 << EV_KEY;
        const REL = 1 << EV_REL;
        const ABS = 1 << EV_ABS;
    }
}

bitflags! {
    /// The X/Y axes of a relative or absolute device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Axes: u32 {
        const X = 1 << 0;
        const Y = 1 << 1;
    }
}

/// What a device reports it can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub events: EventTypes,
    pub rel: Axes,
    pub abs: Axes,
}

impl DeviceCapabilities {
    pub const fn keyboard() -> Self {
        DeviceCapabilities {
            events: EventTypes::KEY,
            rel: Axes::empty(),
            abs: Axes::empty(),
        }
    }

    pub const fn relative_pointer() -> Self {
        DeviceCapabilities {
            events: EventTypes::REL,
            rel: Axes::all(),
            abs: Axes::empty(),
        }
    }

    pub const fn absolute_pointer() -> Self {
        DeviceCapabilities {
            events: EventTypes::ABS,
            rel: Axes::empty(),
            abs: Axes::all(),
        }
    }

    /// Every bit of `required` is also set here.
    pub fn satisfies(&self, required: &DeviceCapabilities) -> bool {
        self.events.contains(required.events)
            && self.rel.contains(required.rel)
            && self.abs.contains(required.abs)
    }
}

/// Devices worth binding: keyboards, relative mice, absolute pointers.
pub const DEVICE_ID_TABLE: [DeviceCapabilities; 3] = [
    DeviceCapabilities::keyboard(),
    DeviceCapabilities::relative_pointer(),
    DeviceCapabilities::absolute_pointer(),
];

/// True when any entry of [`DEVICE_ID_TABLE`] is satisfied.
pub fn matches(caps: &DeviceCapabilities) -> bool {
    DEVICE_ID_TABLE.iter().any(|required| caps.satisfies(required))
}
