// src/input/translate.rs

//! Raw evdev events to engine input.

use crate::engine::{EngineKey, InputEvent, MouseButton};
use crate::input::codes::*;

/// Last absolute position seen from one device. Axes are unknown until the
/// device first reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsPosition {
    pub x: Option<i32>,
    pub y: Option<i32>,
}

/// Engine key for an evdev `KEY_*` code on a US layout.
pub fn key_for_code(code: u16) -> Option<EngineKey> {
    const ROW_Q: &[u8] = b"qwertyuiop[]";
    const ROW_A: &[u8] = b"asdfghjkl;'";
    const ROW_Z: &[u8] = b"zxcvbnm,./";
    const DIGITS: &[u8] = b"1234567890-=";

    let key = match code {
        1 => EngineKey::ESCAPE,
        2..=13 => EngineKey::ascii(DIGITS[(code - 2) as usize]),
        14 => EngineKey::BACKSPACE,
        15 => EngineKey::TAB,
        16..=27 => EngineKey::ascii(ROW_Q[(code - 16) as usize]),
        28 | 96 => EngineKey::ENTER,
        29 | 97 => EngineKey::CTRL,
        30..=40 => EngineKey::ascii(ROW_A[(code - 30) as usize]),
        41 => EngineKey::ascii(b'`'),
        42 | 54 => EngineKey::SHIFT,
        43 => EngineKey::ascii(b'\\'),
        44..=53 => EngineKey::ascii(ROW_Z[(code - 44) as usize]),
        56 | 100 => EngineKey::ALT,
        57 => EngineKey::SPACE,
        59..=68 => EngineKey::function((code - 58) as u8),
        87 => EngineKey::F11,
        88 => EngineKey::F12,
        103 => EngineKey::UP_ARROW,
        105 => EngineKey::LEFT_ARROW,
        106 => EngineKey::RIGHT_ARROW,
        108 => EngineKey::DOWN_ARROW,
        119 => EngineKey::PAUSE,
        _ => return None,
    };
    Some(key)
}

pub fn button_for_code(code: u16) -> Option<MouseButton> {
    match code {
        BTN_LEFT => Some(MouseButton::Left),
        BTN_RIGHT => Some(MouseButton::Right),
        BTN_MIDDLE => Some(MouseButton::Middle),
        _ => None,
    }
}

/// Translates one raw event. `position` is the device's last absolute
/// position and is updated by absolute events.
///
/// Returns `None` for sync events, auto-repeat, unmapped codes and the first
/// absolute sample on an axis (it has nothing to be relative to).
pub fn translate(
    position: &mut AbsPosition,
    event_type: u16,
    code: u16,
    value: i32,
) -> Option<InputEvent> {
    match event_type {
        EV_KEY => {
            let pressed = match value {
                KEY_PRESSED => true,
                KEY_RELEASED => false,
                _ => return None,
            };
            if let Some(button) = button_for_code(code) {
                return Some(InputEvent::Button { button, pressed });
            }
            key_for_code(code).map(|key| InputEvent::Key { key, pressed })
        }
        EV_REL => match code {
            REL_X => Some(InputEvent::Motion { dx: value, dy: 0 }),
            REL_Y => Some(InputEvent::Motion { dx: 0, dy: value }),
            _ => None,
        },
        EV_ABS => {
            let axis = match code {
                ABS_X => &mut position.x,
                ABS_Y => &mut position.y,
                _ => return None,
            };
            let delta = axis.replace(value).map(|last| value.wrapping_sub(last))?;
            match (code, delta) {
                (_, 0) => None,
                (ABS_X, dx) => Some(InputEvent::Motion { dx, dy: 0 }),
                (_, dy) => Some(InputEvent::Motion { dx: 0, dy }),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(position: &mut AbsPosition, code: u16, value: i32) -> Option<InputEvent> {
        translate(position, EV_KEY, code, value)
    }

    #[test]
    fn letters_digits_and_specials() {
        assert_eq!(key_for_code(16), Some(EngineKey::ascii(b'q')));
        assert_eq!(key_for_code(30), Some(EngineKey::ascii(b'a')));
        assert_eq!(key_for_code(50), Some(EngineKey::ascii(b'm')));
        assert_eq!(key_for_code(2), Some(EngineKey::ascii(b'1')));
        assert_eq!(key_for_code(11), Some(EngineKey::ascii(b'0')));
        assert_eq!(key_for_code(1), Some(EngineKey::ESCAPE));
        assert_eq!(key_for_code(28), Some(EngineKey::ENTER));
        assert_eq!(key_for_code(57), Some(EngineKey::SPACE));
        assert_eq!(key_for_code(103), Some(EngineKey::UP_ARROW));
        assert_eq!(key_for_code(108), Some(EngineKey::DOWN_ARROW));
        assert_eq!(key_for_code(97), Some(EngineKey::CTRL));
        assert_eq!(key_for_code(59), Some(EngineKey::F1));
        assert_eq!(key_for_code(68), Some(EngineKey::function(10)));
        assert_eq!(key_for_code(88), Some(EngineKey::F12));
        assert_eq!(key_for_code(240), None);
    }

    #[test]
    fn press_release_and_repeat() {
        let mut pos = AbsPosition::default();
        assert_eq!(
            key(&mut pos, 17, KEY_PRESSED),
            Some(InputEvent::Key {
                key: EngineKey::ascii(b'w'),
                pressed: true
            })
        );
        assert_eq!(
            key(&mut pos, 17, KEY_RELEASED),
            Some(InputEvent::Key {
                key: EngineKey::ascii(b'w'),
                pressed: false
            })
        );
        assert_eq!(key(&mut pos, 17, KEY_REPEAT), None);
    }

    #[test]
    fn mouse_buttons_and_relative_motion() {
        let mut pos = AbsPosition::default();
        assert_eq!(
            key(&mut pos, BTN_LEFT, KEY_PRESSED),
            Some(InputEvent::Button {
                button: MouseButton::Left,
                pressed: true
            })
        );
        assert_eq!(
            translate(&mut pos, EV_REL, REL_X, -4),
            Some(InputEvent::Motion { dx: -4, dy: 0 })
        );
        assert_eq!(
            translate(&mut pos, EV_REL, REL_Y, 9),
            Some(InputEvent::Motion { dx: 0, dy: 9 })
        );
        // REL_WHEEL
        assert_eq!(translate(&mut pos, EV_REL, 0x08, 1), None);
        assert_eq!(translate(&mut pos, EV_SYN, 0, 0), None);
    }

    #[test]
    fn absolute_events_become_deltas() {
        let mut pos = AbsPosition::default();
        assert_eq!(translate(&mut pos, EV_ABS, ABS_X, 100), None);
        assert_eq!(
            translate(&mut pos, EV_ABS, ABS_X, 130),
            Some(InputEvent::Motion { dx: 30, dy: 0 })
        );
        assert_eq!(translate(&mut pos, EV_ABS, ABS_Y, 50), None);
        assert_eq!(
            translate(&mut pos, EV_ABS, ABS_Y, 40),
            Some(InputEvent::Motion { dx: 0, dy: -10 })
        );
        assert_eq!(translate(&mut pos, EV_ABS, ABS_Y, 40), None);
        assert_eq!(
            pos,
            AbsPosition {
                x: Some(130),
                y: Some(40)
            }
        );
    }
}
