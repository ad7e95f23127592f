//! ASCII-to-FVC-text-encoding keyboard mapping and the two reserved input
//! registers it's written through (grounded in `components/keyboard.py`).

use log::debug;

use crate::bus::Bus;
use crate::error::FvcResult;

/// Reserved bus addresses the keyboard driver writes its two input bytes
/// at: the translated character and a modifier-bit field.
pub const CHAR_ADDR: u32 = 23;
pub const MODIFIER_ADDR: u32 = 24;

pub const SHIFT_BIT: u8 = 1 << 0;
pub const CAPS_LOCK_BIT: u8 = 1 << 1;
pub const CTRL_BIT: u8 = 1 << 2;
pub const ALT_BIT: u8 = 1 << 3;
pub const META_BIT: u8 = 1 << 4;
pub const DELTA_BIT: u8 = 1 << 5;
pub const BACKSPACE_BIT: u8 = 1 << 7;

/// Translates an ASCII byte to its FVC text-encoding keycode. Bytes outside
/// this table have no key on the virtual keyboard.
pub fn ascii_to_ffvcte(ascii: u8) -> Option<u8> {
    Some(match ascii {
        0 => 0x00,
        2 => 0x01,
        3 => 0x02,
        9 => 0x0f,
        13 => 0x05,
        27 => 0x07,
        32 => 0x4e,
        33 => 0x63,
        34 => 0x5f,
        35 => 0x65,
        36 => 0x66,
        37 => 0x67,
        38 => 0x69,
        39 => 0x55,
        40 => 0x6b,
        41 => 0x6c,
        42 => 0x6a,
        43 => 0x5a,
        44 => 0x56,
        45 => 0x4f,
        46 => 0x57,
        47 => 0x58,
        48..=57 => 0x10 + (ascii - 48),
        58 => 0x5e,
        59 => 0x54,
        60 => 0x60,
        61 => 0x50,
        62 => 0x61,
        63 => 0x62,
        64 => 0x64,
        65..=90 => 0x34 + (ascii - 65),
        91 => 0x51,
        92 => 0x53,
        93 => 0x52,
        94 => 0x68,
        95 => 0x59,
        96 => 0x6d,
        97..=122 => 0x1a + (ascii - 97),
        123 => 0x5b,
        124 => 0x5d,
        125 => 0x5c,
        126 => 0x6e,
        _ => return None,
    })
}

/// Writes one keypress into the reserved input registers. An unmapped byte
/// is logged and dropped, matching the driver's own `except KeyError`.
pub fn dispatch_key(bus: &mut Bus, ascii: u8, modifiers: u8) -> FvcResult<()> {
    match ascii_to_ffvcte(ascii) {
        Some(code) => {
            bus.write(CHAR_ADDR, u64::from(code))?;
            bus.write(MODIFIER_ADDR, u64::from(modifiers))?;
            Ok(())
        }
        None => {
            debug!("keyboard: unsupported input byte {}", ascii);
            Ok(())
        }
    }
}
