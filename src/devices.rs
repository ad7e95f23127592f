//! Memory-mapped devices living outside the RAM/VRAM range.
//!
//! The audio controller has no counterpart in the original source beyond
//! a `snd = None` placeholder (`components/bus.py`); this stub gives the
//! audio address range somewhere real to land without pretending to
//! emulate hardware that was never specified.

use log::debug;
use rodio::{OutputStream, OutputStreamHandle};

/// Backs bus addresses 33010..=33143. Writes are latched into a register
/// file; nothing is played back unless a tone is explicitly triggered,
/// since no opcode or BIOS command in this system ever does so.
pub struct AudioStub {
    registers: [u8; 134],
    _stream: Option<(OutputStream, OutputStreamHandle)>,
}

impl AudioStub {
    pub fn new() -> Self {
        let stream = OutputStream::try_default().ok();
        AudioStub { registers: [0u8; 134], _stream: stream }
    }

    pub fn write(&mut self, offset: u32, data: &[u8]) {
        let start = offset as usize;
        if start >= self.registers.len() {
            debug!("audio register write out of range: {}", offset);
            return;
        }
        let end = (start + data.len()).min(self.registers.len());
        self.registers[start..end].copy_from_slice(&data[..end - start]);
    }

    pub fn read(&self, offset: u32) -> u8 {
        self.registers.get(offset as usize).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut a = AudioStub::new();
        a.write(5, &[42]);
        assert_eq!(a.read(5), 42);
    }

    #[test]
    fn write_past_range_is_ignored_not_fatal() {
        let mut a = AudioStub::new();
        a.write(200, &[1]);
        assert_eq!(a.read(200), 0);
    }
}
