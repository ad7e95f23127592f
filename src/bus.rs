//! Address routing between RAM, the overlapping VRAM window, and the
//! audio controller stub (grounded in `components/bus.py`).

use crate::devices::AudioStub;
use crate::display::{self, Display, Mode};
use crate::error::{BusError, FvcResult};
use crate::memory::MemBlock;

/// RAM occupies the whole addressable range; VRAM overlaps its upper
/// portion; audio sits just past it. All ranges are inclusive, matching
/// the Python `mapping` table.
pub const RAM_START: u32 = 0;
pub const RAM_END: u32 = 33_009;
pub const VRAM_START: u32 = 1_000;
pub const VRAM_END: u32 = 33_009;
pub const AUDIO_START: u32 = 33_010;
pub const AUDIO_END: u32 = 33_143;

pub const MIN_ADDR: u32 = RAM_START;
pub const MAX_ADDR: u32 = AUDIO_END;

/// Backing store size: every addressable byte, including the audio
/// range, is mirrored into RAM (spec.md §4.2 rule 4), so the block must
/// span the whole bus, not just the nominally-"RAM" sub-range.
pub const MEM_SIZE: u32 = AUDIO_END + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ReadInt = 0,
    Write = 1,
    ReadBytes = 2,
}

impl Signal {
    fn from_u8(signal: u8) -> Option<Self> {
        match signal {
            0 => Some(Signal::ReadInt),
            1 => Some(Signal::Write),
            2 => Some(Signal::ReadBytes),
            _ => None,
        }
    }
}

/// What a write to `io` may carry: either an integer to be serialised to
/// its minimum byte width, or an explicit byte sequence.
pub enum WriteValue<'a> {
    Int(u64),
    Bytes(&'a [u8]),
}

impl<'a> From<u64> for WriteValue<'a> {
    fn from(v: u64) -> Self {
        WriteValue::Int(v)
    }
}
impl<'a> From<&'a [u8]> for WriteValue<'a> {
    fn from(v: &'a [u8]) -> Self {
        WriteValue::Bytes(v)
    }
}

pub struct Bus {
    mem: MemBlock,
    pub display: Display,
    pub audio: AudioStub,
}

impl Bus {
    pub fn new(display: Display, audio: AudioStub) -> Self {
        Bus { mem: MemBlock::new(MEM_SIZE, true), display, audio }
    }

    /// Reads `width` bytes at `location` and returns them as a
    /// little-endian `u64`.
    pub fn read_int(&self, location: u32, width: u32) -> FvcResult<u64> {
        self.check_mapped(location)?;
        let bytes = self.mem.read(location, width)?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads `width` raw bytes at `location`.
    pub fn read_bytes(&self, location: u32, width: u32) -> FvcResult<&[u8]> {
        self.check_mapped(location)?;
        Ok(self.mem.read(location, width)?)
    }

    /// Writes a value at `location`, routing it to VRAM/audio as
    /// appropriate, then mirroring it into RAM unconditionally.
    pub fn write<'a>(&mut self, location: u32, value: impl Into<WriteValue<'a>>) -> FvcResult<()> {
        self.check_mapped(location)?;

        let owned;
        let bytes: &[u8] = match value.into() {
            WriteValue::Bytes(b) => b,
            WriteValue::Int(v) => {
                let width = crate::memory::min_byte_width(v);
                owned = v.to_le_bytes();
                &owned[..width]
            }
        };

        if (VRAM_START..=VRAM_END).contains(&location) {
            self.display.write(location - VRAM_START, bytes)?;
        } else if (AUDIO_START..=AUDIO_END).contains(&location) {
            self.audio.write(location - AUDIO_START, bytes);
        } else if !(RAM_START..=RAM_END).contains(&location) {
            return Err(BusError::InvalidMapping(location).into());
        }

        self.mem.write_bytes(location, bytes)?;
        Ok(())
    }

    /// Dispatches a raw `(signal, location, size_or_value)` call exactly
    /// as `bus.io` does in the Python source; prefer the typed
    /// `read_int`/`read_bytes`/`write` methods from Rust call sites, this
    /// exists for parity with the spec's external-interface framing.
    pub fn io_read(&self, signal: u8, location: u32, size: u32) -> FvcResult<u64> {
        match Signal::from_u8(signal) {
            Some(Signal::ReadInt) => self.read_int(location, size),
            Some(Signal::ReadBytes) => {
                let bytes = self.read_bytes(location, size)?;
                let mut buf = [0u8; 8];
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf))
            }
            Some(Signal::Write) => panic!("io_read called with a write signal"),
            None => Err(BusError::UnknownSignal(signal).into()),
        }
    }

    /// Renders the display, reloading its font from RAM first when in
    /// text mode. Mirrors `display.py`, which re-reads the font region
    /// through the bus on every text-mode render rather than caching it.
    pub fn refresh(&mut self) -> FvcResult<()> {
        if self.display.mode() == Mode::Text {
            self.sync_font()?;
        }
        self.display.refresh()
    }

    /// Rebuilds the glyph map from the font region at
    /// `display::FONT_RAM_ADDR`: a 4-byte header (4th byte = glyph count)
    /// followed by that many 9-byte records.
    fn sync_font(&mut self) -> FvcResult<()> {
        let glyph_count = self.read_bytes(display::FONT_RAM_ADDR, 4)?[3] as u32;
        let font_bytes = self.read_bytes(display::FONT_RAM_ADDR, 4 + 9 * glyph_count)?.to_vec();
        self.display.load_font(&font_bytes);
        Ok(())
    }

    /// Mirrors a processor register (OPC/IPT) directly into the backing
    /// block, bypassing the write-floor that would otherwise reject these
    /// low addresses. Not a routing path: VRAM/audio writes never go
    /// through here.
    pub fn poke_register(&mut self, location: u32, bytes: &[u8]) -> FvcResult<()> {
        self.mem.poke(location, bytes)
    }

    fn check_mapped(&self, location: u32) -> FvcResult<()> {
        if location < MIN_ADDR || location > MAX_ADDR {
            return Err(BusError::UnmappedAddress(location).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::AudioStub;
    use crate::display::Display;

    fn test_bus() -> Bus {
        Bus::new(Display::new(), AudioStub::new())
    }

    #[test]
    fn ram_only_write_round_trips() {
        let mut bus = test_bus();
        bus.write(100, 42u64).unwrap();
        assert_eq!(bus.read_int(100, 2).unwrap(), 42);
    }

    #[test]
    fn vram_write_mirrors_into_ram_and_display() {
        let mut bus = test_bus();
        bus.write(VRAM_START + 5, 7u64).unwrap();
        assert_eq!(bus.read_int(VRAM_START + 5, 1).unwrap(), 7);
        assert_eq!(bus.display.colour_region()[5], 7);
    }

    #[test]
    fn audio_write_mirrors_into_ram() {
        let mut bus = test_bus();
        bus.write(AUDIO_START + 3, 9u64).unwrap();
        assert_eq!(bus.read_int(AUDIO_START + 3, 1).unwrap(), 9);
    }

    #[test]
    fn unmapped_address_is_fatal() {
        let bus = test_bus();
        assert!(bus.read_int(MAX_ADDR + 1, 1).is_err());
    }

    #[test]
    fn write_bytes_uses_minimum_width_like_python_to_bytes() {
        let mut bus = test_bus();
        bus.write(200, 300u64).unwrap();
        assert_eq!(bus.read_int(200, 2).unwrap(), 300);
    }

    #[test]
    fn refresh_in_text_mode_reloads_the_font_from_ram() {
        let mut bus = test_bus();
        let mut font = vec![0u8, 0, 0, 1];
        font.push(b'A');
        font.extend_from_slice(&[0xff; 8]);
        bus.write(display::FONT_RAM_ADDR, font.as_slice()).unwrap();
        bus.write(VRAM_START + display::COLOUR_SIZE as u32 + display::TEXT_SIZE as u32 + display::PALETTE_SIZE as u32, 1u64).unwrap();

        bus.refresh().unwrap();

        assert_eq!(bus.display.mode(), Mode::Text);
    }
}
