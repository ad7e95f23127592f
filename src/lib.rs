//! Library surface: wires the bus, processor, display, and audio stub
//! together into an `Emulator` a binary can load a program into and run
//! (grounded in `lib.rs`'s `Configuration`/`Emulator` pairing).

pub mod assembler;
pub mod bios;
pub mod bus;
pub mod devices;
pub mod display;
pub mod error;
pub mod keyboard;
pub mod loader;
pub mod memory;
pub mod processor;

use log::{info, warn};

use bus::Bus;
use devices::AudioStub;
use display::{self, Display};
use error::FvcResult;
use processor::Processor;

/// Start-up configuration for one machine instance.
pub struct Configuration {
    pub open_window: bool,
    pub window_title: String,
    pub font: Option<Vec<u8>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration { open_window: true, window_title: "FVC".to_string(), font: None }
    }
}

pub struct Emulator {
    pub bus: Bus,
    pub cpu: Processor,
}

impl Emulator {
    pub fn new(config: Configuration) -> Emulator {
        let mut display = Display::new();
        if config.open_window {
            display.open_window(&config.window_title);
        }

        let mut bus = Bus::new(display, AudioStub::new());
        if let Some(font) = &config.font {
            if let Err(e) = bus.write(display::FONT_RAM_ADDR, font.as_slice()) {
                warn!("could not install font: {}", e);
            }
        }

        Emulator { bus, cpu: Processor::new() }
    }

    /// Loads an assembled binary, stripping its magic header if present so
    /// both raw and headered images can be handed to it.
    pub fn load(&mut self, binary: &[u8]) -> FvcResult<()> {
        info!("loading program of {} bytes", loader::strip_header(binary).len());
        loader::install(&mut self.cpu, &mut self.bus, binary)
    }

    /// Runs until a terminating opcode is hit.
    pub fn run(&mut self) -> FvcResult<()> {
        self.cpu.run(&mut self.bus)
    }

    /// Executes one instruction; returns `false` once execution has
    /// terminated.
    pub fn step(&mut self) -> FvcResult<bool> {
        self.cpu.step_once(&mut self.bus)
    }

    pub fn refresh_display(&mut self) -> FvcResult<()> {
        self.bus.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_runs_a_terminating_program() {
        let mut em = Emulator::new(Configuration { open_window: false, ..Default::default() });
        em.load(&[5]).unwrap(); // OP_TERM_OK
        em.run().unwrap();
        assert_eq!(em.cpu.opc(), 5);
    }

    #[test]
    fn load_strips_the_magic_header() {
        let mut em = Emulator::new(Configuration { open_window: false, ..Default::default() });
        let mut binary = assembler::HEADER.to_vec();
        binary.push(5);
        em.load(&binary).unwrap();
        em.run().unwrap();
        assert_eq!(em.cpu.opc(), 5);
    }
}
