//! BIOS command loop: parsing and dispatch live here so they're testable
//! without a terminal; `src/main.rs` only owns the stdin prompt and the
//! termion-driven screen redraw.
//!
//! Grounded in `computer_interface.py`'s `await_input` loop: every command
//! but `loadprog` pokes RAM/VRAM directly through the bus, and the caller
//! refreshes the display once after each command (mirroring the trailing
//! `refresh_display()` call after every branch of the Python loop).

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::warn;

use crate::assembler::HEADER;
use crate::bus;
use crate::display;
use crate::error::FvcResult;
use crate::processor;
use crate::Emulator;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    RandomImage,
    RandomPalette,
    TestImage,
    LoadProgram,
    ShowColourVram,
    ShowTextVram,
    ShowRam,
    ShowInstruction,
    ShowPalette,
    TextMode,
    GraphicsMode,
    LoadFont,
    ClearRam,
    Quit,
    Unknown,
}

pub fn parse_command(line: &str) -> Command {
    match line.trim() {
        "randimg" => Command::RandomImage,
        "randpal" => Command::RandomPalette,
        "testimg" => Command::TestImage,
        "loadprog" => Command::LoadProgram,
        "showgvram" => Command::ShowColourVram,
        "showtvram" => Command::ShowTextVram,
        "showram" => Command::ShowRam,
        "showins" => Command::ShowInstruction,
        "showpal" => Command::ShowPalette,
        "textmode" => Command::TextMode,
        "graphicsmode" => Command::GraphicsMode,
        "loadfont" => Command::LoadFont,
        "clearram" => Command::ClearRam,
        "quit" => Command::Quit,
        _ => Command::Unknown,
    }
}

/// Palette register region starts right after colour and text VRAM.
fn palette_addr() -> u32 {
    bus::VRAM_START + display::COLOUR_SIZE as u32 + display::TEXT_SIZE as u32
}

fn mode_addr() -> u32 {
    palette_addr() + display::PALETTE_SIZE as u32
}

fn format_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(" ")
}

/// Runs one command against `emu`, returning the lines it wants printed.
/// `LoadProgram` is handled separately by the caller, since it needs an
/// interactively-prompted path; `Quit` is reported but not acted on here.
pub fn execute(emu: &mut Emulator, command: &Command) -> Vec<String> {
    let result: FvcResult<Vec<String>> = match command {
        Command::RandomImage => {
            let bytes: Vec<u8> = (0..display::COLOUR_SIZE).map(|_| rand::random()).collect();
            emu.bus.write(bus::VRAM_START, bytes.as_slice()).map(|()| vec![])
        }
        Command::RandomPalette => {
            let bytes: Vec<u8> = (0..display::PALETTE_SIZE).map(|_| rand::random()).collect();
            emu.bus.write(palette_addr(), bytes.as_slice()).map(|()| vec![])
        }
        Command::TestImage => {
            let bound = display::COLOUR_SIZE as u64;
            let bytes: Vec<u8> = (0..bound).map(|i| (i * 255 / bound) as u8).collect();
            emu.bus.write(bus::VRAM_START, bytes.as_slice()).map(|()| vec![])
        }
        Command::ShowColourVram => {
            // Faithfully reproduces the source's own bound arithmetic:
            // `colour_bound - ram_bound`, not the full colour region length.
            let len = display::COLOUR_SIZE as u32 - bus::VRAM_START;
            emu.bus.read_bytes(bus::VRAM_START, len).map(|b| vec![format_bytes(b)])
        }
        Command::ShowTextVram => {
            let addr = bus::VRAM_START + display::COLOUR_SIZE as u32;
            emu.bus.read_bytes(addr, display::TEXT_SIZE as u32).map(|b| vec![format_bytes(b)])
        }
        Command::ShowRam => emu
            .bus
            .read_bytes(0, bus::VRAM_START)
            .map(|b| vec![format_bytes(b)]),
        Command::ShowInstruction => {
            processor::disassemble_at(&emu.bus, emu.cpu.ipt() as u32).map(|s| vec![s])
        }
        Command::ShowPalette => emu
            .bus
            .read_bytes(palette_addr(), display::PALETTE_SIZE as u32)
            .map(|b| vec![format_bytes(b)]),
        Command::TextMode => emu.bus.write(mode_addr(), 1u64).map(|()| vec![]),
        Command::GraphicsMode => emu.bus.write(mode_addr(), 0u64).map(|()| vec![]),
        Command::LoadFont => {
            let files = BootFiles::from_env();
            match fs::read(&files.font) {
                Ok(bytes) => emu
                    .bus
                    .write(display::FONT_RAM_ADDR, bytes.as_slice())
                    .map(|()| vec![]),
                Err(e) => Ok(vec![format!("could not read font {}: {}", files.font, e)]),
            }
        }
        Command::ClearRam => {
            // Everything but the first 32 reserved bytes and VRAM; leaves
            // address 999 (the byte just below VRAM) untouched too.
            let len = (bus::VRAM_START - 1 - 32) as usize;
            emu.bus.write(32, vec![0u8; len].as_slice()).map(|()| vec![])
        }
        Command::LoadProgram | Command::Quit | Command::Unknown => Ok(vec![]),
    };

    match result {
        Ok(lines) => lines,
        Err(e) => vec![format!("error: {}", e)],
    }
}

/// Prompts the caller has already gathered a path for; reads, validates the
/// magic header, strips it, and hands the program to the processor. This is
/// the only command that reaches the processor rather than poking the bus
/// directly.
pub fn load_program(emu: &mut Emulator, path: &str) -> Vec<String> {
    if !Path::new(path).is_file() {
        return vec!["BIOS message: File not found".to_string()];
    }
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return vec![format!("could not read {}: {}", path, e)],
    };
    if bytes.len() < 4 || bytes[..3] != HEADER[..3] {
        return vec!["BIOS message: Bad header".to_string()];
    }

    if let Err(e) = emu.cpu.load(&mut emu.bus, &bytes[4..]) {
        return vec![format!("load failed: {}", e)];
    }
    match emu.run() {
        Ok(()) => vec!["program terminated".to_string()],
        Err(e) => vec![format!("runtime error: {}", e)],
    }
}

/// Default boot file locations, overridable by environment variable.
pub struct BootFiles {
    pub palette: String,
    pub boot_image: String,
    pub font: String,
}

impl BootFiles {
    pub fn from_env() -> Self {
        BootFiles {
            palette: std::env::var("FVC_PALETTE")
                .unwrap_or_else(|_| "files/default_palette.txt".to_string()),
            boot_image: std::env::var("FVC_BOOT_IMAGE")
                .unwrap_or_else(|_| "files/boot_img.txt".to_string()),
            font: std::env::var("FVC_FONT").unwrap_or_else(|_| "files/font2.bgt".to_string()),
        }
    }
}

/// Loads the default palette and boot image, then refreshes the display
/// once before the command loop starts. A missing file is logged and
/// leaves its region zeroed rather than failing the boot.
pub fn power_on(emu: &mut Emulator, files: &BootFiles) -> FvcResult<()> {
    println!("BIOS message: Booting...");
    load_default_palette(emu, &files.palette);
    load_boot_image(emu, &files.boot_image);
    emu.refresh_display()
}

fn load_default_palette(emu: &mut Emulator, path: &str) {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!("could not read palette file {}: {}", path, e);
            return;
        }
    };

    let mut bytes = [0u8; display::PALETTE_SIZE];
    for (i, line) in text.lines().take(display::PALETTE_SIZE).enumerate() {
        match u8::from_str_radix(line.trim(), 2) {
            Ok(v) => bytes[i] = v,
            Err(_) => warn!("palette file {} line {} is not an 8-bit binary number", path, i + 1),
        }
    }

    if let Err(e) = emu.bus.write(palette_addr(), &bytes[..]) {
        warn!("could not install default palette: {}", e);
    }
}

fn load_boot_image(emu: &mut Emulator, path: &str) {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!("could not read boot image file {}: {}", path, e);
            return;
        }
    };

    let lit: HashSet<usize> = text.lines().filter_map(|l| l.trim().parse().ok()).collect();

    let pixel_count = display::WIDTH * display::HEIGHT;
    let mut bits = Vec::with_capacity(pixel_count * 3);
    for i in 0..pixel_count {
        let set = lit.contains(&i);
        bits.push(0);
        bits.push(0);
        bits.push(if set { 1 } else { 0 });
    }

    let mut bytes = Vec::with_capacity(display::COLOUR_SIZE);
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for &bit in chunk {
            byte = (byte << 1) | bit;
        }
        byte <<= 8 - chunk.len();
        bytes.push(byte);
    }

    if let Err(e) = emu.bus.write(bus::VRAM_START, bytes.as_slice()) {
        warn!("could not install boot image: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configuration;

    fn test_emu() -> Emulator {
        Emulator::new(Configuration { open_window: false, ..Default::default() })
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command("randimg"), Command::RandomImage);
        assert_eq!(parse_command("loadprog"), Command::LoadProgram);
        assert_eq!(parse_command("showins"), Command::ShowInstruction);
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("gibberish"), Command::Unknown);
    }

    #[test]
    fn randimg_fills_colour_region_without_error() {
        let mut emu = test_emu();
        let out = execute(&mut emu, &Command::RandomImage);
        assert!(out.is_empty());
    }

    #[test]
    fn testimg_writes_a_gradient() {
        let mut emu = test_emu();
        execute(&mut emu, &Command::TestImage);
        assert_eq!(emu.bus.display.colour_region()[0], 0);
    }

    #[test]
    fn textmode_then_graphicsmode_round_trip_the_mode_register() {
        let mut emu = test_emu();
        execute(&mut emu, &Command::TextMode);
        assert_eq!(emu.bus.display.mode(), display::Mode::Text);
        execute(&mut emu, &Command::GraphicsMode);
        assert_eq!(emu.bus.display.mode(), display::Mode::Graphics);
    }

    #[test]
    fn clearram_zeroes_program_memory_but_not_the_reserved_header() {
        let mut emu = test_emu();
        emu.bus.write(40, 7u64).unwrap();
        execute(&mut emu, &Command::ClearRam);
        assert_eq!(emu.bus.read_int(40, 1).unwrap(), 0);
    }

    #[test]
    fn load_program_rejects_a_missing_file() {
        let mut emu = test_emu();
        let out = load_program(&mut emu, "/nonexistent/path/to/a/program.bin");
        assert_eq!(out, vec!["BIOS message: File not found".to_string()]);
    }

    #[test]
    fn load_program_rejects_a_bad_header() {
        let mut emu = test_emu();
        let dir = std::env::temp_dir();
        let path = dir.join("fvc_bios_test_bad_header.bin");
        fs::write(&path, [0, 0, 0, 0, 5]).unwrap();
        let out = load_program(&mut emu, path.to_str().unwrap());
        let _ = fs::remove_file(&path);
        assert_eq!(out, vec!["BIOS message: Bad header".to_string()]);
    }

    #[test]
    fn load_program_runs_a_valid_image_to_completion() {
        let mut emu = test_emu();
        let dir = std::env::temp_dir();
        let path = dir.join("fvc_bios_test_valid.bin");
        let mut binary = HEADER.to_vec();
        binary.push(5); // OP_TERM_OK
        fs::write(&path, &binary).unwrap();
        let out = load_program(&mut emu, path.to_str().unwrap());
        let _ = fs::remove_file(&path);
        assert_eq!(out, vec!["program terminated".to_string()]);
        assert_eq!(emu.cpu.opc(), 5);
    }

    #[test]
    fn power_on_tolerates_missing_boot_files() {
        let mut emu = test_emu();
        let files = BootFiles {
            palette: "/nonexistent/palette.txt".to_string(),
            boot_image: "/nonexistent/boot.txt".to_string(),
            font: "/nonexistent/font.bgt".to_string(),
        };
        power_on(&mut emu, &files).unwrap();
    }

    #[test]
    fn power_on_loads_palette_and_boot_image_from_disk() {
        let mut emu = test_emu();
        let dir = std::env::temp_dir();
        let palette_path = dir.join("fvc_bios_test_palette.txt");
        let boot_path = dir.join("fvc_bios_test_boot.txt");
        fs::write(&palette_path, "11100100\n00011011\n00000000\n00000000\n00000000\n00000000\n00000000\n00000000").unwrap();
        fs::write(&boot_path, "0\n1\n2").unwrap();

        let files = BootFiles {
            palette: palette_path.to_str().unwrap().to_string(),
            boot_image: boot_path.to_str().unwrap().to_string(),
            font: "/nonexistent/font.bgt".to_string(),
        };
        power_on(&mut emu, &files).unwrap();

        let _ = fs::remove_file(&palette_path);
        let _ = fs::remove_file(&boot_path);

        assert_eq!(emu.bus.read_int(palette_addr(), 1).unwrap(), 0b11100100);
        assert_eq!(emu.bus.display.colour_region()[0], 0b001_001_00);
    }
}
