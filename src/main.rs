//! BIOS monitor: a tiny command loop wrapped around [`fvc::bios`]
//! (grounded in the teacher's termion-driven `Debugger` loop — breakpoints
//! and watches are dropped since nothing here needs them, but the
//! clear-and-redraw step loop survives).

use std::env;
use std::fs;
use std::io::{self, Write};

use termion::{clear, color};

use fvc::bios::{self, BootFiles, Command};
use fvc::{Configuration, Emulator};

fn prompt(text: &str) -> io::Result<String> {
    print!("{}{}{} ", color::Fg(color::Green), text, color::Fg(color::Reset));
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

fn run_repl(mut emu: Emulator) {
    println!(
        "commands: randimg randpal testimg loadprog showgvram showtvram showram \
         showins showpal textmode graphicsmode loadfont clearram quit"
    );

    loop {
        let line = match prompt("?") {
            Ok(l) if l.is_empty() => break, // EOF
            Ok(l) => l,
            Err(_) => break,
        };

        let command = bios::parse_command(&line);
        if matches!(command, Command::Quit) {
            break;
        }

        print!("{}", clear::All);
        let output = if matches!(command, Command::LoadProgram) {
            let path = prompt(" path:").unwrap_or_default();
            bios::load_program(&mut emu, path.trim())
        } else if matches!(command, Command::Unknown) {
            vec!["unknown command".to_string()]
        } else {
            bios::execute(&mut emu, &command)
        };
        for line in output {
            println!("{}", line);
        }

        if let Err(e) = emu.refresh_display() {
            eprintln!("display error: {}", e);
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let files = BootFiles::from_env();
    let font = fs::read(&files.font)
        .map_err(|e| log::warn!("could not read font file {}: {}", files.font, e))
        .ok();

    if args.len() > 1 {
        let mut emu = Emulator::new(Configuration { font, ..Default::default() });
        let bytes = fs::read(&args[1]).unwrap_or_else(|e| {
            eprintln!("could not read {}: {}", args[1], e);
            std::process::exit(1);
        });
        if let Err(e) = emu.load(&bytes) {
            eprintln!("load failed: {}", e);
            std::process::exit(1);
        }
        if let Err(e) = emu.run() {
            eprintln!("runtime error: {}", e);
            std::process::exit(1);
        }
        if let Err(e) = emu.refresh_display() {
            eprintln!("display error: {}", e);
        }
        return;
    }

    let mut emu = Emulator::new(Configuration { font, open_window: false, ..Default::default() });
    if let Err(e) = bios::power_on(&mut emu, &files) {
        eprintln!("power-on failed: {}", e);
        std::process::exit(1);
    }
    run_repl(emu);
}
