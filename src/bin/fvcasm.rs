//! Standalone assembler binary (grounded in `FVC_Assembly/fvcal_assembler.py`'s
//! `get_input`: exactly two path arguments, source then destination).

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} <source.fvcal> <output.bin>", args.first().map(String::as_str).unwrap_or("fvcasm"));
        return ExitCode::FAILURE;
    }

    let source_path = Path::new(&args[1]);
    if !source_path.exists() {
        eprintln!("source file does not exist: {}", args[1]);
        return ExitCode::FAILURE;
    }

    let source = match fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("could not read {}: {}", args[1], e);
            return ExitCode::FAILURE;
        }
    };

    match fvc::assembler::assemble(&source) {
        Ok(binary) => match fs::write(&args[2], &binary) {
            Ok(()) => {
                println!("assembled {} -> {} ({} bytes)", args[1], args[2], binary.len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("could not write {}: {}", args[2], e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
