//! Unified fatal-error type for every subsystem.
//!
//! Every failure mode named in the spec is fatal to the process; the
//! library itself never exits or panics for these, it returns a
//! `Diagnostic` up through `Result` and leaves exiting to the binaries.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Memory(MemoryError),
    Bus(BusError),
    Display(DisplayError),
    Processor(ProcessorError),
    Assembler(AssemblerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    OutOfBoundsRead { addr: u32 },
    OutOfBoundsWrite { addr: u32 },
    ReadOnly,
    BelowWriteFloor { addr: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    UnknownSignal(u8),
    UnmappedAddress(u32),
    InvalidMapping(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    NegativeWriteLocation,
    UnknownMode(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    UnknownOpcode { opcode: u8, at: u16 },
    UnknownMode { mode: u8 },
    UnknownOutputMode { mode: u8 },
    DivideByZero,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    Syntax { line: String, detail: String },
    Value { line: String, detail: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Memory(e) => write!(f, "Memory message: {}", e),
            Diagnostic::Bus(e) => write!(f, "Bus message: {}", e),
            Diagnostic::Display(e) => write!(f, "Display message: {}", e),
            Diagnostic::Processor(e) => write!(f, "Processor message: {}", e),
            Diagnostic::Assembler(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfBoundsRead { addr } => {
                write!(f, "Out-of-bounds read at address {}", addr)
            }
            MemoryError::OutOfBoundsWrite { addr } => {
                write!(f, "Out-of-bounds write at address {}", addr)
            }
            MemoryError::ReadOnly => write!(f, "Memory is in read-only mode"),
            MemoryError::BelowWriteFloor { addr } => {
                write!(f, "Write to read-only address {}", addr)
            }
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::UnknownSignal(s) => write!(f, "Unknown signal {}", s),
            BusError::UnmappedAddress(a) => write!(f, "Unmapped address {}", a),
            BusError::InvalidMapping(a) => write!(f, "Invalid mapping for address {}", a),
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::NegativeWriteLocation => write!(f, "Negative write location"),
            DisplayError::UnknownMode(m) => write!(f, "Unknown display mode {}", m),
        }
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::UnknownOpcode { opcode, at } => {
                write!(f, "Unknown opcode {} at {} [EXHAUSTED]", opcode, at)
            }
            ProcessorError::UnknownMode { mode } => write!(f, "Unknown parameter mode {}", mode),
            ProcessorError::UnknownOutputMode { mode } => {
                write!(f, "Unknown output mode {}", mode)
            }
            ProcessorError::DivideByZero => write!(f, "Division by zero"),
        }
    }
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblerError::Syntax { line, detail } => {
                write!(f, "Syntax error\n{} at line {}", detail, line)
            }
            AssemblerError::Value { line, detail } => {
                write!(f, "Value error\n{} at line {}", detail, line)
            }
        }
    }
}

impl std::error::Error for Diagnostic {}

impl From<MemoryError> for Diagnostic {
    fn from(e: MemoryError) -> Self {
        Diagnostic::Memory(e)
    }
}
impl From<BusError> for Diagnostic {
    fn from(e: BusError) -> Self {
        Diagnostic::Bus(e)
    }
}
impl From<DisplayError> for Diagnostic {
    fn from(e: DisplayError) -> Self {
        Diagnostic::Display(e)
    }
}
impl From<ProcessorError> for Diagnostic {
    fn from(e: ProcessorError) -> Self {
        Diagnostic::Processor(e)
    }
}
impl From<AssemblerError> for Diagnostic {
    fn from(e: AssemblerError) -> Self {
        Diagnostic::Assembler(e)
    }
}

pub type FvcResult<T> = Result<T, Diagnostic>;
