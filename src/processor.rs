//! Fetch-decode-execute loop (grounded in `components/processor.py`).
//!
//! `Processor` keeps its instruction pointer and current opcode as plain
//! fields rather than round-tripping them through the bus on every step;
//! both are mirrored into their reserved bus addresses after each step so
//! a caller inspecting memory sees the same values the loop is using.

use log::{debug, error, warn};

use crate::bus::Bus;
use crate::error::{FvcResult, ProcessorError};

/// Address the processor's instruction stream is installed at.
pub const LOAD_ADDRESS: u32 = 32;

/// Reserved register addresses, aliased into ordinary bus memory.
pub const OPC_ADDR: u32 = 9;
pub const IPT_ADDR: u32 = 10;

const OP_NOP: u8 = 0;
const OP_ADD: u8 = 1;
const OP_MULT: u8 = 2;
const OP_COPY: u8 = 3;
const OP_MOVE: u8 = 4;
const OP_TERM_OK: u8 = 5;
const OP_META: u8 = 6;
const OP_JMP: u8 = 7;
const OP_JMPNUL: u8 = 8;
const OP_JMPEQL: u8 = 9;
const OP_TERM_ERR: u8 = 10;
const OP_CPYBLK: u8 = 11;
const OP_MOVBLK: u8 = 12;
const OP_MOD: u8 = 13;
const OP_DIV: u8 = 14;

/// Bytes following the opcode byte, per instruction. `-1` marks
/// terminating opcodes, whose width doesn't matter since the loop exits.
fn parameter_bytes(opcode: u8) -> FvcResult<i32> {
    Ok(match opcode {
        OP_NOP => 0,
        OP_ADD | OP_MULT | OP_MOD | OP_DIV => 9,
        OP_COPY | OP_MOVE => 6,
        OP_TERM_OK => -1,
        OP_META => 3,
        OP_JMP => 3,
        OP_JMPNUL => 6,
        OP_JMPEQL => 9,
        OP_TERM_ERR => -1,
        OP_CPYBLK | OP_MOVBLK => 7,
        _ => return Err(ProcessorError::UnknownOpcode { opcode, at: 0 }.into()),
    })
}

fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        OP_NOP => "NOP",
        OP_ADD => "ADD",
        OP_MULT => "MULT",
        OP_COPY => "COPY",
        OP_MOVE => "MOVE",
        OP_TERM_OK => "DONE",
        OP_META => "META",
        OP_JMP => "JMP",
        OP_JMPNUL => "JMPNUL",
        OP_JMPEQL => "JMPEQL",
        OP_TERM_ERR => "ERR",
        OP_CPYBLK => "CPYBLK",
        OP_MOVBLK => "MOVBLK",
        OP_MOD => "MOD",
        OP_DIV => "DIV",
        _ => "???",
    }
}

/// Renders the instruction at `addr` as a mnemonic plus its raw parameter
/// bytes, for the BIOS's single-step display.
pub fn disassemble_at(bus: &Bus, addr: u32) -> FvcResult<String> {
    let opcode = bus.read_int(addr, 1)? as u8;
    let name = opcode_name(opcode);
    let param_bytes = parameter_bytes(opcode)?;
    if param_bytes <= 0 {
        return Ok(name.to_string());
    }
    let params = bus.read_bytes(addr + 1, param_bytes as u32)?;
    Ok(format!("{} {:02x?}", name, params))
}

pub struct Processor {
    ipt: u16,
    opc: u8,
}

impl Processor {
    pub fn new() -> Self {
        Processor { ipt: LOAD_ADDRESS as u16, opc: 0 }
    }

    pub fn ipt(&self) -> u16 {
        self.ipt
    }

    pub fn opc(&self) -> u8 {
        self.opc
    }

    /// Copies `program` into RAM starting at [`LOAD_ADDRESS`] and points
    /// IPT at it.
    pub fn load(&mut self, bus: &mut Bus, program: &[u8]) -> FvcResult<()> {
        for (i, &byte) in program.iter().enumerate() {
            bus.write(LOAD_ADDRESS + i as u32, &[byte][..])?;
        }
        debug!("loaded program of size {}", program.len());

        self.ipt = LOAD_ADDRESS as u16;
        self.opc = 0;
        self.mirror(bus)?;
        Ok(())
    }

    /// Runs until a terminating opcode is hit.
    pub fn run(&mut self, bus: &mut Bus) -> FvcResult<()> {
        loop {
            if !self.step(bus)? {
                return Ok(());
            }
        }
    }

    /// Executes one instruction. Returns `Ok(false)` once a terminating
    /// opcode has run. Public wrapper used by single-step debugging UIs.
    pub fn step_once(&mut self, bus: &mut Bus) -> FvcResult<bool> {
        self.step(bus)
    }

    /// Executes one instruction. Returns `Ok(false)` once a terminating
    /// opcode has run.
    fn step(&mut self, bus: &mut Bus) -> FvcResult<bool> {
        let ipt = self.ipt as u32;
        let opcode = bus.read_int(ipt, 1)? as u8;
        self.opc = opcode;

        if opcode as usize >= 15 {
            return Err(ProcessorError::UnknownOpcode { opcode, at: self.ipt }.into());
        }
        let param_bytes = parameter_bytes(opcode)?;

        match opcode {
            OP_NOP => {}
            OP_ADD => self.exec_arith(bus, ipt, |a, b| a.wrapping_add(b))?,
            OP_MULT => self.exec_arith(bus, ipt, |a, b| a.wrapping_mul(b))?,
            OP_MOD => self.exec_checked_arith(bus, ipt, |a, b| a.checked_rem(b))?,
            OP_DIV => self.exec_checked_arith(bus, ipt, |a, b| a.checked_div(b))?,
            OP_COPY => self.exec_copy_or_move(bus, ipt, false)?,
            OP_MOVE => self.exec_copy_or_move(bus, ipt, true)?,
            OP_TERM_OK => {
                self.opc = 5;
                self.mirror(bus)?;
                return Ok(false);
            }
            OP_META => self.exec_meta(bus, ipt)?,
            OP_JMP => self.exec_jmp(bus, ipt, param_bytes)?,
            OP_JMPNUL => self.exec_jmpnul(bus, ipt, param_bytes)?,
            OP_JMPEQL => self.exec_jmpeql(bus, ipt, param_bytes)?,
            OP_TERM_ERR => {
                error!("program terminated with error at {}", self.ipt);
                self.opc = 5;
                self.mirror(bus)?;
                return Ok(false);
            }
            OP_CPYBLK => self.exec_blk(bus, ipt)?,
            OP_MOVBLK => {
                warn!("MOVBLK at {} is unimplemented, treating as no-op", self.ipt);
            }
            _ => unreachable!("opcode range already checked"),
        }

        if param_bytes >= 0 {
            self.ipt = self.ipt.wrapping_add(1 + param_bytes as u16);
        }
        self.mirror(bus)?;
        Ok(true)
    }

    fn mirror(&self, bus: &mut Bus) -> FvcResult<()> {
        bus.poke_register(OPC_ADDR, &[self.opc])?;
        bus.poke_register(IPT_ADDR, &self.ipt.to_le_bytes())?;
        Ok(())
    }

    fn read_operand(&self, bus: &Bus, addr: u32, mode: u8) -> FvcResult<u16> {
        match mode {
            0 => Ok(bus.read_int(addr, 2)? as u16),
            1 => {
                let ptr = bus.read_int(addr, 2)? as u32;
                Ok(bus.read_int(ptr, 2)? as u16)
            }
            _ => Err(ProcessorError::UnknownMode { mode }.into()),
        }
    }

    fn write_operand(&self, bus: &mut Bus, addr: u32, mode: u8, value: u16) -> FvcResult<()> {
        match mode {
            0 => {
                let out = bus.read_int(addr, 2)? as u32;
                bus.write(out, u64::from(value))
            }
            1 => {
                let a_out = bus.read_int(addr, 2)? as u32;
                let out = bus.read_int(a_out, 2)? as u32;
                bus.write(out, u64::from(value))
            }
            _ => Err(ProcessorError::UnknownOutputMode { mode }.into()),
        }
    }

    fn exec_arith(&self, bus: &mut Bus, ipt: u32, op: impl Fn(u16, u16) -> u16) -> FvcResult<()> {
        let p1_mode = bus.read_int(ipt + 1, 1)? as u8;
        let p2_mode = bus.read_int(ipt + 2, 1)? as u8;
        let o_mode = bus.read_int(ipt + 3, 1)? as u8;

        let p1 = self.read_operand(bus, ipt + 4, p1_mode)?;
        let p2 = self.read_operand(bus, ipt + 6, p2_mode)?;
        self.write_operand(bus, ipt + 8, o_mode, op(p1, p2))
    }

    fn exec_checked_arith(
        &self,
        bus: &mut Bus,
        ipt: u32,
        op: impl Fn(u16, u16) -> Option<u16>,
    ) -> FvcResult<()> {
        let p1_mode = bus.read_int(ipt + 1, 1)? as u8;
        let p2_mode = bus.read_int(ipt + 2, 1)? as u8;
        let o_mode = bus.read_int(ipt + 3, 1)? as u8;

        let p1 = self.read_operand(bus, ipt + 4, p1_mode)?;
        let p2 = self.read_operand(bus, ipt + 6, p2_mode)?;
        let result = op(p1, p2).ok_or(ProcessorError::DivideByZero)?;
        self.write_operand(bus, ipt + 8, o_mode, result)
    }

    fn exec_copy_or_move(&self, bus: &mut Bus, ipt: u32, is_move: bool) -> FvcResult<()> {
        let i_mode = bus.read_int(ipt + 1, 1)? as u8;
        let o_mode = bus.read_int(ipt + 2, 1)? as u8;

        let value = if !is_move {
            self.read_operand(bus, ipt + 3, i_mode)?
        } else {
            match i_mode {
                0 => {
                    let a_p1 = bus.read_int(ipt + 3, 2)? as u32;
                    let value = bus.read_int(a_p1, 2)? as u16;
                    bus.write(a_p1, 0u64)?;
                    value
                }
                1 => {
                    let aa_p1 = bus.read_int(ipt + 3, 2)? as u32;
                    let a_p1 = bus.read_int(aa_p1, 2)? as u32;
                    let value = bus.read_int(a_p1, 2)? as u16;
                    bus.write(a_p1, 0u64)?;
                    value
                }
                _ => return Err(ProcessorError::UnknownMode { mode: i_mode }.into()),
            }
        };

        self.write_operand(bus, ipt + 5, o_mode, value)
    }

    fn exec_meta(&self, bus: &Bus, ipt: u32) -> FvcResult<()> {
        let i_mode = bus.read_int(ipt + 1, 1)? as u8;
        let value = self.read_operand(bus, ipt + 2, i_mode)?;
        debug!("META: {}", value);
        Ok(())
    }

    fn decode_jump_delta(&self, bus: &Bus, ipt: u32, offset: u32, mode: u8) -> FvcResult<u16> {
        match mode {
            0 | 2 => Ok(bus.read_int(ipt + offset, 2)? as u16),
            1 | 3 => {
                let ptr = bus.read_int(ipt + offset, 2)? as u32;
                Ok(bus.read_int(ptr, 2)? as u16)
            }
            _ => Err(ProcessorError::UnknownMode { mode }.into()),
        }
    }

    /// Resolves a jump's `target`, then returns the IPT value to store so
    /// that the loop's own post-step advance lands execution exactly on
    /// `target`.
    fn jump_ipt(&self, jmp_mode: u8, delta: u16, param_bytes: i32) -> u16 {
        let target = match jmp_mode {
            0 | 1 => delta,
            _ => self.ipt.wrapping_add(delta),
        };
        target.wrapping_sub(param_bytes as u16).wrapping_sub(1)
    }

    fn exec_jmp(&mut self, bus: &mut Bus, ipt: u32, param_bytes: i32) -> FvcResult<()> {
        let jmp_mode = bus.read_int(ipt + 1, 1)? as u8;
        let delta = self.decode_jump_delta(bus, ipt, 2, jmp_mode)?;
        self.ipt = self.jump_ipt(jmp_mode, delta, param_bytes);
        Ok(())
    }

    fn exec_jmpnul(&mut self, bus: &mut Bus, ipt: u32, param_bytes: i32) -> FvcResult<()> {
        let jmp_mode = bus.read_int(ipt + 1, 1)? as u8;
        let p1_mode = bus.read_int(ipt + 2, 1)? as u8;
        let delta = self.decode_jump_delta(bus, ipt, 3, jmp_mode)?;
        let p1 = self.read_operand(bus, ipt + 5, p1_mode)?;

        if p1 == 0 {
            self.ipt = self.jump_ipt(jmp_mode, delta, param_bytes);
        }
        Ok(())
    }

    fn exec_jmpeql(&mut self, bus: &mut Bus, ipt: u32, param_bytes: i32) -> FvcResult<()> {
        let jmp_mode = bus.read_int(ipt + 1, 1)? as u8;
        let p1_mode = bus.read_int(ipt + 2, 1)? as u8;
        let p2_mode = bus.read_int(ipt + 3, 1)? as u8;
        let delta = self.decode_jump_delta(bus, ipt, 4, jmp_mode)?;
        let p1 = self.read_operand(bus, ipt + 6, p1_mode)?;
        let p2 = self.read_operand(bus, ipt + 8, p2_mode)?;

        if p1 == p2 {
            self.ipt = self.jump_ipt(jmp_mode, delta, param_bytes);
        }
        Ok(())
    }

    fn exec_blk(&self, bus: &mut Bus, ipt: u32) -> FvcResult<()> {
        let i_mode = bus.read_int(ipt + 1, 1)? as u8;
        let o_mode = bus.read_int(ipt + 2, 1)? as u8;
        let size = bus.read_int(ipt + 3, 1)? as u32;

        let source_addr = match i_mode {
            0 => bus.read_int(ipt + 4, 2)? as u32,
            1 => {
                let indirect = bus.read_int(ipt + 4, 2)? as u32;
                bus.read_int(indirect, 2)? as u32
            }
            _ => return Err(ProcessorError::UnknownMode { mode: i_mode }.into()),
        };
        let value = bus.read_bytes(source_addr, size.max(1))?.to_vec();

        match o_mode {
            0 => {
                let out = bus.read_int(ipt + 6, 2)? as u32;
                bus.write(out, &value[..])
            }
            1 => {
                let a_out = bus.read_int(ipt + 6, 2)? as u32;
                let out = bus.read_int(a_out, 2)? as u32;
                bus.write(out, &value[..])
            }
            _ => Err(ProcessorError::UnknownOutputMode { mode: o_mode }.into()),
        }
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

    fn assemble_add(p1_mode: u8, p2_mode: u8, o_mode: u8, p1: u16, p2: u16, out: u16) -> Vec<u8> {
        let mut v = vec![OP_ADD, p1_mode, p2_mode, o_mode];
        v.extend_from_slice(&p1.to_le_bytes());
        v.extend_from_slice(&p2.to_le_bytes());
        v.extend_from_slice(&out.to_le_bytes());
        v
    }

    #[test]
    fn add_direct_writes_sum() {
        let mut bus = test_bus();
        let mut program = assemble_add(0, 0, 0, 2, 3, 100);
        program.push(OP_TERM_OK);
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(bus.read_int(100, 2).unwrap(), 5);
    }

    #[test]
    fn add_pointer_mode_dereferences_operands() {
        let mut bus = test_bus();
        bus.write(200, 7u64).unwrap();
        bus.write(202, 8u64).unwrap();
        let mut program = assemble_add(1, 1, 0, 200, 202, 300);
        program.push(OP_TERM_OK);
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(bus.read_int(300, 2).unwrap(), 15);
    }

    #[test]
    fn jump_skips_intervening_instruction() {
        let mut bus = test_bus();
        // layout: ADD #1 #1 #100 (10 bytes) ; JMP to the DONE instruction ; ADD #9 #9 #100 (skipped) ; TERM_OK
        let add1 = assemble_add(0, 0, 0, 1, 1, 100);
        let add2 = assemble_add(0, 0, 0, 9, 9, 100);
        let jmp_len = 4u16;
        let target = LOAD_ADDRESS as u16 + add1.len() as u16 + jmp_len + add2.len() as u16;

        let mut program = add1;
        program.push(OP_JMP);
        program.push(0);
        program.extend_from_slice(&target.to_le_bytes());
        program.extend_from_slice(&add2);
        program.push(OP_TERM_OK);

        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(bus.read_int(100, 2).unwrap(), 2);
    }

    #[test]
    fn jmpnul_takes_branch_when_zero() {
        let mut bus = test_bus();
        let add_never = assemble_add(0, 0, 0, 5, 5, 102);
        let jmpnul_len = 7u16;
        let target = LOAD_ADDRESS as u16 + jmpnul_len + add_never.len() as u16;

        let mut program = vec![OP_JMPNUL, 0, 0];
        program.extend_from_slice(&target.to_le_bytes());
        program.extend_from_slice(&0u16.to_le_bytes());
        program.extend_from_slice(&add_never);
        program.push(OP_TERM_OK);

        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(bus.read_int(102, 2).unwrap(), 0);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut bus = test_bus();
        let mut program = vec![OP_DIV, 0, 0, 0];
        program.extend_from_slice(&10u16.to_le_bytes());
        program.extend_from_slice(&0u16.to_le_bytes());
        program.extend_from_slice(&100u16.to_le_bytes());
        program.push(OP_TERM_OK);

        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        assert!(cpu.run(&mut bus).is_err());
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut bus = test_bus();
        let program = vec![200u8];
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        assert!(cpu.run(&mut bus).is_err());
    }

    #[test]
    fn movblk_is_a_logged_no_op() {
        let mut bus = test_bus();
        let program = vec![OP_MOVBLK, OP_TERM_OK];
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(cpu.opc(), 5);
    }

    #[test]
    fn disassemble_reports_mnemonic_and_operands() {
        let mut bus = test_bus();
        let program = assemble_add(0, 0, 0, 2, 3, 100);
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        let text = disassemble_at(&bus, LOAD_ADDRESS).unwrap();
        assert!(text.starts_with("ADD"));
    }

    #[test]
    fn opc_and_ipt_mirror_into_reserved_bus_addresses() {
        let mut bus = test_bus();
        let program = vec![OP_TERM_OK];
        let mut cpu = Processor::new();
        cpu.load(&mut bus, &program).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(bus.read_int(OPC_ADDR, 1).unwrap() as u8, cpu.opc());
        assert_eq!(bus.read_int(IPT_ADDR, 2).unwrap() as u16, cpu.ipt());
    }
}
