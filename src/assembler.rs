//! Two-pass line-numbered assembler (grounded in `FVC_Assembly/fvcal_assembler.py`).
//!
//! Pass one walks every line to build a line-number -> address map and
//! reject malformed lines; pass two emits machine code, expanding the
//! high-level `PRINT`/`GOTO`/`GTNUL`/`GTEQL` operators into the raw
//! opcodes from [`crate::processor`] along the way.

use std::collections::HashMap;

use crate::error::{AssemblerError, FvcResult};
use crate::processor::LOAD_ADDRESS;

pub const HEADER: [u8; 4] = [0x39, 0x49, 0x36, 0x03];

/// VRAM offset (relative to the VRAM window) where `PRINT`ed text lands,
/// advanced by each call so consecutive `PRINT`s don't overwrite each other.
const TEXT_CURSOR_BASE: u16 = 0x61A8;

const OP_JMP: u8 = 7;
const OP_JMPNUL: u8 = 8;
const OP_JMPEQL: u8 = 9;
const OP_CPYBLK: u8 = 11;

/// (arity, opcode byte, line-address-map entry width). Entry width is the
/// opcode's parameter-byte count from `processor::parameter_bytes` plus one
/// for the opcode byte itself. `CPYBLK`/`MOVBLK` are reachable only through
/// `PRINT`'s expansion: the source's own table gives them an arity that
/// doesn't match their declared mode count, so there's no working direct
/// syntax for them and none is offered here.
fn op_info(op: &str) -> Option<(usize, u8, u16)> {
    Some(match op {
        "ADD" => (3, 1, 10),
        "MULT" => (3, 2, 10),
        "COPY" => (2, 3, 7),
        "MOVE" => (2, 4, 7),
        "DONE" => (0, 5, 1),
        "META" => (1, 6, 4),
        "JMP" => (1, OP_JMP, 4),
        "JMPNUL" => (2, OP_JMPNUL, 7),
        "JMPEQL" => (3, OP_JMPEQL, 10),
        "ERR" => (0, 10, 1),
        "MOD" => (3, 13, 10),
        "DIV" => (3, 14, 10),
        _ => return None,
    })
}

/// Reserved register names a parameter body may name instead of a literal
/// integer, resolved to their bus addresses.
fn keyword_address(name: &str) -> Option<u16> {
    Some(match name {
        "OPC" => 9,
        "IPT" => 10,
        "PAL" => 12,
        "MOD" => 21,
        _ => return None,
    })
}

fn prefix_mode(c: char) -> Option<u8> {
    Some(match c {
        '#' => 0,
        '$' => 1,
        '%' => 2,
        '^' => 3,
        _ => return None,
    })
}

/// The restricted character set `PRINT 'text` may contain, encoded to the
/// bitmap text mode's codes (`§`/`«` are the control codes, `0-9`, `a-z`,
/// `A-Z` follow in contiguous blocks).
fn encode_text_char(c: char) -> Option<u8> {
    Some(match c {
        '§' => 0x05,
        '«' => 0x0e,
        '0'..='9' => 0x10 + (c as u8 - b'0'),
        'a'..='z' => 0x1a + (c as u8 - b'a'),
        'A'..='Z' => 0x34 + (c as u8 - b'A'),
        ' ' => 0x00,
        _ => return None,
    })
}

struct Line<'s> {
    raw: &'s str,
    op: &'s str,
    params: Vec<&'s str>,
}

fn tokenize(source: &str) -> Vec<(usize, &str, Vec<&str>)> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('/') {
                return None;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.is_empty() {
                None
            } else {
                Some((i, raw, tokens))
            }
        })
        .collect()
}

fn syntax_err(raw: &str, detail: impl Into<String>) -> AssemblerError {
    AssemblerError::Syntax { line: raw.trim().to_string(), detail: detail.into() }
}
fn value_err(raw: &str, detail: impl Into<String>) -> AssemblerError {
    AssemblerError::Value { line: raw.trim().to_string(), detail: detail.into() }
}

fn arity_for(op: &str) -> Option<usize> {
    match op {
        "PRINT" | "GOTO" => Some(1),
        "GTNUL" => Some(2),
        "GTEQL" => Some(3),
        other => op_info(other).map(|(arity, _, _)| arity),
    }
}

fn entry_width_for(op: &str) -> Option<u16> {
    match op {
        "PRINT" => Some(8),
        "GOTO" => Some(4),
        "GTNUL" => Some(7),
        "GTEQL" => Some(10),
        other => op_info(other).map(|(_, _, width)| width),
    }
}

fn validate_param(param: &str, raw: &str) -> FvcResult<()> {
    let mut chars = param.chars();
    let prefix = chars.next().ok_or_else(|| syntax_err(raw, "Empty parameter"))?;
    let body: String = chars.collect();

    if prefix == '\'' {
        return Ok(());
    }
    if prefix_mode(prefix).is_none() {
        return Err(syntax_err(raw, format!("Unprefixed or badly prefixed parameter '{}'", param)).into());
    }
    if body.parse::<i64>().is_ok() || keyword_address(&body).is_some() {
        Ok(())
    } else {
        Err(value_err(raw, format!("Bad parameter value '{}'", body)).into())
    }
}

fn validate_line(number_tok: &str, op: &str, params: &[&str], last_number: i64, raw: &str) -> FvcResult<i64> {
    let number: i64 =
        number_tok.parse().map_err(|_| syntax_err(raw, format!("Bad line number '{}'", number_tok)))?;
    if number <= last_number {
        return Err(value_err(raw, format!("Small or duplicate line number {}", number)).into());
    }

    let arity = arity_for(op).ok_or_else(|| syntax_err(raw, format!("Bad operator '{}'", op)))?;
    if params.len() != arity {
        return Err(syntax_err(raw, format!("'{}' takes {} parameter(s), got {}", op, arity, params.len())).into());
    }
    for p in params {
        validate_param(p, raw)?;
    }
    Ok(number)
}

fn parse_param_value(body: &str) -> Option<u16> {
    body.parse::<u16>().ok().or_else(|| keyword_address(body))
}

/// Assembles line-numbered source into a loadable binary: the four-byte
/// magic header followed by machine code ready to install at
/// [`LOAD_ADDRESS`].
pub fn assemble(source: &str) -> FvcResult<Vec<u8>> {
    let lines = tokenize(source);

    let mut last_number = -1i64;
    let mut line_address_map: HashMap<i64, u16> = HashMap::new();
    let mut address = LOAD_ADDRESS as u16;
    let mut parsed: Vec<Line> = Vec::with_capacity(lines.len());

    for (_, raw, tokens) in &lines {
        let number_tok = tokens[0];
        let op = tokens.get(1).copied().unwrap_or("");
        let params = tokens[2..].to_vec();

        let number = validate_line(number_tok, op, &params, last_number, raw)?;
        last_number = number;

        let width = entry_width_for(op).ok_or_else(|| syntax_err(raw, format!("Bad operator '{}'", op)))?;
        line_address_map.insert(number, address);
        address = address.wrapping_add(width);

        parsed.push(Line { raw, op, params });
    }

    let mut code: Vec<u8> = Vec::new();
    let mut text_cursor: u16 = 0;

    for line in &parsed {
        match line.op {
            "PRINT" => emit_print(line, &mut code, &mut text_cursor)?,
            "GOTO" => emit_goto(line, &line_address_map, &mut code)?,
            "GTNUL" => emit_branch2(line, &line_address_map, OP_JMPNUL, &mut code)?,
            "GTEQL" => emit_branch3(line, &line_address_map, OP_JMPEQL, &mut code)?,
            other => {
                let (arity, opcode, _) = op_info(other).expect("validated above");
                emit_general(line, arity, opcode, &mut code)?;
            }
        }
    }

    let mut binary = Vec::with_capacity(HEADER.len() + code.len());
    binary.extend_from_slice(&HEADER);
    binary.extend_from_slice(&code);
    Ok(binary)
}

fn emit_general(line: &Line, arity: usize, opcode: u8, code: &mut Vec<u8>) -> FvcResult<()> {
    let mut modes = Vec::with_capacity(arity);
    let mut values = Vec::with_capacity(arity);
    for param in &line.params {
        let prefix = param.chars().next().unwrap();
        let body: String = param.chars().skip(1).collect();
        modes.push(prefix_mode(prefix).ok_or_else(|| syntax_err(line.raw, "bad prefix"))?);
        values.push(parse_param_value(&body).ok_or_else(|| value_err(line.raw, "bad parameter value"))?);
    }

    code.push(opcode);
    code.extend_from_slice(&modes);
    for v in values {
        code.extend_from_slice(&v.to_le_bytes());
    }
    Ok(())
}

fn resolve_target(body: &str, map: &HashMap<i64, u16>, raw: &str) -> FvcResult<u16> {
    let number: i64 = body.parse().map_err(|_| value_err(raw, format!("Bad line reference '{}'", body)))?;
    map.get(&number).copied().ok_or_else(|| value_err(raw, format!("Unknown line number {}", number)).into())
}

fn emit_goto(line: &Line, map: &HashMap<i64, u16>, code: &mut Vec<u8>) -> FvcResult<()> {
    let target_body: String = line.params[0].chars().skip(1).collect();
    let target = resolve_target(&target_body, map, line.raw)?;

    code.push(OP_JMP);
    code.push(0);
    code.extend_from_slice(&target.to_le_bytes());
    Ok(())
}

fn emit_branch2(line: &Line, map: &HashMap<i64, u16>, opcode: u8, code: &mut Vec<u8>) -> FvcResult<()> {
    let p1_prefix = line.params[0].chars().next().unwrap();
    let p1_body: String = line.params[0].chars().skip(1).collect();
    let p1_mode = prefix_mode(p1_prefix).ok_or_else(|| syntax_err(line.raw, "bad prefix"))?;
    let p1 = parse_param_value(&p1_body).ok_or_else(|| value_err(line.raw, "bad parameter value"))?;

    let target_body: String = line.params[1].chars().skip(1).collect();
    let target = resolve_target(&target_body, map, line.raw)?;

    code.push(opcode);
    code.push(0);
    code.push(p1_mode);
    code.extend_from_slice(&target.to_le_bytes());
    code.extend_from_slice(&p1.to_le_bytes());
    Ok(())
}

fn emit_branch3(line: &Line, map: &HashMap<i64, u16>, opcode: u8, code: &mut Vec<u8>) -> FvcResult<()> {
    let mut modes = Vec::with_capacity(2);
    let mut values = Vec::with_capacity(2);
    for param in &line.params[..2] {
        let prefix = param.chars().next().unwrap();
        let body: String = param.chars().skip(1).collect();
        modes.push(prefix_mode(prefix).ok_or_else(|| syntax_err(line.raw, "bad prefix"))?);
        values.push(parse_param_value(&body).ok_or_else(|| value_err(line.raw, "bad parameter value"))?);
    }
    let target_body: String = line.params[2].chars().skip(1).collect();
    let target = resolve_target(&target_body, map, line.raw)?;

    code.push(opcode);
    code.push(0);
    code.extend_from_slice(&modes);
    code.extend_from_slice(&target.to_le_bytes());
    for v in values {
        code.extend_from_slice(&v.to_le_bytes());
    }
    Ok(())
}

/// `PRINT 'text` jumps over an inline string literal and copies it into the
/// text VRAM window via `CPYBLK`; `PRINT #addr` copies two bytes straight
/// from an arbitrary address instead, with no inline string to skip over.
fn emit_print(line: &Line, code: &mut Vec<u8>, text_cursor: &mut u16) -> FvcResult<()> {
    let param = line.params[0];
    let mut chars = param.chars();
    let prefix = chars.next().ok_or_else(|| syntax_err(line.raw, "empty PRINT parameter"))?;
    let body: String = chars.collect();

    let vram_dest = TEXT_CURSOR_BASE.wrapping_add(*text_cursor);

    match prefix {
        '\'' => {
            let encoded: Vec<u8> = body
                .chars()
                .map(|c| encode_text_char(c).ok_or_else(|| syntax_err(line.raw, format!("unprintable character '{}'", c))))
                .collect::<FvcResult<_>>()?;
            let strlen = encoded.len() as u16;
            const JMP_WIDTH: u16 = 4;

            // JMP (relative, mode 2) over the inline string bytes that follow;
            // the delta is measured from this JMP's own opcode byte, so it
            // must cover the JMP's own width as well as the string.
            code.push(OP_JMP);
            code.push(2);
            code.extend_from_slice((JMP_WIDTH + strlen).to_le_bytes().as_slice());
            let string_addr = LOAD_ADDRESS as u16 + code.len() as u16;
            code.extend_from_slice(&encoded);

            code.push(OP_CPYBLK);
            code.push(0);
            code.push(0);
            code.push(strlen.min(u8::MAX as u16) as u8);
            code.extend_from_slice(&string_addr.to_le_bytes());
            code.extend_from_slice(&vram_dest.to_le_bytes());

            *text_cursor = text_cursor.wrapping_add(strlen);
        }
        '#' => {
            let source_addr = body.parse::<u16>().map_err(|_| value_err(line.raw, "bad PRINT address"))?;
            code.push(OP_CPYBLK);
            code.push(0);
            code.push(0);
            code.push(2);
            code.extend_from_slice(&source_addr.to_le_bytes());
            code.extend_from_slice(&vram_dest.to_le_bytes());
            *text_cursor = text_cursor.wrapping_add(2);
        }
        _ => return Err(syntax_err(line.raw, "PRINT takes a 'text or #addr parameter").into()),
    }
    Ok(())
}
