//! Bytecode disassembler, behind the CLI's `-d` flag.

use std::fmt::Write as _;

use core_types::{Chunk, Function, FunctionKind, Value};

use crate::const_table::ConstTable;
use crate::opcode::{OpCode, OperandLayout};
use crate::program::Program;

/// Renders a full program listing: the constant table, the main function,
/// and every script-function constant.
pub fn disassemble_program(program: &Program) -> String {
    let mut out = String::new();
    out.push_str("=== constants ===\n");
    for (idx, value) in program.constants.entries().iter().enumerate() {
        let _ = writeln!(out, "  [{:>3}] {}", idx, describe_constant(value));
    }
    out.push_str("=== main ===\n");
    if let FunctionKind::Script(script) = program.main.kind() {
        out.push_str(&disassemble_chunk(&script.chunk, &program.constants));
    }
    for value in program.constants.entries() {
        if let Value::Function(func) = value {
            if let FunctionKind::Script(script) = func.kind() {
                let _ = writeln!(
                    out,
                    "=== function {}({}) ===",
                    func.name(),
                    script.arg_names.join(", ")
                );
                out.push_str(&disassemble_chunk(&script.chunk, &program.constants));
            }
        }
    }
    out
}

/// Renders one chunk, one instruction per line.
pub fn disassemble_chunk(chunk: &Chunk, constants: &ConstTable) -> String {
    let mut out = String::new();
    let mut offset = 0;
    while offset < chunk.code.len() {
        match decode_instruction(&chunk.code, offset, constants) {
            Ok((text, next)) => {
                let _ = writeln!(out, "  {:04x}  {}", offset, text);
                offset = next;
            }
            Err(msg) => {
                let _ = writeln!(out, "  {:04x}  <{}>", offset, msg);
                break;
            }
        }
    }
    out
}

/// Decodes the instruction at `offset`; returns its rendering and the
/// offset of the following instruction.
pub fn decode_instruction(
    code: &[u8],
    offset: usize,
    constants: &ConstTable,
) -> Result<(String, usize), String> {
    let byte = *code.get(offset).ok_or("offset out of range")?;
    let op = OpCode::try_from(byte).map_err(|_| format!("bad opcode 0x{:02x}", byte))?;
    let mut next = offset + 1;
    let text = match op.operands() {
        OperandLayout::None => op.mnemonic().to_string(),
        OperandLayout::U32 => {
            let operand = read_u32(code, next)?;
            next += 4;
            match op {
                OpCode::Const
                | OpCode::DeclVar
                | OpCode::DeclLet
                | OpCode::DeclConst
                | OpCode::GetVar
                | OpCode::SetVar => {
                    let described = constants
                        .get(operand as usize)
                        .map(describe_constant)
                        .unwrap_or_else(|| "<bad index>".to_string());
                    format!("{} {} ; {}", op.mnemonic(), operand, described)
                }
                _ => format!("{} {}", op.mnemonic(), operand),
            }
        }
        OperandLayout::I32 => {
            let operand = read_u32(code, next)? as i32;
            next += 4;
            format!("{} {}", op.mnemonic(), operand)
        }
        OperandLayout::FourU8 => {
            let a = *code.get(next).ok_or("truncated operand")?;
            let b = *code.get(next + 1).ok_or("truncated operand")?;
            let c = *code.get(next + 2).ok_or("truncated operand")?;
            let d = *code.get(next + 3).ok_or("truncated operand")?;
            next += 4;
            format!("{} {},{},{},{}", op.mnemonic(), a, b, c, d)
        }
        OperandLayout::U32U8 => {
            let target = read_u32(code, next)?;
            next += 4;
            let scopes = *code.get(next).ok_or("truncated operand")?;
            next += 1;
            format!("{} {},{}", op.mnemonic(), target, scopes)
        }
    };
    Ok((text, next))
}

fn read_u32(code: &[u8], offset: usize) -> Result<u32, String> {
    let slice = code
        .get(offset..offset + 4)
        .ok_or_else(|| "truncated operand".to_string())?;
    let mut out = [0u8; 4];
    out.copy_from_slice(slice);
    Ok(u32::from_ne_bytes(out))
}

fn describe_constant(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Function(f) => describe_function(f),
        other => other.to_string(),
    }
}

fn describe_function(func: &Function) -> String {
    match func.kind() {
        FunctionKind::Script(s) => format!(
            "<function {}({})>",
            func.name(),
            s.arg_names.join(", ")
        ),
        _ => format!("<native {}>", func.name()),
    }
}
