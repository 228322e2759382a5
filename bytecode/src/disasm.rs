//! Human-readable prototype listings, for debugging compiler output.

use std::fmt::Write;

use crate::opcode::{instruction::*, OpCode};
use crate::prototype::FunctionPrototype;

/// Render a prototype (and its nested prototypes, indented) as text.
pub fn disassemble(proto: &FunctionPrototype) -> String {
    let mut out = String::new();
    write_proto(&mut out, proto, 0);
    out
}

fn write_proto(out: &mut String, proto: &FunctionPrototype, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{pad}== fn(params={}{}) locals={} stack={} consts={} outers={} ==",
        proto.num_params,
        if proto.variadic { ", vargs" } else { "" },
        proto.max_locals,
        proto.max_stack_size,
        proto.consts.len(),
        proto.outer_values.len(),
    );
    for (i, &insn) in proto.code.iter().enumerate() {
        let op_byte = decode_opcode(insn);
        let Some(op) = OpCode::from_u8(op_byte) else {
            let _ = writeln!(out, "{pad}{i:04} UNKNOWN({op_byte})");
            continue;
        };
        let c = decode_c(insn);
        match op {
            OpCode::CLoad | OpCode::LoadGlobal | OpCode::StoreGlobal | OpCode::Prefix
            | OpCode::Infix => {
                let val = proto.consts.get(c as usize);
                let _ = writeln!(out, "{pad}{i:04} {:<13} K[{c}] ({val:?})", op.name());
            }
            OpCode::LoadOuter | OpCode::StoreOuter => {
                let name = proto
                    .outer_values
                    .get(c as usize)
                    .map(|o| o.name.as_str())
                    .unwrap_or("?");
                let _ = writeln!(out, "{pad}{i:04} {:<13} U[{c}] ({name})", op.name());
            }
            OpCode::Ref => {
                let a = decode_a(insn);
                let b = decode_b(insn);
                let _ = writeln!(out, "{pad}{i:04} {:<13} mode={a} idx={b}", op.name());
            }
            OpCode::LoadLocal | OpCode::StoreLocal | OpCode::CloseOuters => {
                let _ = writeln!(out, "{pad}{i:04} {:<13} L[{c}]", op.name());
            }
            _ if op.is_jump() => {
                let _ = writeln!(out, "{pad}{i:04} {:<13} -> {c}", op.name());
            }
            OpCode::Closure | OpCode::Invoke | OpCode::InvokeMethod | OpCode::List
            | OpCode::Tuple => {
                let _ = writeln!(out, "{pad}{i:04} {:<13} {c}", op.name());
            }
            _ => {
                let _ = writeln!(out, "{pad}{i:04} {}", op.name());
            }
        }
    }
    for nested in proto.nested.iter() {
        write_proto(out, nested, depth + 1);
    }
}
