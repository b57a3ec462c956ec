//! The textual serializer half of IL text I/O (§4.1).
//!
//! `write_module` is pure and infallible: it never reports diagnostics,
//! because a `Module` already constructed in memory is assumed well-formed
//! enough to print (the verifier is what rejects bad modules, not the
//! printer). Numeric literals and string escapes are emitted canonically so
//! that `parse → serialize → parse` is idempotent after the first round trip
//! (§8 L1).

use crate::block::BasicBlock;
use crate::function::Function;
use crate::instr::{BranchTarget, Instruction, Opcode};
use crate::module::{GlobalDef, Module};
use crate::value::{Value, ValueData};
use cranelift_entity::EntityRef;
use std::fmt::Write;

/// Serialize a module to its canonical textual form.
pub fn write_module(m: &Module) -> String {
    let mut out = String::new();
    writeln!(out, "il {}", m.version).unwrap();

    for (_, e) in m.externs.iter() {
        let params = e.param_tys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(out, "extern @{}({}) -> {}", e.name, params, e.ret_ty).unwrap();
    }
    if !m.externs.is_empty() {
        writeln!(out).unwrap();
    }

    for (_, g) in m.globals.iter() {
        write_global(&mut out, g);
    }
    if !m.globals.is_empty() {
        writeln!(out).unwrap();
    }

    for (i, f) in m.functions.iter().enumerate() {
        write_function(&mut out, f);
        if i + 1 < m.functions.len() {
            writeln!(out).unwrap();
        }
    }

    out
}

fn write_global(out: &mut String, g: &GlobalDef) {
    let kw = if g.is_const { "const " } else { "" };
    writeln!(out, "global {kw}str @{} = \"{}\"", g.name, escape_bytes(&g.bytes)).unwrap();
}

/// C-style escaping with `\xNN` for arbitrary bytes, so embedded zero bytes
/// survive round-trip (§4.1, §8 "S-series" encoding note).
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => s.push_str("\\\\"),
            b'"' => s.push_str("\\\""),
            b'\n' => s.push_str("\\n"),
            b'\t' => s.push_str("\\t"),
            b'\r' => s.push_str("\\r"),
            0x20..=0x7e => s.push(b as char),
            _ => {
                write!(s, "\\x{b:02x}").unwrap();
            }
        }
    }
    s
}

fn write_function(out: &mut String, f: &Function) {
    let params = f.param_tys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    writeln!(out, "func @{}({}) -> {} {{", f.name, params, f.ret_ty).unwrap();
    for (_, bb) in f.blocks_in_order() {
        write_block(out, f, bb);
    }
    writeln!(out, "}}").unwrap();
}

fn write_block(out: &mut String, f: &Function, bb: &BasicBlock) {
    if bb.params.is_empty() {
        writeln!(out, "{}:", bb.label).unwrap();
    } else {
        let params =
            bb.params.iter().map(|p| format!("%{}: {}", p.id.index(), p.ty)).collect::<Vec<_>>().join(", ");
        writeln!(out, "{}({}):", bb.label, params).unwrap();
    }
    for inst in &bb.insts {
        write_instruction(out, f, inst);
    }
}

fn write_instruction(out: &mut String, f: &Function, inst: &Instruction) {
    if inst.loc.is_valid() {
        writeln!(out, "    .loc {}", inst.loc).unwrap();
    }

    out.push_str("    ");
    if let Some(result) = inst.result {
        write!(out, "%{} = ", result.index()).unwrap();
    }
    out.push_str(inst.opcode.mnemonic());
    if inst.result_ty != crate::types::Type::Void && inst.result.is_some() {
        write!(out, " {}", inst.result_ty).unwrap();
    }

    let callee_is_named = matches!(inst.opcode, Opcode::CallIndirect) && !inst.labels.is_empty();
    if matches!(inst.opcode, Opcode::Call) || callee_is_named {
        write!(out, " @{}", inst.labels.first().map(String::as_str).unwrap_or("")).unwrap();
    } else if matches!(inst.opcode, Opcode::CallIndirect) {
        write!(out, " {}", inst.operands.first().map(format_value).unwrap_or_default()).unwrap();
    }

    let skip_first = matches!(inst.opcode, Opcode::CallIndirect) && !callee_is_named;
    let operand_slice: &[Value] = if skip_first { &inst.operands[1..] } else { &inst.operands };
    let operand_strs: Vec<String> = operand_slice.iter().map(format_value).collect();
    if !operand_strs.is_empty() {
        write!(out, " {}", operand_strs.join(", ")).unwrap();
    }

    match inst.opcode {
        Opcode::SwitchI32 => {
            let cases = inst
                .switch_cases
                .iter()
                .map(|c| format!("{} -> {}", c.label, format_target(f, &c.target)))
                .collect::<Vec<_>>()
                .join(", ");
            let default = inst.targets.first().map(|t| format_target(f, t)).unwrap_or_default();
            if operand_strs.is_empty() {
                out.push(' ');
            } else {
                out.push_str(", ");
            }
            write!(out, "[{cases}] default {default}").unwrap();
        }
        Opcode::Br | Opcode::Cbr => {
            for t in &inst.targets {
                write!(out, " {}", format_target(f, t)).unwrap();
            }
        }
        Opcode::EhPush | Opcode::ResumeLabel => {
            for l in &inst.labels {
                write!(out, " ^{l}").unwrap();
            }
        }
        Opcode::ConstStr | Opcode::GlobalAddr => {
            write!(out, " @{}", inst.labels.first().map(String::as_str).unwrap_or("")).unwrap();
        }
        _ => {}
    }

    // Every instruction ends with `;` — layout is not significant, so this
    // is the only thing that tells the parser where one instruction's
    // (possibly absent) trailing operand list ends and the next begins.
    out.push(';');
    writeln!(out).unwrap();
}

fn format_value(v: &Value) -> String {
    v.to_string()
}

/// Branch targets print the block's textual label, not its numeric index
/// (§4.1 grammar: "`^label`" — the serialized form is meant to be read back
/// without carrying internal entity numbering along).
fn format_target(f: &Function, t: &BranchTarget) -> String {
    let label = &f.block(t.block).label;
    if t.args.is_empty() {
        format!("^{label}")
    } else {
        let args = t.args.iter().map(format_value).collect::<Vec<_>>().join(", ");
        format!("^{label}({args})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_zero_and_control_bytes() {
        let escaped = escape_bytes(&[b'h', b'i', 0, 1, b'"']);
        assert_eq!(escaped, "hi\\x00\\x01\\\"");
    }

    #[test]
    fn version_header_is_first_line() {
        use crate::module::{Module, Version};
        let m = Module::new(Version::new(0, 2, Some(0)));
        let text = write_module(&m);
        assert_eq!(text.lines().next(), Some("il 0.2.0"));
    }
}
