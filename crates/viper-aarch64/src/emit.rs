//! Deterministic AArch64 assembly-text emission (§4.6 "Assembly emitter").
//!
//! This backend's target representation is textual `.s` output, not a
//! binary encoder — the CLI surface is `codegen_arm64 in.il -S out.s`, so
//! there is no machine-code buffer to manage, only deterministic mnemonic
//! printing. `mov` with an arbitrary 64-bit immediate is emitted as a single
//! pseudo-op and left to the target assembler's own `movz`/`movk` expansion
//! (both GNU `as` and the LLVM integrated assembler support this for
//! `aarch64`); the one immediate AArch64 has no such alias for is an `f64`
//! bit pattern, which [`emit_inst`] expands through `x17` — never assigned a
//! persistent value by [`crate::frame::apply_regalloc`] — into a `fmov`.

use std::fmt::Write as _;

use viper_ir::Module;
use viper_machinst::{CondCode, MInst, MemOperand, MirFunction, PReg, Reg, RegClass};

/// Which assembler conventions to target: symbol mangling and section
/// directives differ between a Mach-O (Darwin) and an ELF (Linux)
/// toolchain, even though the instruction mnemonics themselves don't.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Darwin,
    Linux,
}

impl Platform {
    fn mangle(self, name: &str) -> String {
        match self {
            Platform::Darwin => format!("_{name}"),
            Platform::Linux => name.to_string(),
        }
    }

    fn text_section(self) -> &'static str {
        match self {
            Platform::Darwin => ".section __TEXT,__text,regular,pure_instructions",
            Platform::Linux => ".text",
        }
    }

    fn rodata_section(self) -> &'static str {
        match self {
            Platform::Darwin => ".section __TEXT,__const",
            Platform::Linux => ".section .rodata",
        }
    }
}

fn reg_text(r: Reg, width64: bool) -> String {
    match r {
        Reg::Physical(p) => {
            if width64 {
                p.name64()
            } else {
                p.name32()
            }
        }
        Reg::Virtual(v) => panic!("unallocated virtual register v{} reached assembly emission", v_index(v)),
    }
}

fn v_index(v: viper_machinst::VReg) -> usize {
    use cranelift_entity::EntityRef;
    v.index()
}

fn gpr64(r: Reg) -> String {
    reg_text(r, true)
}

fn gpr32(r: Reg) -> String {
    reg_text(r, false)
}

fn fpr(r: Reg) -> String {
    reg_text(r, true)
}

fn mem_text(mem: &MemOperand) -> String {
    match mem {
        MemOperand::SpillSlot(slot) => format!("[sp, #{}]", slot * 8),
        MemOperand::Local { base, offset } => format!("[{}, #{offset}]", gpr64(*base)),
        MemOperand::IncomingArg(off) => panic!("IncomingArg({off}) left unresolved — frame layout must run before emission"),
    }
}

/// Emits one function's assembly, including its `.globl`/label header.
fn emit_function(out: &mut String, platform: Platform, func: &MirFunction) {
    let symbol = platform.mangle(&func.name);
    writeln!(out, "\t.globl {symbol}").unwrap();
    writeln!(out, "{symbol}:").unwrap();
    for (idx, block) in func.blocks.iter().enumerate() {
        if idx != 0 {
            writeln!(out, "{}:", block_label(&func.name, idx)).unwrap();
        }
        for inst in &block.insts {
            emit_inst(out, platform, &func.name, inst);
        }
    }
}

fn block_label(func_name: &str, idx: usize) -> String {
    format!(".L{func_name}_{idx}")
}

fn cond_suffix(c: CondCode) -> &'static str {
    c.suffix()
}

fn emit_inst(out: &mut String, platform: Platform, func_name: &str, inst: &MInst) {
    match inst {
        MInst::MovRR { dst, src } => {
            if matches!(dst, Reg::Physical(PReg { class: RegClass::Fpr, .. })) || matches!(src, Reg::Physical(PReg { class: RegClass::Fpr, .. })) {
                writeln!(out, "\tfmov {}, {}", fpr(*dst), fpr(*src)).unwrap();
            } else {
                writeln!(out, "\tmov {}, {}", gpr64(*dst), gpr64(*src)).unwrap();
            }
        }
        MInst::MovRI { dst, imm } => {
            writeln!(out, "\tmov {}, #{imm}", gpr64(*dst)).unwrap();
        }
        MInst::AddRRR { dst, a, b } => writeln!(out, "\tadd {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::AddRI { dst, src, imm } => writeln!(out, "\tadd {}, {}, #{imm}", gpr64(*dst), gpr64(*src)).unwrap(),
        MInst::SubRRR { dst, a, b } => writeln!(out, "\tsub {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::SubRI { dst, src, imm } => writeln!(out, "\tsub {}, {}, #{imm}", gpr64(*dst), gpr64(*src)).unwrap(),
        MInst::MulRRR { dst, a, b } => writeln!(out, "\tmul {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::Madd { dst, a, b, c } => writeln!(out, "\tmadd {}, {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b), gpr64(*c)).unwrap(),
        MInst::Msub { dst, a, b, c } => writeln!(out, "\tmsub {}, {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b), gpr64(*c)).unwrap(),
        MInst::SDiv { dst, a, b } => writeln!(out, "\tsdiv {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::UDiv { dst, a, b } => writeln!(out, "\tudiv {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::LslRI { dst, src, imm } => writeln!(out, "\tlsl {}, {}, #{imm}", gpr64(*dst), gpr64(*src)).unwrap(),
        MInst::LsrRI { dst, src, imm } => writeln!(out, "\tlsr {}, {}, #{imm}", gpr64(*dst), gpr64(*src)).unwrap(),
        MInst::AsrRI { dst, src, imm } => writeln!(out, "\tasr {}, {}, #{imm}", gpr64(*dst), gpr64(*src)).unwrap(),
        MInst::LslRR { dst, src, amount } => writeln!(out, "\tlsl {}, {}, {}", gpr64(*dst), gpr64(*src), gpr64(*amount)).unwrap(),
        MInst::LsrRR { dst, src, amount } => writeln!(out, "\tlsr {}, {}, {}", gpr64(*dst), gpr64(*src), gpr64(*amount)).unwrap(),
        MInst::AsrRR { dst, src, amount } => writeln!(out, "\tasr {}, {}, {}", gpr64(*dst), gpr64(*src), gpr64(*amount)).unwrap(),
        MInst::AndRRR { dst, a, b } => writeln!(out, "\tand {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::OrrRRR { dst, a, b } => writeln!(out, "\torr {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::EorRRR { dst, a, b } => writeln!(out, "\teor {}, {}, {}", gpr64(*dst), gpr64(*a), gpr64(*b)).unwrap(),
        MInst::CmpRR { a, b } => writeln!(out, "\tcmp {}, {}", gpr64(*a), gpr64(*b)).unwrap(),
        MInst::CmpRI { a, imm } => writeln!(out, "\tcmp {}, #{imm}", gpr64(*a)).unwrap(),
        MInst::TstRR { a, b } => writeln!(out, "\ttst {}, {}", gpr64(*a), gpr64(*b)).unwrap(),
        MInst::Cset { dst, cond } => writeln!(out, "\tcset {}, {}", gpr64(*dst), cond_suffix(*cond)).unwrap(),
        MInst::Sxtw { dst, src } => writeln!(out, "\tsxtw {}, {}", gpr64(*dst), gpr32(*src)).unwrap(),
        MInst::Uxtw { dst, src } => writeln!(out, "\tuxtw {}, {}", gpr64(*dst), gpr32(*src)).unwrap(),

        MInst::FMovRR { dst, src } => writeln!(out, "\tfmov {}, {}", fpr(*dst), fpr(*src)).unwrap(),
        MInst::FMovRI { dst, bits } => {
            // No AArch64 immediate form covers an arbitrary f64 bit pattern;
            // materialise it in `x17` (never allocator-assigned, see module
            // doc) and transfer the raw bits across register files.
            writeln!(out, "\tmov x17, #{bits}").unwrap();
            writeln!(out, "\tfmov {}, x17", fpr(*dst)).unwrap();
        }
        MInst::FAddRRR { dst, a, b } => writeln!(out, "\tfadd {}, {}, {}", fpr(*dst), fpr(*a), fpr(*b)).unwrap(),
        MInst::FSubRRR { dst, a, b } => writeln!(out, "\tfsub {}, {}, {}", fpr(*dst), fpr(*a), fpr(*b)).unwrap(),
        MInst::FMulRRR { dst, a, b } => writeln!(out, "\tfmul {}, {}, {}", fpr(*dst), fpr(*a), fpr(*b)).unwrap(),
        MInst::FDivRRR { dst, a, b } => writeln!(out, "\tfdiv {}, {}, {}", fpr(*dst), fpr(*a), fpr(*b)).unwrap(),
        MInst::FCmpRR { a, b } => writeln!(out, "\tfcmp {}, {}", fpr(*a), fpr(*b)).unwrap(),
        MInst::Scvtf { dst, src } => writeln!(out, "\tscvtf {}, {}", fpr(*dst), gpr64(*src)).unwrap(),
        MInst::Fcvtzs { dst, src } => writeln!(out, "\tfcvtzs {}, {}", gpr64(*dst), fpr(*src)).unwrap(),

        MInst::Ldr { dst, mem } => {
            let reg = if matches!(dst, Reg::Physical(PReg { class: RegClass::Fpr, .. })) { fpr(*dst) } else { gpr64(*dst) };
            writeln!(out, "\tldr {}, {}", reg, mem_text(mem)).unwrap();
        }
        MInst::Str { src, mem } => {
            let reg = if matches!(src, Reg::Physical(PReg { class: RegClass::Fpr, .. })) { fpr(*src) } else { gpr64(*src) };
            writeln!(out, "\tstr {}, {}", reg, mem_text(mem)).unwrap();
        }
        MInst::StpPre { a, b, pre_dec } => writeln!(out, "\tstp {}, {}, [sp, #-{pre_dec}]!", gpr64(*a), gpr64(*b)).unwrap(),
        MInst::LdpPost { a, b, post_inc } => writeln!(out, "\tldp {}, {}, [sp], #{post_inc}", gpr64(*a), gpr64(*b)).unwrap(),

        MInst::SubSpImm { imm } => writeln!(out, "\tsub sp, sp, #{imm}").unwrap(),
        MInst::AddSpImm { imm } => writeln!(out, "\tadd sp, sp, #{imm}").unwrap(),
        MInst::MovFpFromSp => writeln!(out, "\tmov x29, sp").unwrap(),

        MInst::Adrp { dst, symbol } => {
            let symbol = platform.mangle(symbol);
            match platform {
                Platform::Darwin => writeln!(out, "\tadrp {}, {symbol}@PAGE", gpr64(*dst)).unwrap(),
                Platform::Linux => writeln!(out, "\tadrp {}, {symbol}", gpr64(*dst)).unwrap(),
            }
        }
        MInst::AddLo12 { dst, src, symbol } => {
            let symbol = platform.mangle(symbol);
            match platform {
                Platform::Darwin => writeln!(out, "\tadd {}, {}, {symbol}@PAGEOFF", gpr64(*dst), gpr64(*src)).unwrap(),
                Platform::Linux => writeln!(out, "\tadd {}, {}, :lo12:{symbol}", gpr64(*dst), gpr64(*src)).unwrap(),
            }
        }
        MInst::LocalAddr { local_offset, .. } => {
            panic!("LocalAddr(local_offset={local_offset}) left unresolved — frame layout must run before emission")
        }

        MInst::Br { target } => writeln!(out, "\tb {}", block_label(func_name, *target as usize)).unwrap(),
        MInst::Cbz { src, target, fallthrough } => {
            writeln!(out, "\tcbz {}, {}", gpr64(*src), block_label(func_name, *target as usize)).unwrap();
            let _ = fallthrough;
        }
        MInst::Cbnz { src, target, fallthrough } => {
            writeln!(out, "\tcbnz {}, {}", gpr64(*src), block_label(func_name, *target as usize)).unwrap();
            let _ = fallthrough;
        }
        MInst::BCond { cond, target, fallthrough } => {
            writeln!(out, "\tb.{} {}", cond_suffix(*cond), block_label(func_name, *target as usize)).unwrap();
            let _ = fallthrough;
        }
        MInst::Bl { func } => writeln!(out, "\tbl {}", platform.mangle(func)).unwrap(),
        MInst::Blr { target } => writeln!(out, "\tblr {}", gpr64(*target)).unwrap(),
        MInst::Ret => writeln!(out, "\tret").unwrap(),

        MInst::TrapCall => writeln!(out, "\tbl rt_trap").unwrap(),
        MInst::Nop => writeln!(out, "\tnop").unwrap(),
    }
}

/// Emits one module's worth of assembly: rodata for its globals, then every
/// function's code, in module order (§8 L3 "identical input produces
/// byte-identical output"). `functions` is every function selected, register-
/// allocated, and frame-built (`select_function` -> `allocate` ->
/// `apply_regalloc` -> `build_frame` -> `peephole::run`), in the order they
/// should appear in the output.
pub fn emit_module(platform: Platform, module: &Module, functions: &[MirFunction]) -> String {
    let mut out = String::new();
    writeln!(out, "\t{}", platform.rodata_section()).unwrap();
    for g in module.globals.values() {
        writeln!(out, "{}:", g.name).unwrap();
        for byte in &g.bytes {
            writeln!(out, "\t.byte {byte}").unwrap();
        }
        if g.bytes.is_empty() {
            writeln!(out, "\t.byte 0").unwrap();
        }
    }
    writeln!(out, "\t{}", platform.text_section()).unwrap();
    for func in functions {
        emit_function(&mut out, platform, func);
    }
    out
}
