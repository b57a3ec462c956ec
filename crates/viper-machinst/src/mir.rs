//! Machine IR (`L9`): a tagged-instruction IR whose opcodes mirror the
//! AArch64 mnemonics the backend eventually emits (§4.6 "Machine IR").
//!
//! Operands are [`Reg`]s until the allocator runs, at which point every
//! [`Reg::Virtual`] has been rewritten to either a [`Reg::Physical`] or a
//! spill-slot load/store pair; see [`crate::regalloc`].

use crate::regs::{Reg, RegClass, VReg};
use smallvec::SmallVec;

/// AArch64 condition codes, as produced by `cmp`/`fcmp` and consumed by
/// `cset`/`b.cond`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CondCode {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Hi,
    Lo,
    Hs,
    Ls,
}

impl CondCode {
    /// The mnemonic suffix (`eq`, `ne`, ...) as it appears in `cset`/`b.cond`.
    pub fn suffix(self) -> &'static str {
        match self {
            CondCode::Eq => "eq",
            CondCode::Ne => "ne",
            CondCode::Lt => "lt",
            CondCode::Le => "le",
            CondCode::Gt => "gt",
            CondCode::Ge => "ge",
            CondCode::Hi => "hi",
            CondCode::Lo => "lo",
            CondCode::Hs => "hs",
            CondCode::Ls => "ls",
        }
    }

    pub fn invert(self) -> CondCode {
        match self {
            CondCode::Eq => CondCode::Ne,
            CondCode::Ne => CondCode::Eq,
            CondCode::Lt => CondCode::Ge,
            CondCode::Ge => CondCode::Lt,
            CondCode::Le => CondCode::Gt,
            CondCode::Gt => CondCode::Le,
            CondCode::Hi => CondCode::Ls,
            CondCode::Ls => CondCode::Hi,
            CondCode::Hs => CondCode::Lo,
            CondCode::Lo => CondCode::Hs,
        }
    }
}

/// A stack-frame reference, resolved to a `[sp, #offset]` form once frame
/// layout is finalised. `Spill` slots are distinct from `Local` slots so the
/// allocator's bookkeeping never collides with a frontend-declared `alloca`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemOperand {
    SpillSlot(u32),
    Local { base: Reg, offset: i32 },
    /// A caller-supplied argument that overflowed into the stack, addressed
    /// relative to `sp` as it stood at function entry. The selector emits
    /// this instead of `Local { base: Physical(SP), .. } }` so the frame
    /// builder can rebase it by the final frame size without risking
    /// confusion with an outgoing call argument written through a
    /// `Local`-addressed store at the same physical register (§4.6 frame
    /// layout / calling convention).
    IncomingArg(i32),
}

/// One Machine IR block's worth of control target: a label plus, for blocks
/// with parameters, the spill slots those parameters live in.
pub type MirBlockId = u32;

/// A single Machine IR instruction. Opcodes correspond 1:1 with the mnemonic
/// the assembly emitter prints for them; selection from IL happens in the
/// backend crate, never here.
#[derive(Clone, Debug)]
pub enum MInst {
    MovRR { dst: Reg, src: Reg },
    MovRI { dst: Reg, imm: i64 },
    AddRRR { dst: Reg, a: Reg, b: Reg },
    AddRI { dst: Reg, src: Reg, imm: i64 },
    SubRRR { dst: Reg, a: Reg, b: Reg },
    SubRI { dst: Reg, src: Reg, imm: i64 },
    MulRRR { dst: Reg, a: Reg, b: Reg },
    Madd { dst: Reg, a: Reg, b: Reg, c: Reg },
    Msub { dst: Reg, a: Reg, b: Reg, c: Reg },
    SDiv { dst: Reg, a: Reg, b: Reg },
    UDiv { dst: Reg, a: Reg, b: Reg },
    LslRI { dst: Reg, src: Reg, imm: i64 },
    LsrRI { dst: Reg, src: Reg, imm: i64 },
    AsrRI { dst: Reg, src: Reg, imm: i64 },
    /// Register-amount shifts (`lsl`/`lsr`/`asr` with a register operand) —
    /// distinct from the `*RI` immediate forms the selector uses for
    /// narrowing, since IL's `shl`/`lshr`/`ashr` take a runtime shift count.
    LslRR { dst: Reg, src: Reg, amount: Reg },
    LsrRR { dst: Reg, src: Reg, amount: Reg },
    AsrRR { dst: Reg, src: Reg, amount: Reg },
    AndRRR { dst: Reg, a: Reg, b: Reg },
    OrrRRR { dst: Reg, a: Reg, b: Reg },
    EorRRR { dst: Reg, a: Reg, b: Reg },
    CmpRR { a: Reg, b: Reg },
    CmpRI { a: Reg, imm: i64 },
    TstRR { a: Reg, b: Reg },
    Cset { dst: Reg, cond: CondCode },
    Sxtw { dst: Reg, src: Reg },
    Uxtw { dst: Reg, src: Reg },

    FMovRR { dst: Reg, src: Reg },
    FMovRI { dst: Reg, bits: u64 },
    FAddRRR { dst: Reg, a: Reg, b: Reg },
    FSubRRR { dst: Reg, a: Reg, b: Reg },
    FMulRRR { dst: Reg, a: Reg, b: Reg },
    FDivRRR { dst: Reg, a: Reg, b: Reg },
    FCmpRR { a: Reg, b: Reg },
    Scvtf { dst: Reg, src: Reg },
    Fcvtzs { dst: Reg, src: Reg },

    Ldr { dst: Reg, mem: MemOperand },
    Str { src: Reg, mem: MemOperand },
    /// `stp`/`ldp` pair used only for the frame-pointer/link-register save
    /// in non-leaf prologues/epilogues (§4.6 "Prologue/epilogue").
    StpPre { a: Reg, b: Reg, pre_dec: i32 },
    LdpPost { a: Reg, b: Reg, post_inc: i32 },

    SubSpImm { imm: i64 },
    AddSpImm { imm: i64 },
    /// `mov x29, sp`, emitted right after the frame-link pair is pushed in a
    /// non-leaf prologue (§4.6 "Prologue/epilogue"). Fixed operands — `SP`
    /// and `x29` are never candidates for allocation.
    MovFpFromSp,

    /// `adrp dst, symbol` — page address of a global or runtime symbol.
    /// Always paired with [`MInst::AddLo12`] by the selector (§4.6 assembly
    /// emitter: "rodata for string globals").
    Adrp { dst: Reg, symbol: String },
    /// `add dst, src, :lo12:symbol`, completing the address [`MInst::Adrp`]
    /// began.
    AddLo12 { dst: Reg, src: Reg, symbol: String },

    /// Address of an `alloca` local, at `local_offset` bytes into the
    /// frame's local-storage area. The selector emits this with the real
    /// byte offset already known; only the *base* (`sp` plus however many
    /// bytes the spill area in front of it turns out to need) depends on
    /// register allocation, so the backend rewrites this into a concrete
    /// `AddRI` off `sp` once allocation has run (§4.6 frame layout).
    LocalAddr { dst: Reg, local_offset: u32 },

    Br { target: MirBlockId },
    Cbz { src: Reg, target: MirBlockId, fallthrough: MirBlockId },
    Cbnz { src: Reg, target: MirBlockId, fallthrough: MirBlockId },
    /// `b.cond target` falling through to `fallthrough` otherwise; the
    /// peephole pass removes either edge once it targets the next block.
    BCond { cond: CondCode, target: MirBlockId, fallthrough: MirBlockId },
    Bl { func: String },
    Blr { target: Reg },
    Ret,

    /// `trap` / `trap.from_err %c` (§4.6: lowers to `bl rt_trap`, optionally
    /// marshalling `%c` into `w0`/`x0` first).
    TrapCall,

    Nop,
}

impl MInst {
    /// Registers this instruction reads. Used by the allocator to compute
    /// live ranges; order is not significant.
    pub fn uses(&self) -> SmallVec<[Reg; 4]> {
        use MInst::*;
        let mut v = SmallVec::new();
        match *self {
            MovRR { src, .. } | FMovRR { src, .. } | Sxtw { src, .. } | Uxtw { src, .. } | Scvtf { src, .. } | Fcvtzs { src, .. } => v.push(src),
            AddRI { src, .. } | SubRI { src, .. } | LslRI { src, .. } | LsrRI { src, .. } | AsrRI { src, .. } => v.push(src),
            AddRRR { a, b, .. } | SubRRR { a, b, .. } | MulRRR { a, b, .. } | SDiv { a, b, .. } | UDiv { a, b, .. } | AndRRR { a, b, .. } | OrrRRR { a, b, .. } | EorRRR { a, b, .. } | CmpRR { a, b } | TstRR { a, b } | FAddRRR { a, b, .. } | FSubRRR { a, b, .. } | FMulRRR { a, b, .. } | FDivRRR { a, b, .. } | FCmpRR { a, b } => {
                v.push(a);
                v.push(b);
            }
            LslRR { src, amount, .. } | LsrRR { src, amount, .. } | AsrRR { src, amount, .. } => {
                v.push(src);
                v.push(amount);
            }
            Madd { a, b, c, .. } | Msub { a, b, c, .. } => {
                v.push(a);
                v.push(b);
                v.push(c);
            }
            CmpRI { a, .. } => v.push(a),
            Str { src, mem } => {
                v.push(src);
                if let MemOperand::Local { base, .. } = mem {
                    v.push(base);
                }
            }
            Ldr { mem, .. } => {
                if let MemOperand::Local { base, .. } = mem {
                    v.push(base);
                }
            }
            StpPre { a, b, .. } => {
                v.push(a);
                v.push(b);
            }
            Cbz { src, .. } | Cbnz { src, .. } => v.push(src),
            Blr { target } => v.push(target),
            AddLo12 { src, .. } => v.push(src),
            MovRI { .. } | FMovRI { .. } | Br { .. } | BCond { .. } | Bl { .. } | Ret | TrapCall | Nop | LdpPost { .. } | SubSpImm { .. } | AddSpImm { .. } | MovFpFromSp | Adrp { .. } | LocalAddr { .. } => {}
        }
        v
    }

    /// Registers this instruction defines.
    pub fn defs(&self) -> SmallVec<[Reg; 2]> {
        use MInst::*;
        let mut v = SmallVec::new();
        match *self {
            MovRR { dst, .. } | MovRI { dst, .. } | AddRRR { dst, .. } | AddRI { dst, .. } | SubRRR { dst, .. } | SubRI { dst, .. } | MulRRR { dst, .. } | Madd { dst, .. } | Msub { dst, .. } | SDiv { dst, .. } | UDiv { dst, .. } | LslRI { dst, .. } | LsrRI { dst, .. } | AsrRI { dst, .. } | LslRR { dst, .. } | LsrRR { dst, .. } | AsrRR { dst, .. } | AndRRR { dst, .. } | OrrRRR { dst, .. } | EorRRR { dst, .. } | Cset { dst, .. } | Sxtw { dst, .. } | Uxtw { dst, .. } | FMovRR { dst, .. } | FMovRI { dst, .. } | FAddRRR { dst, .. } | FSubRRR { dst, .. } | FMulRRR { dst, .. } | FDivRRR { dst, .. } | Scvtf { dst, .. } | Fcvtzs { dst, .. } | Ldr { dst, .. } | Adrp { dst, .. } | AddLo12 { dst, .. } | LocalAddr { dst, .. } => v.push(dst),
            StpPre { .. } | LdpPost { .. } | CmpRR { .. } | CmpRI { .. } | TstRR { .. } | FCmpRR { .. } | Str { .. } | Br { .. } | Cbz { .. } | Cbnz { .. } | BCond { .. } | Bl { .. } | Blr { .. } | Ret | TrapCall | Nop | SubSpImm { .. } | AddSpImm { .. } | MovFpFromSp => {}
        }
        v
    }

    /// Visits every register field with `f(reg, is_def)`, letting a caller
    /// rewrite virtual registers to physical ones (or splice in spill
    /// fills) without re-deriving each opcode's operand shape — mirrors
    /// [`Self::uses`]/[`Self::defs`] but by mutable reference.
    pub fn for_each_reg_mut(&mut self, f: &mut dyn FnMut(&mut Reg, bool)) {
        use MInst::*;
        match self {
            MovRR { dst, src } | Sxtw { dst, src } | Uxtw { dst, src } | FMovRR { dst, src } | Scvtf { dst, src } | Fcvtzs { dst, src } => {
                f(src, false);
                f(dst, true);
            }
            AddRI { dst, src, .. } | SubRI { dst, src, .. } | LslRI { dst, src, .. } | LsrRI { dst, src, .. } | AsrRI { dst, src, .. } => {
                f(src, false);
                f(dst, true);
            }
            AddRRR { dst, a, b } | SubRRR { dst, a, b } | MulRRR { dst, a, b } | SDiv { dst, a, b } | UDiv { dst, a, b } | AndRRR { dst, a, b } | OrrRRR { dst, a, b } | EorRRR { dst, a, b } | FAddRRR { dst, a, b } | FSubRRR { dst, a, b } | FMulRRR { dst, a, b } | FDivRRR { dst, a, b } => {
                f(a, false);
                f(b, false);
                f(dst, true);
            }
            LslRR { dst, src, amount } | LsrRR { dst, src, amount } | AsrRR { dst, src, amount } => {
                f(src, false);
                f(amount, false);
                f(dst, true);
            }
            Madd { dst, a, b, c } | Msub { dst, a, b, c } => {
                f(a, false);
                f(b, false);
                f(c, false);
                f(dst, true);
            }
            CmpRR { a, b } | TstRR { a, b } | FCmpRR { a, b } => {
                f(a, false);
                f(b, false);
            }
            CmpRI { a, .. } => f(a, false),
            MovRI { dst, .. } | FMovRI { dst, .. } | Cset { dst, .. } | Adrp { dst, .. } | LocalAddr { dst, .. } => f(dst, true),
            AddLo12 { dst, src, .. } => {
                f(src, false);
                f(dst, true);
            }
            Str { src, mem } => {
                f(src, false);
                if let MemOperand::Local { base, .. } = mem {
                    f(base, false);
                }
            }
            Ldr { dst, mem } => {
                if let MemOperand::Local { base, .. } = mem {
                    f(base, false);
                }
                f(dst, true);
            }
            StpPre { a, b, .. } => {
                f(a, false);
                f(b, false);
            }
            LdpPost { .. } => {}
            Cbz { src, .. } | Cbnz { src, .. } => f(src, false),
            Blr { target } => f(target, false),
            Br { .. } | BCond { .. } | Bl { .. } | Ret | TrapCall | Nop | SubSpImm { .. } | AddSpImm { .. } | MovFpFromSp => {}
        }
    }

    /// `true` for calls: the allocator forces any caller-saved register
    /// live across one to spill (§4.6 "Register allocator").
    pub fn is_call(&self) -> bool {
        matches!(self, MInst::Bl { .. } | MInst::Blr { .. } | MInst::TrapCall)
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, MInst::Br { .. } | MInst::Cbz { .. } | MInst::Cbnz { .. } | MInst::BCond { .. } | MInst::Ret)
    }
}

/// One Machine IR block. `params` records, in order, the spill slot each
/// block-parameter value is bound to — the allocator never assigns them a
/// physical register (§4.6).
#[derive(Clone, Debug)]
pub struct MirBlock {
    pub label: String,
    pub param_slots: Vec<u32>,
    pub insts: Vec<MInst>,
}

impl MirBlock {
    pub fn new(label: impl Into<String>) -> MirBlock {
        MirBlock { label: label.into(), param_slots: Vec::new(), insts: Vec::new() }
    }
}

/// A Machine IR function: one entry block (index 0) plus whatever the
/// instruction selector created.
pub struct MirFunction {
    pub name: String,
    pub blocks: Vec<MirBlock>,
    vreg_classes: Vec<RegClass>,
}

impl MirFunction {
    pub fn new(name: impl Into<String>) -> MirFunction {
        MirFunction { name: name.into(), blocks: Vec::new(), vreg_classes: Vec::new() }
    }

    pub fn new_vreg(&mut self, class: RegClass) -> VReg {
        let v = VReg::new(self.vreg_classes.len());
        self.vreg_classes.push(class);
        v
    }

    pub fn vreg_class(&self, v: VReg) -> RegClass {
        self.vreg_classes[v.index()]
    }

    pub fn vreg_count(&self) -> usize {
        self.vreg_classes.len()
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> MirBlockId {
        self.blocks.push(MirBlock::new(label));
        (self.blocks.len() - 1) as MirBlockId
    }

    pub fn block_mut(&mut self, id: MirBlockId) -> &mut MirBlock {
        &mut self.blocks[id as usize]
    }

    pub fn block(&self, id: MirBlockId) -> &MirBlock {
        &self.blocks[id as usize]
    }

    /// A function with no `bl`/`blr`/`trap` calls needs no frame-pointer /
    /// link-register save (§4.6 "leaf function").
    pub fn is_leaf(&self) -> bool {
        !self.blocks.iter().any(|b| b.insts.iter().any(|i| i.is_call()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_detection_follows_call_instructions() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let dst = Reg::Virtual(f.new_vreg(RegClass::Gpr));
        f.block_mut(entry).insts.push(MInst::MovRI { dst, imm: 1 });
        f.block_mut(entry).insts.push(MInst::Ret);
        assert!(f.is_leaf());

        f.block_mut(entry).insts.insert(1, MInst::Bl { func: "rt_trap".to_string() });
        assert!(!f.is_leaf());
    }

    #[test]
    fn cond_code_invert_round_trips() {
        assert_eq!(CondCode::Lt.invert().invert(), CondCode::Lt);
        assert_eq!(CondCode::Eq.invert(), CondCode::Ne);
    }
}
