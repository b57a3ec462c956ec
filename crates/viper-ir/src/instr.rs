//! Opcodes and instructions (§3).

use crate::entities::{Block, ValueId};
use crate::types::Type;
use crate::value::Value;
use smallvec::SmallVec;
use viper_support::SourceLoc;

/// The opcode families described in §3. Every opcode here has a fixed arity
/// and type contract enforced by the verifier (`viper-verify`), not by this
/// crate — `viper-ir` only stores what the frontend or parser produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // arithmetic / bitwise
    Add,
    Sub,
    Mul,
    SDiv,
    SDivChk0,
    UDiv,
    UDivChk0,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
    IAddOvf,

    // compares (result type I1)
    IcmpEq,
    IcmpNe,
    ScmpLt,
    ScmpLe,
    ScmpGt,
    ScmpGe,
    UcmpLt,
    UcmpLe,
    UcmpGt,
    UcmpGe,
    FcmpEq,
    FcmpLt,
    FcmpLe,
    FcmpGt,
    FcmpGe,

    // conversions
    Sitofp,
    Fptosi,
    Trunc1,
    Zext1,
    Sext,
    Zext,

    // memory
    Alloca,
    Load,
    Store,
    ConstStr,
    ConstInt,
    GlobalAddr,

    // control
    Br,
    Cbr,
    SwitchI32,
    Ret,

    // calls
    Call,
    CallIndirect,

    // EH
    EhPush,
    EhPop,
    EhEntry,
    Trap,
    TrapFromErr,
    ResumeSame,
    ResumeNext,
    ResumeLabel,
}

impl Opcode {
    /// Terminators end a basic block; every block must have exactly one, as
    /// its last instruction (§3 invariant 3).
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Ret
                | Opcode::Br
                | Opcode::Cbr
                | Opcode::SwitchI32
                | Opcode::Trap
                | Opcode::TrapFromErr
                | Opcode::ResumeSame
                | Opcode::ResumeNext
                | Opcode::ResumeLabel
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::SDiv => "sdiv",
            Opcode::SDivChk0 => "sdiv.chk0",
            Opcode::UDiv => "udiv",
            Opcode::UDivChk0 => "udiv.chk0",
            Opcode::SRem => "srem",
            Opcode::URem => "urem",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Lshr => "lshr",
            Opcode::Ashr => "ashr",
            Opcode::IAddOvf => "iadd.ovf",
            Opcode::IcmpEq => "icmp_eq",
            Opcode::IcmpNe => "icmp_ne",
            Opcode::ScmpLt => "scmp_lt",
            Opcode::ScmpLe => "scmp_le",
            Opcode::ScmpGt => "scmp_gt",
            Opcode::ScmpGe => "scmp_ge",
            Opcode::UcmpLt => "ucmp_lt",
            Opcode::UcmpLe => "ucmp_le",
            Opcode::UcmpGt => "ucmp_gt",
            Opcode::UcmpGe => "ucmp_ge",
            Opcode::FcmpEq => "fcmp_eq",
            Opcode::FcmpLt => "fcmp_lt",
            Opcode::FcmpLe => "fcmp_le",
            Opcode::FcmpGt => "fcmp_gt",
            Opcode::FcmpGe => "fcmp_ge",
            Opcode::Sitofp => "sitofp",
            Opcode::Fptosi => "fptosi",
            Opcode::Trunc1 => "trunc1",
            Opcode::Zext1 => "zext1",
            Opcode::Sext => "sext",
            Opcode::Zext => "zext",
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::ConstStr => "const_str",
            Opcode::ConstInt => "const_int",
            Opcode::GlobalAddr => "global_addr",
            Opcode::Br => "br",
            Opcode::Cbr => "cbr",
            Opcode::SwitchI32 => "switch.i32",
            Opcode::Ret => "ret",
            Opcode::Call => "call",
            Opcode::CallIndirect => "call.indirect",
            Opcode::EhPush => "eh.push",
            Opcode::EhPop => "eh.pop",
            Opcode::EhEntry => "eh.entry",
            Opcode::Trap => "trap",
            Opcode::TrapFromErr => "trap.from_err",
            Opcode::ResumeSame => "resume.same",
            Opcode::ResumeNext => "resume.next",
            Opcode::ResumeLabel => "resume.label",
        }
    }
}

/// One successor edge out of a terminator: the destination block plus the
/// argument values supplied on that edge (must match the destination's
/// block-parameter arity/types — §3 invariant 3, §8 P5).
#[derive(Clone, Debug, PartialEq)]
pub struct BranchTarget {
    pub block: Block,
    pub args: SmallVec<[Value; 4]>,
}

impl BranchTarget {
    pub fn new(block: Block, args: impl Into<SmallVec<[Value; 4]>>) -> Self {
        BranchTarget { block, args: args.into() }
    }
}

/// One case of a `switch.i32`: a discrete label compared against the
/// narrowed selector, plus the arm it dispatches to.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub label: i32,
    pub target: BranchTarget,
}

/// A single IL instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// `None` when the opcode produces no value (`Void` result type).
    pub result: Option<ValueId>,
    pub result_ty: Type,
    pub operands: SmallVec<[Value; 3]>,
    /// Branch targets for `br`/`cbr`. `switch.i32` uses `switch_cases` plus
    /// `targets[0]` as the default; EH-marker instructions use neither.
    pub targets: SmallVec<[BranchTarget; 2]>,
    pub switch_cases: Vec<SwitchCase>,
    /// Text labels carried by EH markers (`eh.push ^handler`).
    pub labels: SmallVec<[String; 1]>,
    pub loc: SourceLoc,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            opcode,
            result: None,
            result_ty: Type::Void,
            operands: SmallVec::new(),
            targets: SmallVec::new(),
            switch_cases: Vec::new(),
            labels: SmallVec::new(),
            loc: SourceLoc::UNKNOWN,
        }
    }

    pub fn with_result(mut self, id: ValueId, ty: Type) -> Self {
        self.result = Some(id);
        self.result_ty = ty;
        self
    }

    pub fn with_operands(mut self, operands: impl Into<SmallVec<[Value; 3]>>) -> Self {
        self.operands = operands.into();
        self
    }

    pub fn with_targets(mut self, targets: impl Into<SmallVec<[BranchTarget; 2]>>) -> Self {
        self.targets = targets.into();
        self
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}
