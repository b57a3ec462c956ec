//! Basic blocks: a label, a typed parameter list, and an ordered instruction
//! list terminated exactly once (§3).

use crate::entities::ValueId;
use crate::instr::Instruction;
use crate::types::Type;

/// One block-parameter: the phi-equivalent a caller supplies per incoming
/// branch.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockParam {
    pub id: ValueId,
    pub name: String,
    pub ty: Type,
}

/// A basic block: unique label within its function, ordered parameters,
/// ordered instructions, and a `terminated` flag flipped by the last
/// instruction appended.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct BasicBlock {
    pub label: String,
    pub params: Vec<BlockParam>,
    pub insts: Vec<Instruction>,
    pub terminated: bool,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock { label: label.into(), params: Vec::new(), insts: Vec::new(), terminated: false }
    }

    pub fn with_params(mut self, params: Vec<BlockParam>) -> Self {
        self.params = params;
        self
    }

    /// Append an instruction, tracking the terminated flag. Returns an error
    /// message (not a full diagnostic — the verifier owns diagnostic codes)
    /// if an instruction is appended after the block is already terminated.
    pub fn push(&mut self, inst: Instruction) -> Result<(), &'static str> {
        if self.terminated {
            return Err("instruction appended after block terminator");
        }
        if inst.is_terminator() {
            self.terminated = true;
        }
        self.insts.push(inst);
        Ok(())
    }

    pub fn param_types(&self) -> impl Iterator<Item = Type> + '_ {
        self.params.iter().map(|p| p.ty)
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        if self.terminated {
            self.insts.last()
        } else {
            None
        }
    }
}
