//! A single call frame (§4.5): "each VM owns its frame stack, SSA value
//! store, opcode counters, trap snapshot, and resume-token registry" — this
//! module is the frame-stack half of that sentence.

use crate::value::RuntimeValue;
use hashbrown::HashMap;
use viper_ir::{Block, ValueId};

/// An active `eh.push ^label` with no matching `eh.pop` yet, in push order
/// (innermost last) — mirrors the abstract stack `viper-verify`'s EH pass
/// walks statically; the interpreter keeps the same shape at runtime.
#[derive(Clone, Debug)]
pub struct HandlerEntry {
    pub label: String,
}

/// Where a trap currently being handled originated, recorded when a trap
/// unwinds into a handler so `resume.same`/`resume.next` know where to jump
/// back to.
#[derive(Clone, Copy, Debug)]
pub struct ResumeSite {
    pub block: Block,
    pub index: usize,
    pub token: u64,
}

/// One function activation.
pub struct Frame {
    pub func_index: usize,
    pub block: Block,
    /// Index of the next instruction to execute within `block`.
    pub pc: usize,
    pub locals: HashMap<ValueId, RuntimeValue>,
    /// `alloca` slots, indexed by the low bits of the `Ptr` handle they hand
    /// back (§9 "Cyclic graphs" ownership note extended to runtime storage:
    /// a frame owns its own allocas outright, freed when the frame pops).
    pub allocas: Vec<RuntimeValue>,
    pub handlers: Vec<HandlerEntry>,
    pub active_resume: Option<ResumeSite>,
}

impl Frame {
    pub fn new(func_index: usize, entry: Block) -> Self {
        Frame {
            func_index,
            block: entry,
            pc: 0,
            locals: HashMap::new(),
            allocas: Vec::new(),
            handlers: Vec::new(),
            active_resume: None,
        }
    }

    pub fn get(&self, id: ValueId) -> Option<&RuntimeValue> {
        self.locals.get(&id)
    }

    pub fn set(&mut self, id: ValueId, value: RuntimeValue) {
        self.locals.insert(id, value);
    }

    /// Jump to `target`, replacing `pc` so the next instruction fetched is
    /// `target`'s first.
    pub fn goto(&mut self, target: Block) {
        self.block = target;
        self.pc = 0;
    }

    /// Reserve a fresh `alloca` slot, seeded with `init`, returning its
    /// handle (a 1-based index so `0` stays reserved for "null").
    pub fn alloc_slot(&mut self, init: RuntimeValue) -> u64 {
        self.allocas.push(init);
        self.allocas.len() as u64
    }

    pub fn slot(&self, handle: u64) -> Option<&RuntimeValue> {
        handle.checked_sub(1).and_then(|i| self.allocas.get(i as usize))
    }

    pub fn slot_mut(&mut self, handle: u64) -> Option<&mut RuntimeValue> {
        handle.checked_sub(1).and_then(|i| self.allocas.get_mut(i as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn alloc_slots_are_one_based_handles() {
        let mut f = Frame::new(0, Block::new(0));
        let h = f.alloc_slot(RuntimeValue::I64(0));
        assert_eq!(h, 1);
        assert_eq!(f.slot(h), Some(&RuntimeValue::I64(0)));
        *f.slot_mut(h).unwrap() = RuntimeValue::I64(42);
        assert_eq!(f.slot(h), Some(&RuntimeValue::I64(42)));
    }

    #[test]
    fn goto_resets_the_program_counter() {
        let mut f = Frame::new(0, Block::new(0));
        f.pc = 3;
        f.goto(Block::new(2));
        assert_eq!(f.block, Block::new(2));
        assert_eq!(f.pc, 0);
    }
}
