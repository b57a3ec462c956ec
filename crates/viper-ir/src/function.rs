//! Functions: name, signature, and an ordered list of basic blocks whose
//! first entry is the entry block (§3).

use crate::block::{BasicBlock, BlockParam};
use crate::entities::{Block, ValueId};
use crate::instr::Instruction;
use crate::types::Type;
use cranelift_entity::{EntityRef, PrimaryMap};

/// A function: return type, ordered parameter types, and ordered basic
/// blocks. Block ordering is significant — `blocks[Block::new(0)]` is always
/// the entry block; successorship is encoded inside terminators, not by
/// block position.
#[derive(Clone, Debug, Default)]
pub struct Function {
    pub name: String,
    pub ret_ty: Type,
    pub param_tys: Vec<Type>,
    pub blocks: PrimaryMap<Block, BasicBlock>,
    next_value: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: Type, param_tys: Vec<Type>) -> Self {
        Function { name: name.into(), ret_ty, param_tys, blocks: PrimaryMap::new(), next_value: 0 }
    }

    /// The entry block, if any has been created yet.
    pub fn entry(&self) -> Option<Block> {
        self.blocks.keys().next()
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> Block {
        self.blocks.push(BasicBlock::new(label))
    }

    pub fn create_block_with_params(&mut self, label: impl Into<String>, param_tys: &[Type]) -> Block {
        let params = param_tys
            .iter()
            .map(|&ty| {
                let id = self.fresh_value();
                BlockParam { id, name: format!("p{}", id.index()), ty }
            })
            .collect();
        self.blocks.push(BasicBlock::new(label).with_params(params))
    }

    /// Like [`Self::create_block_with_params`], but with the parameter's
    /// numeric id fixed by the caller instead of freshly allocated — the
    /// parser uses this so a round-tripped function keeps exactly the `%N`
    /// numbering the source text used, including any gaps.
    pub fn create_block_with_explicit_params(
        &mut self,
        label: impl Into<String>,
        params: Vec<(u32, Type)>,
    ) -> Block {
        let params = params
            .into_iter()
            .map(|(n, ty)| {
                let id = self.reserve_value_id(n);
                BlockParam { id, name: format!("p{n}"), ty }
            })
            .collect();
        self.blocks.push(BasicBlock::new(label).with_params(params))
    }

    /// Allocate a fresh SSA id, unique within this function.
    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId::new(self.next_value as usize);
        self.next_value += 1;
        id
    }

    /// Claim a specific numeric id (advancing the fresh-id counter past it
    /// if necessary) instead of allocating the next one — for the parser,
    /// which must honor the source text's own `%N` numbering.
    pub fn reserve_value_id(&mut self, n: u32) -> ValueId {
        self.next_value = self.next_value.max(n + 1);
        ValueId::new(n as usize)
    }

    pub fn push_inst(&mut self, block: Block, inst: Instruction) -> Result<(), &'static str> {
        self.blocks[block].push(inst)
    }

    pub fn block(&self, block: Block) -> &BasicBlock {
        &self.blocks[block]
    }

    pub fn block_mut(&mut self, block: Block) -> &mut BasicBlock {
        &mut self.blocks[block]
    }

    pub fn block_by_label(&self, label: &str) -> Option<Block> {
        self.blocks.keys().find(|&b| self.blocks[b].label == label)
    }

    /// Iterate blocks in their insertion (= textual) order.
    pub fn blocks_in_order(&self) -> impl Iterator<Item = (Block, &BasicBlock)> {
        self.blocks.iter()
    }

    /// Every reachable block is terminated exactly once, an entry block
    /// exists, and labels are unique. This is a cheap shape check a builder
    /// can call eagerly; the full verifier (`viper-verify`) additionally
    /// checks types, dominance, and EH discipline.
    pub fn is_well_formed_shape(&self) -> bool {
        if self.entry().is_none() {
            return false;
        }
        let mut labels = std::collections::HashSet::new();
        for (_, b) in self.blocks.iter() {
            if !b.terminated {
                return false;
            }
            if !labels.insert(b.label.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Opcode;
    use crate::instr::Instruction as Inst;

    #[test]
    fn entry_is_first_created_block() {
        let mut f = Function::new("main", Type::I64, vec![]);
        let entry = f.create_block("entry");
        assert_eq!(f.entry(), Some(entry));
    }

    #[test]
    fn well_formed_requires_all_blocks_terminated() {
        let mut f = Function::new("main", Type::I64, vec![]);
        let entry = f.create_block("entry");
        assert!(!f.is_well_formed_shape());
        f.push_inst(entry, Inst::new(Opcode::Ret)).unwrap();
        assert!(f.is_well_formed_shape());
    }

    #[test]
    fn fresh_values_are_unique() {
        let mut f = Function::new("main", Type::I64, vec![]);
        let a = f.fresh_value();
        let b = f.fresh_value();
        assert_ne!(a, b);
    }
}
