//! A minimal IL builder.
//!
//! Frontends never poke at [`Function`]/[`BasicBlock`] fields directly;
//! they go through an `IrBuilder`, which tracks "the current block" the way
//! the original lowerer's `ctx.function()`/`ctx.current()` pair did, and
//! keeps the terminated-block invariant honoured on every `push`.

use crate::block::BlockParam;
use crate::entities::{Block, ValueId};
use crate::instr::{BranchTarget, Instruction, Opcode};
use crate::types::Type;
use crate::value::Value;
use smallvec::SmallVec;
use viper_support::SourceLoc;

/// Borrows a [`Function`](crate::function::Function) and tracks the
/// insertion point.
pub struct IrBuilder<'f> {
    func: &'f mut crate::function::Function,
    current: Option<Block>,
}

impl<'f> IrBuilder<'f> {
    pub fn new(func: &'f mut crate::function::Function) -> Self {
        IrBuilder { func, current: None }
    }

    pub fn current(&self) -> Option<Block> {
        self.current
    }

    pub fn set_current(&mut self, block: Block) {
        self.current = Some(block);
    }

    pub fn func(&self) -> &crate::function::Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut crate::function::Function {
        self.func
    }

    /// Create a new block without changing the current insertion point —
    /// matches `builder->addBlock` in the original lowerer, which always
    /// restored the caller's cursor afterwards.
    pub fn add_block(&mut self, label: impl Into<String>) -> Block {
        self.func.create_block(label)
    }

    pub fn add_block_with_params(&mut self, label: impl Into<String>, param_tys: &[Type]) -> Block {
        self.func.create_block_with_params(label, param_tys)
    }

    pub fn block_params(&self, block: Block) -> Vec<(ValueId, Type)> {
        self.func.block(block).params.iter().map(|p| (p.id, p.ty)).collect()
    }

    fn push(&mut self, inst: Instruction) -> Result<Option<ValueId>, &'static str> {
        let block = self.current.expect("no current block set");
        let result = inst.result;
        self.func.push_inst(block, inst)?;
        Ok(result)
    }

    pub fn emit_binop(&mut self, op: Opcode, ty: Type, lhs: Value, rhs: Value, loc: SourceLoc) -> Value {
        let id = self.func.fresh_value();
        let operands: SmallVec<[Value; 3]> = SmallVec::from_vec(vec![lhs, rhs]);
        self.push(Instruction::new(op).with_result(id, ty).with_operands(operands).with_loc(loc))
            .expect("binop emitted after terminator");
        Value::temp(id, ty)
    }

    pub fn emit_cmp(&mut self, op: Opcode, lhs: Value, rhs: Value, loc: SourceLoc) -> Value {
        self.emit_binop(op, Type::I1, lhs, rhs, loc)
    }

    pub fn emit_call(&mut self, callee: &str, args: Vec<Value>, ret_ty: Type, loc: SourceLoc) -> Option<Value> {
        let mut inst = Instruction::new(Opcode::Call).with_loc(loc);
        inst.labels.push(callee.to_string());
        inst.operands = SmallVec::from_vec(args);
        if ret_ty == Type::Void {
            inst.result_ty = Type::Void;
            self.push(inst).expect("call emitted after terminator");
            None
        } else {
            let id = self.func.fresh_value();
            inst.result = Some(id);
            inst.result_ty = ret_ty;
            self.push(inst).expect("call emitted after terminator");
            Some(Value::temp(id, ret_ty))
        }
    }

    /// `call.indirect` through a computed function pointer (the usual vtable
    /// / itable dispatch shape, §4.2): `fn_ptr` becomes the first operand.
    pub fn emit_call_indirect_computed(
        &mut self,
        fn_ptr: Value,
        args: Vec<Value>,
        ret_ty: Type,
        loc: SourceLoc,
    ) -> Option<Value> {
        let mut operands = SmallVec::with_capacity(args.len() + 1);
        operands.push(fn_ptr);
        operands.extend(args);
        self.push_call_indirect(operands, &[], ret_ty, loc)
    }

    /// `call.indirect` naming the callee directly, e.g. `call.indirect @callee`
    /// (§8 S1) — dispatched dynamically by the VM rather than resolved at
    /// lowering time, unlike a plain `call`.
    pub fn emit_call_indirect_named(
        &mut self,
        callee: &str,
        args: Vec<Value>,
        ret_ty: Type,
        loc: SourceLoc,
    ) -> Option<Value> {
        self.push_call_indirect(SmallVec::from_vec(args), &[callee.to_string()], ret_ty, loc)
    }

    fn push_call_indirect(
        &mut self,
        operands: SmallVec<[Value; 3]>,
        labels: &[String],
        ret_ty: Type,
        loc: SourceLoc,
    ) -> Option<Value> {
        let mut inst = Instruction::new(Opcode::CallIndirect).with_loc(loc);
        inst.operands = operands;
        inst.labels = SmallVec::from_slice(labels);
        if ret_ty == Type::Void {
            inst.result_ty = Type::Void;
            self.push(inst).expect("call.indirect emitted after terminator");
            None
        } else {
            let id = self.func.fresh_value();
            inst.result = Some(id);
            inst.result_ty = ret_ty;
            self.push(inst).expect("call.indirect emitted after terminator");
            Some(Value::temp(id, ret_ty))
        }
    }

    pub fn emit_br(&mut self, target: Block, args: Vec<Value>, loc: SourceLoc) {
        let inst = Instruction::new(Opcode::Br)
            .with_targets([BranchTarget::new(target, args)])
            .with_loc(loc);
        self.push(inst).expect("br emitted after terminator");
    }

    pub fn emit_cbr(
        &mut self,
        cond: Value,
        then_blk: Block,
        then_args: Vec<Value>,
        else_blk: Block,
        else_args: Vec<Value>,
        loc: SourceLoc,
    ) {
        let mut inst = Instruction::new(Opcode::Cbr).with_loc(loc);
        inst.operands.push(cond);
        inst.targets =
            SmallVec::from_vec(vec![BranchTarget::new(then_blk, then_args), BranchTarget::new(else_blk, else_args)]);
        self.push(inst).expect("cbr emitted after terminator");
    }

    pub fn emit_ret(&mut self, value: Option<Value>, loc: SourceLoc) {
        let mut inst = Instruction::new(Opcode::Ret).with_loc(loc);
        if let Some(v) = value {
            inst.operands.push(v);
        }
        self.push(inst).expect("ret emitted after terminator");
    }

    pub fn emit_trap(&mut self, loc: SourceLoc) {
        self.push(Instruction::new(Opcode::Trap).with_loc(loc)).expect("trap emitted after terminator");
    }

    /// `true` if the current block has already been terminated (control
    /// fell off the end of a lowered statement sequence and the caller must
    /// decide whether to synthesize a fallthrough branch — §4.3 "Arm
    /// bodies").
    pub fn current_is_terminated(&self) -> bool {
        self.current.map(|b| self.func.block(b).terminated).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    #[test]
    fn emits_binop_and_advances_cursor_state() {
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let lhs = Value::const_int(Type::I64, 1);
        let rhs = Value::const_int(Type::I64, 2);
        let sum = b.emit_binop(Opcode::Add, Type::I64, lhs, rhs, SourceLoc::UNKNOWN);
        b.emit_ret(Some(sum), SourceLoc::UNKNOWN);
        assert!(b.current_is_terminated());
    }
}
