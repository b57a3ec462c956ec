//! `SELECT CASE` lowering (§4.3), the hardest specialised lowerer and the
//! one every other match-like statement generalises to.

use crate::block_namer::BlockNamer;
use crate::rval::{ensure_i64, narrow_to_i32, RVal};
use crate::strings::StringInterner;
use viper_ir::{Block, BranchTarget, Instruction, IrBuilder, Module, Opcode, SwitchCase, Type, Value};
use viper_support::{Diagnostic, DiagnosticList, SourceLoc};

/// Stable code for a `CASE` label outside the 32-bit signed range (§6, §8
/// S3). Named after the original semantic-analysis diagnostic rather than
/// following the `verify.*`/`parse.*` dotted convention, matching the one
/// example given in §6.
pub const DIAG_SELECT_CASE_LABEL_RANGE: &str = "DiagSelectCaseLabelRange";

/// A relational guard's comparison operator (`CASE < n`, `CASE >= n`, …).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

fn signed_cmp_opcode(op: CmpOp) -> Opcode {
    match op {
        CmpOp::Lt => Opcode::ScmpLt,
        CmpOp::Le => Opcode::ScmpLe,
        CmpOp::Gt => Opcode::ScmpGt,
        CmpOp::Ge => Opcode::ScmpGe,
        CmpOp::Eq => Opcode::IcmpEq,
        CmpOp::Ne => Opcode::IcmpNe,
    }
}

/// One arm of a numeric `SELECT CASE`: zero or more discrete labels, zero or
/// more inclusive ranges, zero or more relational guards, and a body.
pub struct NumericArm<'s> {
    pub discrete_labels: Vec<i64>,
    pub ranges: Vec<(i64, i64)>,
    pub guards: Vec<(CmpOp, Value)>,
    pub lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
}

/// One arm of a string `SELECT CASE`: zero or more discrete string labels and
/// a body.
pub struct StringArm<'s> {
    pub labels: Vec<Vec<u8>>,
    pub lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
}

fn finish_body<'s>(builder: &mut IrBuilder, block: Block, body: Box<dyn FnOnce(&mut IrBuilder) + 's>, end: Block, loc: SourceLoc) {
    builder.set_current(block);
    body(builder);
    if !builder.current_is_terminated() {
        builder.emit_br(end, vec![], loc);
    }
}

/// Lower a numeric `SELECT CASE` per §4.3's block-skeleton/comparison-plan
/// algorithm. Returns the `end` block, left as the builder's current block.
///
/// Out-of-range discrete labels (outside the signed 32-bit range) are
/// dropped with a [`DIAG_SELECT_CASE_LABEL_RANGE`] diagnostic; lowering
/// continues with the remaining labels (§4.3 "Failure semantics").
pub fn lower_select_case_numeric<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    selector: Value,
    arms: Vec<NumericArm<'s>>,
    default_body: Option<Box<dyn FnOnce(&mut IrBuilder) + 's>>,
    diags: &mut DiagnosticList,
    loc: SourceLoc,
) -> Block {
    let entry = builder.current().expect("select_case lowered with no current block");

    // Block skeleton (§4.3 "Block skeleton").
    let arm_blocks: Vec<Block> = arms.iter().map(|_| builder.add_block(namer.name("select_arm"))).collect();
    let default_block = default_body.as_ref().map(|_| builder.add_block(namer.name("select_default")));
    let needs_dispatch = arms.iter().any(|a| !a.ranges.is_empty() || !a.guards.is_empty());
    let dispatch_block = if needs_dispatch { Some(builder.add_block(namer.name("select_dispatch"))) } else { None };
    let end_block = builder.add_block(namer.name("select_end"));

    builder.set_current(entry);
    let wide = ensure_i64(builder, RVal::new(selector), loc);

    // Comparison-plan chain: one entry per relational guard, one per range,
    // then a default sentinel (§4.3 "Numeric dispatch").
    let mut cur = entry;
    for (i, arm) in arms.iter().enumerate() {
        for (op, rhs) in &arm.guards {
            builder.set_current(cur);
            let cond = builder.emit_cmp(signed_cmp_opcode(*op), wide.value, *rhs, loc);
            let next = builder.add_block(namer.name("select_guard_next"));
            builder.emit_cbr(cond, arm_blocks[i], vec![], next, vec![], loc);
            cur = next;
        }
        for (lo, hi) in &arm.ranges {
            builder.set_current(cur);
            let ge_lo = builder.emit_cmp(Opcode::ScmpGe, wide.value, Value::const_int(Type::I64, *lo), loc);
            let check_hi = builder.add_block(namer.name("select_range_hi"));
            let next = builder.add_block(namer.name("select_range_next"));
            builder.emit_cbr(ge_lo, check_hi, vec![], next, vec![], loc);
            builder.set_current(check_hi);
            let le_hi = builder.emit_cmp(Opcode::ScmpLe, wide.value, Value::const_int(Type::I64, *hi), loc);
            builder.emit_cbr(le_hi, arm_blocks[i], vec![], next, vec![], loc);
            cur = next;
        }
    }

    if needs_dispatch {
        // The final falsy target is the dispatch block whenever the chain
        // actually ran (§4.3: "The final falsy target is the dispatch block
        // (when ranges present)...").
        builder.set_current(cur);
        builder.emit_br(dispatch_block.unwrap(), vec![], loc);
        builder.set_current(dispatch_block.unwrap());
    }
    // Otherwise `cur == entry`: no guard/range exists anywhere, so the
    // discrete switch below is simply emitted in the entry block.

    let narrow32 = narrow_to_i32(builder, wide, loc);
    let switch_default = default_block.unwrap_or(end_block);
    let mut cases = Vec::new();
    for (i, arm) in arms.iter().enumerate() {
        for &label in &arm.discrete_labels {
            match i32::try_from(label) {
                Ok(l) => cases.push(SwitchCase { label: l, target: BranchTarget::new(arm_blocks[i], vec![]) }),
                Err(_) => diags.push(
                    Diagnostic::error(
                        DIAG_SELECT_CASE_LABEL_RANGE,
                        format!("CASE label {label} is outside the 32-bit signed range and was dropped"),
                    )
                    .with_loc(loc),
                ),
            }
        }
    }
    let mut switch_inst = Instruction::new(Opcode::SwitchI32).with_loc(loc);
    switch_inst.operands.push(narrow32.value);
    switch_inst.targets = [BranchTarget::new(switch_default, vec![])].into_iter().collect();
    switch_inst.switch_cases = cases;
    let switch_home = builder.current().expect("dispatch block is current");
    builder.func_mut().push_inst(switch_home, switch_inst).expect("switch.i32 emitted after terminator");

    // Arm bodies (§4.3 "Arm bodies").
    for (i, arm) in arms.into_iter().enumerate() {
        finish_body(builder, arm_blocks[i], arm.lower_body, end_block, loc);
    }
    if let (Some(block), Some(body)) = (default_block, default_body) {
        finish_body(builder, block, body, end_block, loc);
    }

    builder.set_current(end_block);
    end_block
}

/// Lower a string `SELECT CASE`: no jump table, just a comparison chain
/// invoking `rt_str_eq` per arm (§4.3 "String dispatch").
pub fn lower_select_case_string<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    module: &mut Module,
    interner: &mut StringInterner,
    selector: Value,
    arms: Vec<StringArm<'s>>,
    default_body: Option<Box<dyn FnOnce(&mut IrBuilder) + 's>>,
    loc: SourceLoc,
) -> Block {
    crate::runtime_abi::ensure_extern(module, "rt_str_eq", &[Type::Str, Type::Str], Type::I1);

    let entry = builder.current().expect("select_case lowered with no current block");
    let arm_blocks: Vec<Block> = arms.iter().map(|_| builder.add_block(namer.name("select_str_arm"))).collect();
    let default_block = default_body.as_ref().map(|_| builder.add_block(namer.name("select_default")));
    let end_block = builder.add_block(namer.name("select_end"));
    let default_target = default_block.unwrap_or(end_block);

    builder.set_current(entry);
    let mut cur = entry;
    for (i, arm) in arms.iter().enumerate() {
        for label in &arm.labels {
            builder.set_current(cur);
            let lit = interner.emit_const_str(module, builder, label, loc);
            let eq = builder
                .emit_call("rt_str_eq", vec![selector, lit], Type::I1, loc)
                .expect("rt_str_eq always returns a value");
            let next = builder.add_block(namer.name("select_str_next"));
            builder.emit_cbr(eq, arm_blocks[i], vec![], next, vec![], loc);
            cur = next;
        }
    }
    // Falls through to the default on failure; if there were no string
    // labels at all, `cur == entry` and this branches straight there (§4.3
    // "If there are no string labels, branch directly to the default block").
    builder.set_current(cur);
    builder.emit_br(default_target, vec![], loc);

    for (i, arm) in arms.into_iter().enumerate() {
        finish_body(builder, arm_blocks[i], arm.lower_body, end_block, loc);
    }
    if let (Some(block), Some(body)) = (default_block, default_body) {
        finish_body(builder, block, body, end_block, loc);
    }

    builder.set_current(end_block);
    end_block
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Version};

    fn new_fn() -> Function {
        Function::new("f", Type::I64, vec![])
    }

    #[test]
    fn discrete_and_range_arms_produce_chain_plus_switch() {
        let mut f = new_fn();
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        let mut diags = DiagnosticList::new();
        let selector = Value::const_int(Type::I32, 3);

        let arms = vec![
            NumericArm {
                discrete_labels: vec![1],
                ranges: vec![],
                guards: vec![],
                lower_body: Box::new(|b: &mut IrBuilder| {
                    b.emit_ret(Some(Value::const_int(Type::I64, 10)), SourceLoc::UNKNOWN);
                }),
            },
            NumericArm {
                discrete_labels: vec![],
                ranges: vec![(2, 5)],
                guards: vec![],
                lower_body: Box::new(|b: &mut IrBuilder| {
                    b.emit_ret(Some(Value::const_int(Type::I64, 20)), SourceLoc::UNKNOWN);
                }),
            },
        ];
        let end = lower_select_case_numeric(&mut b, &mut namer, selector, arms, None, &mut diags, SourceLoc::UNKNOWN);
        b.emit_ret(Some(Value::const_int(Type::I64, 0)), SourceLoc::UNKNOWN);
        assert!(diags.is_empty());
        assert!(b.func().block(end).terminated);
    }

    #[test]
    fn out_of_range_label_is_dropped_with_a_diagnostic() {
        let mut f = new_fn();
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        let mut diags = DiagnosticList::new();
        let selector = Value::const_int(Type::I32, 1);

        let arms = vec![
            NumericArm {
                discrete_labels: vec![1, 2],
                ranges: vec![],
                guards: vec![],
                lower_body: Box::new(|_b: &mut IrBuilder| {}),
            },
            NumericArm {
                discrete_labels: vec![9_999_999_999],
                ranges: vec![],
                guards: vec![],
                lower_body: Box::new(|_b: &mut IrBuilder| {}),
            },
        ];
        lower_select_case_numeric(&mut b, &mut namer, selector, arms, None, &mut diags, SourceLoc::UNKNOWN);
        assert!(diags.contains_code(DIAG_SELECT_CASE_LABEL_RANGE));
        assert!(diags.iter().any(|d| d.message.contains("9999999999")));

        // The block carrying the switch has only the in-range labels.
        let dispatch = b
            .func()
            .blocks_in_order()
            .map(|(_, blk)| blk)
            .find(|blk| blk.terminator().map(|t| t.opcode) == Some(Opcode::SwitchI32))
            .expect("a block ending in switch.i32 exists");
        let switch = dispatch.terminator().unwrap();
        assert_eq!(switch.switch_cases.len(), 2);
    }

    #[test]
    fn no_string_labels_branches_straight_to_default() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = new_fn();
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        let mut interner = StringInterner::new();
        let selector = interner.emit_const_str(&mut m, &mut b, b"x", SourceLoc::UNKNOWN);
        let default_body: Box<dyn FnOnce(&mut IrBuilder)> = Box::new(|b: &mut IrBuilder| {
            b.emit_ret(None, SourceLoc::UNKNOWN);
        });
        lower_select_case_string(&mut b, &mut namer, &mut m, &mut interner, selector, vec![], Some(default_body), SourceLoc::UNKNOWN);
        let insts = &b.func().block(entry).insts;
        assert_eq!(insts.len(), 2, "the selector's const_str, then the unconditional branch to default");
        assert_eq!(insts[1].opcode, Opcode::Br);
    }
}
