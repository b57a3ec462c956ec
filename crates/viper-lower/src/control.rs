//! WHILE/DO/FOR/FOREACH/REPEAT and TRY/CATCH lowering (§4.3 "Other control
//! constructs").

use crate::block_namer::BlockNamer;
use viper_ir::{Block, IrBuilder, Type, Value};
use viper_support::SourceLoc;

fn seal<'s>(builder: &mut IrBuilder, block: Block, body: Box<dyn FnOnce(&mut IrBuilder) + 's>, fallthrough: Block, loc: SourceLoc) {
    builder.set_current(block);
    body(builder);
    if !builder.current_is_terminated() {
        builder.emit_br(fallthrough, vec![], loc);
    }
}

/// `head → body → tail`, the shape shared by WHILE and DO-WHILE (§4.3): a
/// `head` block re-evaluates the condition every iteration, branching into
/// `body` or out to `tail`.
///
/// `lower_cond` receives the head block (already current) and returns the
/// `i1` condition value; `lower_body` lowers the loop body, falling through
/// back to `head` when control reaches its end without a terminator.
pub fn lower_while_do<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    lower_cond: impl FnOnce(&mut IrBuilder) -> Value + 's,
    lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
    loc: SourceLoc,
) -> Block {
    let head = builder.add_block(namer.name("while_head"));
    let body = builder.add_block(namer.name("while_body"));
    let tail = builder.add_block(namer.name("while_tail"));

    builder.emit_br(head, vec![], loc);
    builder.set_current(head);
    let cond = lower_cond(builder);
    builder.emit_cbr(cond, body, vec![], tail, vec![], loc);

    seal(builder, body, lower_body, head, loc);

    builder.set_current(tail);
    tail
}

/// A classic counted FOR loop: `init → head (test) → body → incr → head`,
/// with a dedicated increment block (§4.3: "a dedicated increment block for
/// FOR").
pub fn lower_for<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    lower_init: impl FnOnce(&mut IrBuilder) + 's,
    lower_cond: impl FnOnce(&mut IrBuilder) -> Value + 's,
    lower_incr: impl FnOnce(&mut IrBuilder) + 's,
    lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
    loc: SourceLoc,
) -> Block {
    lower_init(builder);

    let head = builder.add_block(namer.name("for_head"));
    let body = builder.add_block(namer.name("for_body"));
    let incr = builder.add_block(namer.name("for_incr"));
    let tail = builder.add_block(namer.name("for_tail"));

    builder.emit_br(head, vec![], loc);
    builder.set_current(head);
    let cond = lower_cond(builder);
    builder.emit_cbr(cond, body, vec![], tail, vec![], loc);

    seal(builder, body, lower_body, incr, loc);

    builder.set_current(incr);
    lower_incr(builder);
    if !builder.current_is_terminated() {
        builder.emit_br(head, vec![], loc);
    }

    builder.set_current(tail);
    tail
}

/// `FOREACH`: structurally identical to [`lower_for`] — an iterator-state
/// "has next" test in `head` and an element fetch folded into `body`'s own
/// lowering — so it is expressed directly in terms of it.
pub fn lower_foreach<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    lower_init: impl FnOnce(&mut IrBuilder) + 's,
    lower_has_next: impl FnOnce(&mut IrBuilder) -> Value + 's,
    lower_advance: impl FnOnce(&mut IrBuilder) + 's,
    lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
    loc: SourceLoc,
) -> Block {
    lower_for(builder, namer, lower_init, lower_has_next, lower_advance, lower_body, loc)
}

/// `REPEAT … UNTIL cond`: body runs at least once, then `tail` tests the
/// condition to decide whether to loop again.
pub fn lower_repeat<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    lower_body: Box<dyn FnOnce(&mut IrBuilder) + 's>,
    lower_cond: impl FnOnce(&mut IrBuilder) -> Value + 's,
    loc: SourceLoc,
) -> Block {
    let body = builder.add_block(namer.name("repeat_body"));
    let test = builder.add_block(namer.name("repeat_test"));
    let tail = builder.add_block(namer.name("repeat_tail"));

    builder.emit_br(body, vec![], loc);
    seal(builder, body, lower_body, test, loc);

    builder.set_current(test);
    let cond = lower_cond(builder);
    builder.emit_cbr(cond, tail, vec![], body, vec![], loc);

    builder.set_current(tail);
    tail
}

/// `TRY/CATCH`: `eh.push ^handler` guards the protected region, `eh.pop`
/// releases the guard once it completes normally, and the handler enters
/// with `eh.entry` to receive `(%err: Error, %tok: ResumeTok)` (§4.3).
pub fn lower_try_catch<'s>(
    builder: &mut IrBuilder,
    namer: &mut BlockNamer,
    lower_protected: Box<dyn FnOnce(&mut IrBuilder) + 's>,
    lower_handler: impl FnOnce(&mut IrBuilder, Value, Value) + 's,
    loc: SourceLoc,
) -> Block {
    let handler = builder.add_block_with_params(namer.name("catch_handler"), &[Type::Error, Type::ResumeTok]);
    let end = builder.add_block(namer.name("try_end"));

    let mut push = viper_ir::Instruction::new(viper_ir::Opcode::EhPush).with_loc(loc);
    push.labels.push(builder.func().block(handler).label.clone());
    let protected_entry = builder.current().expect("try/catch lowered with no current block");
    builder.func_mut().push_inst(protected_entry, push).expect("eh.push emitted after terminator");

    lower_protected(builder);
    if !builder.current_is_terminated() {
        let pop = viper_ir::Instruction::new(viper_ir::Opcode::EhPop).with_loc(loc);
        let cur = builder.current().expect("protected region left no current block");
        builder.func_mut().push_inst(cur, pop).expect("eh.pop emitted after terminator");
        builder.emit_br(end, vec![], loc);
    }

    builder.set_current(handler);
    let entry_marker = viper_ir::Instruction::new(viper_ir::Opcode::EhEntry).with_loc(loc);
    builder.func_mut().push_inst(handler, entry_marker).expect("eh.entry emitted after terminator");
    let params = builder.block_params(handler);
    let (err_id, err_ty) = params[0];
    let (tok_id, tok_ty) = params[1];
    lower_handler(builder, Value::block_param(err_id, err_ty), Value::block_param(tok_id, tok_ty));
    if !builder.current_is_terminated() {
        builder.emit_br(end, vec![], loc);
    }

    builder.set_current(end);
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Opcode, Version};

    #[test]
    fn while_loop_wires_head_body_tail() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        lower_while_do(
            &mut b,
            &mut namer,
            |b: &mut IrBuilder| b.emit_cmp(Opcode::IcmpEq, Value::const_int(Type::I64, 0), Value::const_int(Type::I64, 0), SourceLoc::UNKNOWN),
            Box::new(|_b: &mut IrBuilder| {}),
            SourceLoc::UNKNOWN,
        );
        b.emit_ret(None, SourceLoc::UNKNOWN);
        assert_eq!(b.func().block(entry).insts[0].opcode, Opcode::Br);
    }

    #[test]
    fn for_loop_has_a_dedicated_increment_block() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        lower_for(
            &mut b,
            &mut namer,
            |_b: &mut IrBuilder| {},
            |b: &mut IrBuilder| b.emit_cmp(Opcode::IcmpEq, Value::const_int(Type::I64, 0), Value::const_int(Type::I64, 0), SourceLoc::UNKNOWN),
            |_b: &mut IrBuilder| {},
            Box::new(|_b: &mut IrBuilder| {}),
            SourceLoc::UNKNOWN,
        );
        b.emit_ret(None, SourceLoc::UNKNOWN);
        assert!(b.func().blocks_in_order().any(|(_, blk)| blk.label.starts_with("for_incr")));
    }

    #[test]
    fn try_catch_balances_push_and_pop() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut namer = BlockNamer::new();
        lower_try_catch(
            &mut b,
            &mut namer,
            Box::new(|_b: &mut IrBuilder| {}),
            |b: &mut IrBuilder, _err, _tok| {
                b.emit_ret(None, SourceLoc::UNKNOWN);
            },
            SourceLoc::UNKNOWN,
        );
        b.emit_ret(None, SourceLoc::UNKNOWN);
        let has_push = b.func().blocks_in_order().any(|(_, blk)| blk.insts.iter().any(|i| i.opcode == Opcode::EhPush));
        let has_pop = b.func().blocks_in_order().any(|(_, blk)| blk.insts.iter().any(|i| i.opcode == Opcode::EhPop));
        assert!(has_push && has_pop);
        let _ = Version::new(0, 2, Some(0));
    }
}
