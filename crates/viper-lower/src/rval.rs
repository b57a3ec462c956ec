//! `RVal` and expression-type tracking (§4.2).
//!
//! The lowerer never mutates IL ad hoc to coerce a value from one type to
//! another; every coercion is expressed as an explicit opcode sequence on an
//! `(Value, Type)` pair, exactly as §4.2 requires.

use viper_ir::{Block, Instruction, IrBuilder, Opcode, Type, Value};
use viper_support::SourceLoc;

/// A materialised expression: the IL value that holds it plus its declared
/// type, tracked together so coercions never have to re-derive the type from
/// the value's shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RVal {
    pub value: Value,
    pub ty: Type,
}

impl RVal {
    pub fn new(value: Value) -> Self {
        RVal { ty: value.ty, value }
    }
}

/// Append a single-operand instruction producing a typed result at the
/// builder's current block — the shape `IrBuilder::emit_binop` uses
/// internally, exposed here for the unary conversion opcodes the builder
/// itself has no dedicated helper for (`sitofp`, `fptosi`, `sext`, `zext`, …).
fn push_unop(builder: &mut IrBuilder, op: Opcode, result_ty: Type, operand: Value, loc: SourceLoc) -> Value {
    let block: Block = builder.current().expect("no current block set");
    let id = builder.func_mut().fresh_value();
    let mut inst = Instruction::new(op).with_result(id, result_ty).with_loc(loc);
    inst.operands.push(operand);
    builder.func_mut().push_inst(block, inst).expect("unop emitted after terminator");
    Value::temp(id, result_ty)
}

/// Widen `rval` to `i64`, the width every numeric comparison is performed at
/// (§4.3 "widen to 64 bits for comparisons"). Booleans zero-extend (`Zext1`,
/// since sign-extending a `1` bit would yield `-1`); everything else narrower
/// than `i64` sign-extends.
pub fn ensure_i64(builder: &mut IrBuilder, rval: RVal, loc: SourceLoc) -> RVal {
    if rval.ty == Type::I64 {
        return rval;
    }
    let op = if rval.ty == Type::I1 { Opcode::Zext1 } else { Opcode::Sext };
    RVal::new(push_unop(builder, op, Type::I64, rval.value, loc))
}

/// Narrow `rval` to `i32`, the width the discrete `switch.i32` jump table
/// dispatches on (§4.3 "narrow to 32 bits for the discrete jump table").
pub fn narrow_to_i32(builder: &mut IrBuilder, rval: RVal, loc: SourceLoc) -> RVal {
    if rval.ty == Type::I32 {
        return rval;
    }
    RVal::new(push_unop(builder, Opcode::Sext, Type::I32, rval.value, loc))
}

/// Zero-extend an `i1` condition to `i64` (`"extend-bool-to-i64"`, §4.2).
pub fn extend_bool_to_i64(builder: &mut IrBuilder, cond: RVal, loc: SourceLoc) -> RVal {
    debug_assert_eq!(cond.ty, Type::I1, "extend_bool_to_i64 requires an i1 operand");
    RVal::new(push_unop(builder, Opcode::Zext1, Type::I64, cond.value, loc))
}

/// `sitofp`: signed integer to `f64`.
pub fn int_to_float(builder: &mut IrBuilder, rval: RVal, loc: SourceLoc) -> RVal {
    RVal::new(push_unop(builder, Opcode::Sitofp, Type::F64, rval.value, loc))
}

/// `fptosi`: `f64` to a signed integer of the requested width.
pub fn float_to_int(builder: &mut IrBuilder, rval: RVal, result_ty: Type, loc: SourceLoc) -> RVal {
    debug_assert_eq!(rval.ty, Type::F64, "float_to_int requires an f64 operand");
    RVal::new(push_unop(builder, Opcode::Fptosi, result_ty, rval.value, loc))
}
