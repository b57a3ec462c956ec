//! Virtual and interface dispatch (§4.2 "Virtual and interface dispatch").

use crate::runtime_abi::ensure_extern;
use viper_ir::{IrBuilder, Module, Type, Value};
use viper_support::SourceLoc;

const RT_VTABLE_LOOKUP: &str = "rt_vtable_lookup";
const RT_GET_INTERFACE_IMPL: &str = "rt_get_interface_impl";

/// `rt_vtable_lookup(%obj, %static_tid, slot) → %fn` followed by
/// `call.indirect %fn(%obj, args…)` — a virtual method call resolved through
/// the statically-known declaring type's vtable slot.
pub fn emit_virtual_call(
    module: &mut Module,
    builder: &mut IrBuilder,
    obj: Value,
    static_tid: Value,
    slot: i64,
    args: Vec<Value>,
    ret_ty: Type,
    loc: SourceLoc,
) -> Option<Value> {
    ensure_extern(module, RT_VTABLE_LOOKUP, &[Type::Ptr, Type::I64, Type::I64], Type::Ptr);
    let slot_val = Value::const_int(Type::I64, slot);
    let fn_ptr = builder
        .emit_call(RT_VTABLE_LOOKUP, vec![obj, static_tid, slot_val], Type::Ptr, loc)
        .expect("rt_vtable_lookup always returns a function pointer");
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(obj);
    call_args.extend(args);
    builder.emit_call_indirect_computed(fn_ptr, call_args, ret_ty, loc)
}

/// `rt_get_interface_impl(%obj, %iface_tid, slot) → %fn` followed by
/// `call.indirect %fn(%obj, args…)` — the interface-dispatch counterpart of
/// [`emit_virtual_call`]. Interface implementors are expected to have
/// registered their itables via a synthesised `@__<lang>_iface_init`
/// initialiser before this runs (§4.2); registering that initialiser is a
/// frontend concern, out of scope here.
pub fn emit_interface_call(
    module: &mut Module,
    builder: &mut IrBuilder,
    obj: Value,
    iface_tid: Value,
    slot: i64,
    args: Vec<Value>,
    ret_ty: Type,
    loc: SourceLoc,
) -> Option<Value> {
    ensure_extern(module, RT_GET_INTERFACE_IMPL, &[Type::Ptr, Type::I64, Type::I64], Type::Ptr);
    let slot_val = Value::const_int(Type::I64, slot);
    let fn_ptr = builder
        .emit_call(RT_GET_INTERFACE_IMPL, vec![obj, iface_tid, slot_val], Type::Ptr, loc)
        .expect("rt_get_interface_impl always returns a function pointer");
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(obj);
    call_args.extend(args);
    builder.emit_call_indirect_computed(fn_ptr, call_args, ret_ty, loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Version};

    #[test]
    fn virtual_call_resolves_through_vtable_lookup_then_indirect_call() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let obj = Value::const_int(Type::Ptr, 1);
        let tid = Value::const_int(Type::I64, 7);
        let result = emit_virtual_call(&mut m, &mut b, obj, tid, 2, vec![], Type::I64, SourceLoc::UNKNOWN);
        assert!(result.is_some());
        assert!(m.extern_by_name(RT_VTABLE_LOOKUP).is_some());
        let insts = &b.func().block(entry).insts;
        assert_eq!(insts.len(), 2, "one call to rt_vtable_lookup, then one call.indirect");
        assert_eq!(insts[0].opcode, viper_ir::Opcode::Call);
        assert_eq!(insts[1].opcode, viper_ir::Opcode::CallIndirect);
    }
}
