//! The literal AArch64 end-to-end scenarios named in the design notes
//! (S4-S5): drives the real `select -> allocate -> apply_regalloc ->
//! build_frame -> peephole -> emit` pipeline over a hand-built module,
//! the same pipeline `viper-aarch64`'s own doc comment describes. Actually
//! assembling/linking/running the emitted text is the CLI driver's job
//! (`-run-native`), which is out of scope (§1 Non-goals) — these tests
//! assert on the emitted assembly text itself, per §8 S4/S5.

use viper::aarch64::{apply_regalloc, build_frame, emit_module, run_peephole, select_function, Platform};
use viper::ir::{ExternDecl, Function, IrBuilder, Module, Opcode, Type, Value, Version};
use viper::machinst::allocate;
use viper_support::SourceLoc;

fn compile_one(module: &Module, func: &Function, platform: Platform) -> String {
    let selection = select_function(module, func);
    let mut mir = selection.mir;
    let result = allocate(&mir, &selection.block_param_vregs);
    apply_regalloc(&mut mir, &result);
    build_frame(&mut mir, selection.locals_bytes, &result);
    run_peephole(&mut mir);
    emit_module(platform, module, &[mir])
}

/// S4 - a function passing ten `i64` arguments to an extern `@h`: the
/// first eight go in `x0..x7`, the remaining two overflow to the stack.
#[test]
fn s4_ten_argument_call_spills_two_to_the_stack() {
    let mut module = Module::new(Version::new(0, 2, Some(0)));
    module.declare_extern(ExternDecl { name: "h".to_string(), param_tys: vec![Type::I64; 10], ret_ty: Type::I64 });

    let mut func = Function::new("caller", Type::I64, vec![]);
    let entry = func.create_block("entry");
    let mut b = IrBuilder::new(&mut func);
    b.set_current(entry);
    let args: Vec<Value> = (1..=10).map(|n| Value::const_int(Type::I64, n)).collect();
    let result = b.emit_call("h", args, Type::I64, SourceLoc::UNKNOWN).unwrap();
    b.emit_ret(Some(result), SourceLoc::UNKNOWN);

    let asm = compile_one(&module, &func, Platform::Linux);
    assert!(asm.contains("sub sp, sp, #16"), "{asm}");
    assert!(asm.contains("[sp, #0]"), "{asm}");
    assert!(asm.contains("[sp, #8]"), "{asm}");
    assert!(asm.contains("bl h"), "{asm}");
    assert!(asm.contains("add sp, sp, #16"), "{asm}");
}

/// S4 (Darwin variant) - the same call mangles the callee with a leading
/// underscore, per §4.6 "On Apple platforms, external symbols are prefixed
/// with `_`."
#[test]
fn s4_darwin_mangles_the_callee_symbol() {
    let mut module = Module::new(Version::new(0, 2, Some(0)));
    module.declare_extern(ExternDecl { name: "h".to_string(), param_tys: vec![Type::I64; 10], ret_ty: Type::I64 });

    let mut func = Function::new("caller", Type::I64, vec![]);
    let entry = func.create_block("entry");
    let mut b = IrBuilder::new(&mut func);
    b.set_current(entry);
    let args: Vec<Value> = (1..=10).map(|n| Value::const_int(Type::I64, n)).collect();
    let result = b.emit_call("h", args, Type::I64, SourceLoc::UNKNOWN).unwrap();
    b.emit_ret(Some(result), SourceLoc::UNKNOWN);

    let asm = compile_one(&module, &func, Platform::Darwin);
    assert!(asm.contains("bl _h"), "{asm}");
}

/// S5 - `@sum10(a..j)` returning their sum: ten `i64` parameters, so two
/// arrive over the stack per the AAPCS64 subset (§4.6), and the function
/// body adds all ten into its return value. Structural assertion only —
/// assembling and running the emitted text is the out-of-scope CLI driver.
#[test]
fn s5_sum10_adds_all_ten_parameters() {
    let module = Module::new(Version::new(0, 2, Some(0)));

    let mut func = Function::new("sum10", Type::I64, vec![Type::I64; 10]);
    let entry = func.create_block_with_params("entry", &[Type::I64; 10]);
    let param_ids: Vec<_> = func.block(entry).params.iter().map(|p| p.id).collect();
    let mut b = IrBuilder::new(&mut func);
    b.set_current(entry);
    let mut acc = Value::block_param(param_ids[0], Type::I64);
    for &id in &param_ids[1..] {
        acc = b.emit_binop(Opcode::Add, Type::I64, acc, Value::block_param(id, Type::I64), SourceLoc::UNKNOWN);
    }
    b.emit_ret(Some(acc), SourceLoc::UNKNOWN);

    let asm = compile_one(&module, &func, Platform::Linux);
    // Two incoming stack parameters are loaded from the caller's outgoing
    // slots relative to this function's own (post-prologue) sp.
    assert!(asm.contains("ldr"), "expected at least one incoming-stack-param load:\n{asm}");
    assert!(asm.contains("add"), "expected add instructions summing the ten parameters:\n{asm}");
    assert!(asm.contains("ret"), "{asm}");
}

/// P6 - a function with no `call` instruction never saves the frame-link
/// pair, even when the allocator needed callee-saved registers for
/// something else (§4.6, §9 Open Questions leaf-function clarification).
#[test]
fn p6_call_free_function_has_no_frame_link_save() {
    let module = Module::new(Version::new(0, 2, Some(0)));
    let mut func = Function::new("add_three", Type::I64, vec![Type::I64, Type::I64, Type::I64]);
    let entry = func.create_block_with_params("entry", &[Type::I64, Type::I64, Type::I64]);
    let ids: Vec<_> = func.block(entry).params.iter().map(|p| p.id).collect();
    let mut b = IrBuilder::new(&mut func);
    b.set_current(entry);
    let ab = b.emit_binop(
        Opcode::Add,
        Type::I64,
        Value::block_param(ids[0], Type::I64),
        Value::block_param(ids[1], Type::I64),
        SourceLoc::UNKNOWN,
    );
    let sum = b.emit_binop(Opcode::Add, Type::I64, ab, Value::block_param(ids[2], Type::I64), SourceLoc::UNKNOWN);
    b.emit_ret(Some(sum), SourceLoc::UNKNOWN);

    let asm = compile_one(&module, &func, Platform::Linux);
    assert!(!asm.contains("stp x29, x30"), "leaf function must not save the frame link:\n{asm}");
}

/// L3 - the register allocator is deterministic: allocating the same MIR
/// twice (fresh selection each time, since `allocate` consumes by
/// reference) produces identical assignments and therefore byte-identical
/// assembly.
#[test]
fn l3_repeated_allocation_is_byte_identical() {
    let module = Module::new(Version::new(0, 2, Some(0)));
    let mut func = Function::new("twice", Type::I64, vec![Type::I64, Type::I64]);
    let entry = func.create_block_with_params("entry", &[Type::I64, Type::I64]);
    let ids: Vec<_> = func.block(entry).params.iter().map(|p| p.id).collect();
    let mut b = IrBuilder::new(&mut func);
    b.set_current(entry);
    let sum = b.emit_binop(
        Opcode::Add,
        Type::I64,
        Value::block_param(ids[0], Type::I64),
        Value::block_param(ids[1], Type::I64),
        SourceLoc::UNKNOWN,
    );
    b.emit_ret(Some(sum), SourceLoc::UNKNOWN);

    let asm1 = compile_one(&module, &func, Platform::Linux);
    let asm2 = compile_one(&module, &func, Platform::Linux);
    assert_eq!(asm1, asm2);
}
