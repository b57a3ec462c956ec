//! The literal end-to-end scenarios named in the design notes (S1-S3): one
//! fixture each, run through the real parse/verify/lower pipeline rather
//! than against any one subsystem in isolation.

use viper::ir::{Function, IrBuilder, Module, Opcode, Type, Value, Version};
use viper::lower::{lower_select_case_numeric, BlockNamer, NumericArm, DIAG_SELECT_CASE_LABEL_RANGE};
use viper::vm::Runner;
use viper_support::{DiagnosticList, SourceLoc};

/// S1 - a `call.indirect @callee` round-trips through parse/serialize and
/// runs to the callee's return value.
#[test]
fn s1_call_indirect_round_trip_and_run() {
    let src = "il 0.2.0\n\
               func @callee() -> i64 {\n\
               entry:\n\
                 ret 7:i64;\n\
               }\n\
               func @main() -> i64 {\n\
               entry:\n\
                 %0 = call.indirect i64 @callee;\n\
                 ret %0;\n\
               }\n";

    let module = viper::parse_and_verify(src).expect("S1 module parses and verifies");
    let reserialized = viper::ir::write_module(&module);
    let reparsed = viper_reader::parse_module(&reserialized).expect("reserialized text reparses");
    assert_eq!(reparsed.functions.len(), module.functions.len());

    let mut runner = Runner::with_module(module);
    assert_eq!(runner.run(), 7);
}

/// S2 - a module with an unmatched `eh.push` fails verification with
/// `verify.eh.unreleased` and the expected message substring.
#[test]
fn s2_unbalanced_eh_push_is_rejected() {
    let src = "il 0.2.0\n\
               func @f() -> void {\n\
               entry:\n\
                 eh.push ^h;\n\
                 ret;\n\
               h:\n\
                 eh.entry;\n\
                 ret;\n\
               }\n";
    let module = viper_reader::parse_module(src).expect("lexically valid");
    let err = viper::verify::verify(&module).expect_err("unmatched eh.push must fail verification");
    assert!(err.contains_code("verify.eh.unreleased"));
    assert!(err.iter().any(|d| d.message.contains("unmatched eh.push depth")));
}

/// S3 - `SELECT CASE` with arms `CASE 1, 2 TO 5` and `CASE 9999999999`: the
/// out-of-range label is reported and dropped, the in-range discrete label
/// and range arm still reach a `switch.i32`/comparison chain.
#[test]
fn s3_select_case_drops_out_of_range_label_but_keeps_the_rest() {
    let mut func = Function::new("classify", Type::I64, vec![Type::I32]);
    let entry = func.create_block("entry");
    let mut builder = IrBuilder::new(&mut func);
    builder.set_current(entry);
    let mut namer = BlockNamer::new();
    let mut diags = DiagnosticList::new();
    let selector = Value::const_int(Type::I32, 1);

    let arms = vec![
        NumericArm {
            discrete_labels: vec![1],
            ranges: vec![(2, 5)],
            guards: vec![],
            lower_body: Box::new(|b: &mut IrBuilder| {
                b.emit_ret(Some(Value::const_int(Type::I64, 100)), SourceLoc::UNKNOWN);
            }),
        },
        NumericArm {
            discrete_labels: vec![9_999_999_999],
            ranges: vec![],
            guards: vec![],
            lower_body: Box::new(|b: &mut IrBuilder| {
                b.emit_ret(Some(Value::const_int(Type::I64, 200)), SourceLoc::UNKNOWN);
            }),
        },
    ];
    let end = lower_select_case_numeric(&mut builder, &mut namer, selector, arms, None, &mut diags, SourceLoc::UNKNOWN);
    builder.set_current(end);
    builder.emit_ret(Some(Value::const_int(Type::I64, 0)), SourceLoc::UNKNOWN);

    assert!(diags.contains_code(DIAG_SELECT_CASE_LABEL_RANGE));
    assert!(diags.iter().any(|d| d.message.contains("9999999999")));

    let dispatch = func
        .blocks_in_order()
        .map(|(_, b)| b)
        .find(|b| b.terminator().map(|t| t.opcode) == Some(Opcode::SwitchI32))
        .expect("a block ending in switch.i32 exists");
    let switch = dispatch.terminator().unwrap();
    assert_eq!(switch.switch_cases.len(), 1, "only the in-range discrete label 1 becomes a switch case");

    let mut module = Module::new(Version::new(0, 2, Some(0)));
    module.add_function(func);
    viper::verify::verify(&module).expect("the rest of the lowered module still verifies");
}
