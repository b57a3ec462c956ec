//! P4 (`eh.push`/`eh.pop` nest and release like a stack) and P5 (branch
//! targets always receive the argument count and types their target block
//! declares), exercised end to end through the textual parser rather than
//! by constructing IR by hand.

use viper::reader::parse_module;
use viper::verify::verify;

fn verifies(src: &str) -> Result<(), viper_support::DiagnosticList> {
    let module = parse_module(src).unwrap_or_else(|e| panic!("{src:?} failed to parse: {e}"));
    verify(&module)
}

/// P4: a lone `eh.push` with no matching `eh.pop` before `ret` is rejected.
#[test]
fn unreleased_eh_push_is_rejected() {
    let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    eh.push ^h;\n    ret;\nh:\n    eh.entry;\n    ret;\n}\n";
    let err = verifies(src).expect_err("unmatched eh.push must fail");
    assert!(err.contains_code("verify.eh.unreleased"));
}

/// P4: a push immediately followed by its pop on every path is accepted.
#[test]
fn balanced_eh_push_pop_is_accepted() {
    let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    eh.push ^h;\n    eh.pop;\n    ret;\nh:\n    eh.entry;\n    ret;\n}\n";
    let diags = verifies(src);
    if let Err(diags) = diags {
        assert!(!diags.contains_code("verify.eh.unreleased"), "{diags}");
    }
}

/// P4: nested pushes pop off in LIFO order — popping twice for two pushes,
/// on every path, still balances.
#[test]
fn nested_eh_push_pop_balances_like_a_stack() {
    let src = "il 0.2.0\n\
               func @f() -> void {\n\
               entry:\n\
                 eh.push ^h1;\n\
                 eh.push ^h2;\n\
                 eh.pop;\n\
                 eh.pop;\n\
                 ret;\n\
               h1:\n\
                 eh.entry;\n\
                 ret;\n\
               h2:\n\
                 eh.entry;\n\
                 ret;\n\
               }\n";
    let diags = verifies(src);
    if let Err(diags) = diags {
        assert!(!diags.contains_code("verify.eh.unreleased"), "{diags}");
    }
}

/// P5: branching to a block declaring one `i64` parameter with zero
/// arguments is an arity mismatch.
#[test]
fn branch_arity_mismatch_is_rejected() {
    let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    br ^t();\nt(%0: i64):\n    ret;\n}\n";
    let err = verifies(src).expect_err("arity mismatch must fail");
    assert!(err.contains_code("verify.branch.arity"));
}

/// P5: branching with the right argument count but the wrong type for a
/// declared block parameter is a type mismatch, not silently accepted.
#[test]
fn branch_argument_type_mismatch_is_rejected() {
    let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    br ^t(1:i32);\nt(%0: i64):\n    ret;\n}\n";
    let err = verifies(src).expect_err("type mismatch must fail");
    assert!(err.contains_code("verify.type.mismatch") || err.contains_code("verify.branch.arity"));
}

/// P5: matching arity and types at every branch in a small diamond CFG
/// verifies cleanly.
#[test]
fn matching_branch_arity_and_types_verifies() {
    let src = "il 0.2.0\nfunc @pick(i1) -> i64 {\nentry(%0: i1):\n    cbr %0 ^t(1:i64) ^f(0:i64);\nt(%2: i64):\n    ret %2;\nf(%3: i64):\n    ret %3;\n}\n";
    verifies(src).expect("well-formed branches must verify");
}
