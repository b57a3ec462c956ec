//! The IL verifier (`L4`): structural, typing, SSA-dominance, and EH-region
//! checks (§4.4).
//!
//! Verification is total (§4.4, §7): [`verify`] either returns `Ok(())` or a
//! non-empty [`DiagnosticList`] collecting every independent violation it
//! could find, never stopping at the first error. Passes run in the order
//! given in §4.4; later passes still run even if an earlier one failed, so
//! e.g. a module with both a duplicate function name and a dangling branch
//! target reports both in one call.

mod cfg;
mod eh;
mod function_shape;
mod module_shape;
mod ssa_types;

use viper_ir::Module;
use viper_support::DiagnosticList;

/// Run every verifier pass over `module`, collecting diagnostics from all of
/// them rather than stopping at the first failing pass.
pub fn verify(module: &Module) -> Result<(), DiagnosticList> {
    let mut diags = DiagnosticList::new();

    log::debug!("verify: module_shape pass");
    module_shape::verify(module, &mut diags);
    log::debug!("verify: function_shape pass ({} functions)", module.functions.len());
    for f in &module.functions {
        function_shape::verify(f, &mut diags);
    }
    // SSA dominance and EH discipline both assume a shape-valid CFG (an
    // entry block, reachable via terminators); skip them for a function
    // whose shape pass already failed rather than cascading nonsense
    // diagnostics from a malformed graph.
    log::debug!("verify: ssa_types + eh passes");
    for f in &module.functions {
        if f.entry().is_none() {
            continue;
        }
        ssa_types::verify(module, f, &mut diags);
        eh::verify(f, &mut diags);
    }

    if diags.has_errors() {
        log::warn!("verify: module failed with {} diagnostic(s)", diags.iter().count());
        Err(diags)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_reader::parse_module;

    #[test]
    fn accepts_the_call_indirect_round_trip_scenario() {
        let src = "il 0.2.0\nfunc @callee() -> i64 {\nentry:\n    ret 7:i64;\n}\nfunc @main() -> i64 {\nentry:\n    %0 = call.indirect @callee;\n    ret %0;\n}\n";
        let m = parse_module(src).unwrap();
        assert!(verify(&m).is_ok());
    }

    #[test]
    fn rejects_unbalanced_eh_push() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    eh.push ^h;\n    ret;\nh:\n    eh.entry;\n    ret;\n}\n";
        let m = parse_module(src).unwrap();
        let err = verify(&m).unwrap_err();
        assert!(err.contains_code("verify.eh.unreleased"));
        assert!(err.iter().any(|d| d.message.contains("unmatched eh.push depth")));
    }

    #[test]
    fn rejects_dangling_branch_target_arity() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    br ^t(1:i64);\nt:\n    ret;\n}\n";
        let m = parse_module(src).unwrap();
        let err = verify(&m).unwrap_err();
        assert!(err.contains_code("verify.branch.arity"));
    }
}
