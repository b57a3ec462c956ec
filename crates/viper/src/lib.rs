//! Umbrella crate for the Viper toolchain core.
//!
//! Re-exports the pieces a frontend or a test harness needs without
//! depending on each subsystem crate individually, the same role
//! `cranelift-umbrella` plays over `cranelift-codegen`/`cranelift-frontend`
//! in the corpus this toolchain's layering follows. Nothing here adds new
//! behaviour beyond [`parse_and_verify`], a convenience most callers of
//! "parse, then verify" would otherwise write by hand at every call site.

pub use viper_ir as ir;
pub use viper_lower as lower;
pub use viper_machinst as machinst;
pub use viper_reader as reader;
pub use viper_runtime as runtime;
pub use viper_support as support;
pub use viper_verify as verify;
pub use viper_vm as vm;
pub use viper_aarch64 as aarch64;

use viper_ir::Module;
use viper_support::DiagnosticList;

/// Parse IL text and run the verifier over the result in one call — the
/// pipeline step `§2`'s data-flow diagram draws as "L3 serializes / L4
/// verifies" taken from the parser side.
///
/// Both a parse failure and a verify failure are reported as a
/// [`DiagnosticList`] (the parser already collects its own `parse.*`-coded
/// diagnostics the same shape the verifier does), distinguished by which
/// [`PipelineError`] variant carries it so callers can tell which pass
/// rejected the input.
pub fn parse_and_verify(text: &str) -> Result<Module, PipelineError> {
    let module = viper_reader::parse_module(text).map_err(PipelineError::Parse)?;
    viper_verify::verify(&module).map_err(PipelineError::Verify)?;
    Ok(module)
}

#[derive(Debug)]
pub enum PipelineError {
    Parse(DiagnosticList),
    Verify(DiagnosticList),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Parse(diags) => write!(f, "parse failed with {} diagnostic(s): {diags}", diags.len()),
            PipelineError::Verify(diags) => {
                write!(f, "verification failed with {} diagnostic(s): {diags}", diags.len())
            }
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_verify_accepts_a_well_formed_module() {
        let src = "il 0.2.0\nfunc @f() -> i64 {\nentry:\n    ret 1:i64;\n}\n";
        assert!(parse_and_verify(src).is_ok());
    }

    #[test]
    fn parse_and_verify_surfaces_a_verify_error() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    eh.push ^h;\n    ret;\nh:\n    eh.entry;\n    ret;\n}\n";
        match parse_and_verify(src) {
            Err(PipelineError::Verify(diags)) => assert!(diags.contains_code("verify.eh.unreleased")),
            other => panic!("expected a verify error, got {other:?}"),
        }
    }
}
