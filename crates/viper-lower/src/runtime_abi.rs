//! Idempotent extern declaration for the runtime ABI helpers (§6 "Runtime
//! ABI names") that lowering services call into (`rt_str_eq`,
//! `rt_vtable_lookup`, …). The verifier's call-signature check (§4.4 pass 3)
//! requires every callee to be either a defined function or a declared
//! extern, so every lowering helper that emits a `call`/`call.indirect` to a
//! runtime helper routes through here first.

use viper_ir::{ExternDecl, Module, Type};

/// Declare `name` as an extern with the given signature if it hasn't been
/// declared yet; return the already-declared signature unchanged if it has.
pub fn ensure_extern(module: &mut Module, name: &str, param_tys: &[Type], ret_ty: Type) {
    if module.extern_by_name(name).is_some() {
        return;
    }
    module.declare_extern(ExternDecl { name: name.to_string(), param_tys: param_tys.to_vec(), ret_ty });
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::Version;

    #[test]
    fn declaring_twice_does_not_duplicate() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        ensure_extern(&mut m, "rt_str_eq", &[Type::Str, Type::Str], Type::I1);
        ensure_extern(&mut m, "rt_str_eq", &[Type::Str, Type::Str], Type::I1);
        assert_eq!(m.externs.values().filter(|d| d.name == "rt_str_eq").count(), 1);
    }
}
