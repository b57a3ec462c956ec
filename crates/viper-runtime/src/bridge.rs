//! The runtime bridge proper (§4.5): the procedure the VM runs to invoke an
//! extern once it decides the call isn't to a module-defined function.

use crate::registry::{ArgValue, ExternRegistry};
use crate::trap::{push_context, vm_trap, TrapContext, TrapSignal};

/// Pack `args`, set the trap context for the duration of the call, invoke
/// the host function, and translate a host-side `Err` into a [`TrapSignal`]
/// carrying the context that was active when it fired.
///
/// Returns `Ok(None)` if `name` isn't registered at all — the caller (the
/// VM) is expected to have already confirmed the call isn't to a
/// module-defined function, so an unknown name here is the caller's bug,
/// not a trappable runtime condition; callers that want a proper error
/// should check [`ExternRegistry::is_registered`] first.
pub fn call_extern(
    registry: &ExternRegistry,
    name: &str,
    args: &[ArgValue],
    ctx: TrapContext,
) -> Option<Result<Option<ArgValue>, TrapSignal>> {
    let desc = registry.lookup(name)?;
    let _guard = push_context(ctx);
    Some((desc.func)(args).map_err(vm_trap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ExternDesc;
    use std::sync::Arc;
    use viper_ir::Type;
    use viper_support::SourceLoc;

    fn ctx() -> TrapContext {
        TrapContext { function: "main".into(), block: "entry".into(), loc: SourceLoc::new(1, 1, 0) }
    }

    #[test]
    fn unknown_extern_returns_none() {
        let registry = ExternRegistry::new();
        assert!(call_extern(&registry, "rt_nope", &[], ctx()).is_none());
    }

    #[test]
    fn a_trapping_extern_captures_its_call_site() {
        let mut registry = ExternRegistry::new();
        registry
            .register(ExternDesc {
                name: "rt_trap".into(),
                param_tys: vec![],
                ret_ty: Type::Void,
                func: Arc::new(|_| Err("boom".into())),
            })
            .unwrap();
        let result = call_extern(&registry, "rt_trap", &[], ctx()).unwrap();
        let signal = result.unwrap_err();
        assert_eq!(signal.message, "boom");
        assert_eq!(signal.context, Some(ctx()));
    }
}
