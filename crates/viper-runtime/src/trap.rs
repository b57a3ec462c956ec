//! Trap context and `vm_trap` (§4.5, §7).
//!
//! Every extern invocation pushes a [`TrapContext`] describing where the
//! call originated before handing control to the host function; nested
//! extern calls (a runtime helper that itself calls back into another
//! extern) push their own context on top, and `activeContext()` always
//! answers for the innermost live call, matching the original's stack of
//! per-call contexts rather than a single slot.

use std::cell::RefCell;
use viper_support::SourceLoc;

/// Where an extern call (or the trap raised from inside one) originated.
#[derive(Clone, Debug, PartialEq)]
pub struct TrapContext {
    pub function: String,
    pub block: String,
    pub loc: SourceLoc,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<TrapContext>> = const { RefCell::new(Vec::new()) };
}

/// Scoped push of a trap context; pops it again on drop, so nested extern
/// calls compose by ordinary stack discipline even across `?`/early return.
pub struct TrapContextGuard {
    _private: (),
}

pub fn push_context(ctx: TrapContext) -> TrapContextGuard {
    CONTEXT_STACK.with(|s| s.borrow_mut().push(ctx));
    TrapContextGuard { _private: () }
}

impl Drop for TrapContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// The innermost live trap context on this thread, if any extern call is in
/// progress.
pub fn active_context() -> Option<TrapContext> {
    CONTEXT_STACK.with(|s| s.borrow().last().cloned())
}

/// A trap raised by a runtime helper: a message plus whatever context was
/// active when it fired. The VM (`viper-vm`) is what turns this into a
/// user-facing `TrapInfo` and a `Trapped` step result (§7).
#[derive(Clone, Debug, PartialEq)]
pub struct TrapSignal {
    pub message: String,
    pub context: Option<TrapContext>,
}

/// Called by runtime helpers (or the bridge itself, on a host function
/// returning `Err`) to signal failure. Captures whatever trap context is
/// currently active — there is no other way for a helper, which only sees
/// its own arguments, to know which function/block/loc it's running under.
pub fn vm_trap(message: impl Into<String>) -> TrapSignal {
    let message = message.into();
    log::debug!("vm_trap: {message}");
    TrapSignal { message, context: active_context() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_context_is_active_outside_any_guard() {
        assert_eq!(active_context(), None);
    }

    #[test]
    fn nested_contexts_compose_like_a_stack() {
        let outer = TrapContext { function: "f".into(), block: "entry".into(), loc: SourceLoc::UNKNOWN };
        let _g1 = push_context(outer.clone());
        assert_eq!(active_context(), Some(outer.clone()));
        {
            let inner = TrapContext { function: "g".into(), block: "b".into(), loc: SourceLoc::UNKNOWN };
            let _g2 = push_context(inner.clone());
            assert_eq!(active_context(), Some(inner));
        }
        assert_eq!(active_context(), Some(outer));
    }

    #[test]
    fn vm_trap_captures_the_active_context() {
        let ctx = TrapContext { function: "f".into(), block: "entry".into(), loc: SourceLoc::new(1, 4, 0) };
        let _g = push_context(ctx.clone());
        let signal = vm_trap("division by zero");
        assert_eq!(signal.message, "division by zero");
        assert_eq!(signal.context, Some(ctx));
    }
}
