//! Invariant-violation mode (§4.5, §7, §9): a process-wide setting
//! controlling whether a helper's internal consistency check that fails
//! aborts the process or raises a catchable trap.

use crate::trap::{vm_trap, TrapSignal};
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InvariantViolationMode {
    /// Abort the process immediately. The default, matching native
    /// assertion-failure behaviour.
    #[default]
    Abort,
    /// Route to `vm_trap`, producing a recoverable trap instead.
    Trap,
}

type Handler = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct State {
    mode: InvariantViolationMode,
    handler: Option<Handler>,
}

fn state() -> &'static Mutex<State> {
    static STATE: OnceLock<Mutex<State>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(State { mode: InvariantViolationMode::Abort, handler: None }))
}

pub fn set_invariant_violation_mode(mode: InvariantViolationMode) {
    state().lock().unwrap().mode = mode;
}

pub fn invariant_violation_mode() -> InvariantViolationMode {
    state().lock().unwrap().mode
}

/// Install a handler consulted before `Abort`/`Trap` is applied; returning
/// `true` suppresses the violation entirely (the helper that raised it
/// continues as if nothing happened).
pub fn set_invariant_violation_handler(handler: impl Fn(&str) -> bool + Send + Sync + 'static) {
    state().lock().unwrap().handler = Some(Box::new(handler));
}

pub fn clear_invariant_violation_handler() {
    state().lock().unwrap().handler = None;
}

/// What a helper should do when it detects an internal invariant violation:
/// either it was suppressed by an installed handler, it should abort right
/// here, or it should return a [`TrapSignal`] for the caller to propagate.
pub enum ViolationOutcome {
    Suppressed,
    Abort,
    Trap(TrapSignal),
}

pub fn report_invariant_violation(message: &str) -> ViolationOutcome {
    let (mode, suppressed) = {
        let s = state().lock().unwrap();
        let suppressed = s.handler.as_ref().is_some_and(|h| h(message));
        (s.mode, suppressed)
    };
    if suppressed {
        return ViolationOutcome::Suppressed;
    }
    match mode {
        InvariantViolationMode::Abort => ViolationOutcome::Abort,
        InvariantViolationMode::Trap => ViolationOutcome::Trap(vm_trap(message.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_to_abort_mode() {
        set_invariant_violation_mode(InvariantViolationMode::Abort);
        clear_invariant_violation_handler();
        assert!(matches!(report_invariant_violation("oops"), ViolationOutcome::Abort));
    }

    #[test]
    #[serial]
    fn trap_mode_routes_through_vm_trap() {
        set_invariant_violation_mode(InvariantViolationMode::Trap);
        clear_invariant_violation_handler();
        match report_invariant_violation("bad state") {
            ViolationOutcome::Trap(signal) => assert_eq!(signal.message, "bad state"),
            _ => panic!("expected a trap outcome"),
        }
        set_invariant_violation_mode(InvariantViolationMode::Abort);
    }

    #[test]
    #[serial]
    fn an_installed_handler_can_suppress_a_violation() {
        set_invariant_violation_mode(InvariantViolationMode::Abort);
        set_invariant_violation_handler(|msg| msg == "ignorable");
        assert!(matches!(report_invariant_violation("ignorable"), ViolationOutcome::Suppressed));
        assert!(matches!(report_invariant_violation("not ignorable"), ViolationOutcome::Abort));
        clear_invariant_violation_handler();
    }
}
