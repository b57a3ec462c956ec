//! The runtime bridge (`L7`, §4.5, §5, §9): everything that mediates calls
//! from the VM (and, by symbol name, from emitted native code) into
//! host-registered extern functions.
//!
//! Three pieces of process-wide mutable state live here, each with explicit
//! init/install semantics (§9 "Global mutable state"):
//!   - the [`registry::ExternRegistry`] (read-mostly; register before running),
//!   - [`invariant::InvariantViolationMode`] and its optional handler,
//!   - the thread-local [`active_vm::ActiveVmGuard`] slot.

mod active_vm;
mod bridge;
mod invariant;
mod registry;
mod trap;

pub use active_vm::{active_ptr, ActiveVmGuard};
pub use bridge::call_extern;
pub use invariant::{
    clear_invariant_violation_handler, invariant_violation_mode, report_invariant_violation,
    set_invariant_violation_handler, set_invariant_violation_mode, InvariantViolationMode, ViolationOutcome,
};
pub use registry::{ArgValue, CallFrame, ExternDesc, ExternRegistry, HostFn, RegClass, RegistryError};
pub use trap::{active_context, push_context, vm_trap, TrapContext, TrapContextGuard, TrapSignal};
