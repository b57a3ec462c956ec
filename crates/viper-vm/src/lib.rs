//! The stepping VM interpreter (`L8`, §4.5) and the `Runner` façade (§6)
//! embedders are expected to use instead of touching [`Vm`] directly.
//!
//! Single-threaded per instance (§5): a [`Vm`] owns its frame stack, SSA
//! value store, opcode counters, trap snapshot, and resume-token registry,
//! and executes one instruction at a time on the calling thread. Extern
//! calls are dispatched through [`viper_runtime`]; the active-VM guard that
//! attributes trap context to the right instance lives there, not here.

mod frame;
mod interp;
mod runner;
mod step_result;
mod trap_info;
mod value;
mod vm;

pub use runner::Runner;
pub use step_result::{RunStatus, StepResult};
pub use trap_info::{TrapInfo, TrapKind};
pub use value::RuntimeValue;
pub use vm::{PauseHandle, RunConfig, Vm};
