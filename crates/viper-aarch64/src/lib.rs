//! The AArch64 backend (`L11`, §4.6): IL → Machine IR instruction selection
//! honouring the AAPCS64 subset (`abi`), register-allocator-driven frame
//! layout (`frame`), the post-allocation peephole pass (`peephole`), and
//! deterministic assembly-text emission (`emit`).
//!
//! The target-neutral Machine IR and register allocator themselves live in
//! [`viper_machinst`] (`L9`/`L10`); this crate only selects into that IR and
//! emits out of it. The usual pipeline for one function is:
//! [`select::select_function`] → [`viper_machinst::allocate`] →
//! [`frame::apply_regalloc`] + [`frame::build_frame`] → [`peephole::run`] →
//! [`emit::emit_module`].

mod abi;
mod emit;
mod frame;
mod peephole;
mod select;

pub use abi::{classify_args, classify_params, outgoing_stack_bytes, ret_loc, round_up_16, ArgLoc};
pub use emit::{emit_module, Platform};
pub use frame::{apply_regalloc, build_frame};
pub use peephole::{run as run_peephole, PeepholeStats};
pub use select::{select_function, FuncSelection};
