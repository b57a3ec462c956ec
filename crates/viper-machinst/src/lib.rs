//! Target-neutral Machine IR (`L9`) and linear-scan register allocator
//! (`L10`) (§4.6).
//!
//! This crate knows nothing about AArch64 encoding or AAPCS64 ABI rules
//! beyond the register-class split every modern calling convention shares
//! (integer/pointer values in a GPR file, `F64` in an FPR file); the
//! AArch64-specific instruction selector, prologue/epilogue, peephole pass
//! and assembly emitter live in the backend crate that selects into this
//! IR and runs [`regalloc::allocate`] over the result.

pub mod mir;
pub mod regalloc;
pub mod regs;

pub use mir::{CondCode, MInst, MemOperand, MirBlock, MirBlockId, MirFunction};
pub use regalloc::{allocate, Assignment, RegAllocResult};
pub use regs::{
    fpr_arg, gpr_arg, PReg, Reg, RegClass, VReg, CALLEE_SAVED_FPR, CALLEE_SAVED_GPR, CALLER_SAVED_FPR,
    CALLER_SAVED_GPR, SCRATCH_FPR, SCRATCH_GPR,
};
