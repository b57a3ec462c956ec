//! Trap snapshots (§6, §7): what `step`/`continueRun` leave in `lastTrap()`
//! when a run stops with `Trapped`.

use viper_support::SourceLoc;

/// What raised the trap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapKind {
    /// `trap "literal message"`.
    Explicit,
    /// `trap.from_err %c` — an `Error`-typed operand carried the message.
    FromError,
    /// A registered extern called `vm_trap` (directly, or indirectly via a
    /// host function returning `Err`).
    Bridge,
    /// `call`/`call.indirect` named an extern with no registration at all.
    UnregisteredExtern,
    /// `call.indirect` through a pointer operand that does not resolve to
    /// any function in the module.
    InvalidIndirectTarget,
    /// An internal consistency check failed — routed through
    /// `report_invariant_violation` when the process-wide mode is `Trap`.
    Invariant,
}

/// A captured trap (§6 "Runtime traps"): enough to report to a user and
/// enough for `S6`'s cross-thread isolation property to be checked against.
#[derive(Clone, Debug, PartialEq)]
pub struct TrapInfo {
    pub kind: TrapKind,
    /// A stable short code for the trap site, when one applies (e.g. an
    /// opcode mnemonic); `None` for a free-form `trap "msg"`.
    pub code: Option<String>,
    /// Instruction count at the moment of the trap — a monotonic proxy for
    /// "instruction pointer" since the interpreter has no single global IP.
    pub ip: u64,
    pub line: u32,
    pub function: String,
    pub message: String,
}
