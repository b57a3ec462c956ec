//! The two small result enums `step()`/`continueRun()` return (§4.5, §6).

/// What happened during one `step()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// One instruction executed normally; the VM is still running.
    Advanced,
    /// The entry function returned; `run_to_exit_code`/`Runner::run` can now
    /// read the exit code.
    Halted,
    /// The next instruction's source location matches a registered
    /// breakpoint; it has not executed yet.
    BreakpointHit,
    /// A trap was captured; see `last_trap()`.
    Trapped,
    /// An external pause request is set, or the step budget is exhausted;
    /// distinguished by `continue_run`'s `RunStatus`.
    Paused,
}

/// What happened during a `continue_run()` loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Trapped,
    BreakpointHit,
    StepBudgetExceeded,
    Paused,
}
