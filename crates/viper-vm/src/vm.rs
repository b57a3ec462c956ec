//! The interpreter core (§4.5): frame stack, SSA value store (split across
//! frames), opcode counters, breakpoints, step budget, and trap snapshot —
//! "each VM owns its frame stack, SSA value store, opcode counters, trap
//! snapshot, and resume-token registry."

use crate::frame::Frame;
use crate::step_result::{RunStatus, StepResult};
use crate::trap_info::TrapInfo;
use crate::value::RuntimeValue;
use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use viper_ir::{Global, Module, Opcode};
use viper_runtime::ExternRegistry;
use viper_support::SourceLoc;

/// What an `alloca`/`global_addr`-produced [`RuntimeValue::Ptr`] handle
/// refers to. There is no address-of-function opcode in the IL (§9 Open
/// Question), so function handles are never minted — `call.indirect`
/// through a bare pointer operand always traps.
pub(crate) enum PtrTarget {
    Alloca,
    Global(Global),
}

/// Outcome of executing exactly one instruction, internal to the
/// interpreter — [`StepResult`] is the public shape `step()` returns.
pub(crate) enum Outcome {
    Advanced,
    Halted(i64),
    Trapped(TrapInfo),
}

/// A plain struct literal configuring a [`crate::runner::Runner`], matching
/// the original `il::vm::RunConfig`/`DebugCtrl` shape (§4 recovered
/// details) rather than a loaded configuration file.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub max_steps: Option<u64>,
    pub breakpoints: Vec<SourceLoc>,
}

/// A handle a caller can use to request cooperative pause from another
/// thread (§5 "external pause signalling"), observed at the top of every
/// `step()`.
#[derive(Clone, Default)]
pub struct PauseHandle(pub(crate) Arc<AtomicBool>);

impl PauseHandle {
    pub fn request_pause(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A single-threaded stepping interpreter over one [`Module`] (§4.5
/// "Executor model. Single-threaded per VM instance. Multiple VMs on
/// different threads are independent and may run in parallel.").
pub struct Vm {
    pub(crate) module: Arc<Module>,
    pub(crate) registry: Arc<ExternRegistry>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) allocas: Vec<RuntimeValue>,
    pub(crate) ptr_targets: HashMap<u64, PtrTarget>,
    pub(crate) global_ptr_cache: HashMap<Global, u64>,
    pub(crate) next_ptr_handle: u64,
    pub(crate) next_resume_token: u64,
    opcode_counts: HashMap<Opcode, u64>,
    instruction_count: u64,
    breakpoints: HashSet<SourceLoc>,
    breakpoint_suppressed: bool,
    max_steps: Option<u64>,
    last_trap: Option<TrapInfo>,
    halted: bool,
    started: bool,
    exit_code: i64,
    pause: Arc<AtomicBool>,
}

impl Vm {
    pub fn new(module: Arc<Module>, registry: Arc<ExternRegistry>, config: RunConfig) -> Self {
        let mut vm = Vm {
            module,
            registry,
            frames: Vec::new(),
            allocas: Vec::new(),
            ptr_targets: HashMap::new(),
            global_ptr_cache: HashMap::new(),
            next_ptr_handle: 1,
            next_resume_token: 1,
            opcode_counts: HashMap::new(),
            instruction_count: 0,
            breakpoints: HashSet::new(),
            breakpoint_suppressed: false,
            max_steps: config.max_steps,
            last_trap: None,
            halted: false,
            started: false,
            exit_code: 0,
            pause: Arc::new(AtomicBool::new(false)),
        };
        for bp in config.breakpoints {
            vm.breakpoints.insert(bp);
        }
        vm
    }

    pub fn pause_handle(&self) -> PauseHandle {
        PauseHandle(Arc::clone(&self.pause))
    }

    pub fn set_breakpoint(&mut self, loc: SourceLoc) {
        self.breakpoints.insert(loc);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn set_max_steps(&mut self, max: u64) {
        self.max_steps = Some(max);
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn last_trap(&self) -> Option<&TrapInfo> {
        self.last_trap.as_ref()
    }

    pub fn last_trap_message(&self) -> Option<String> {
        self.last_trap.as_ref().map(|t| t.message.clone())
    }

    pub fn opcode_counts(&self) -> &HashMap<Opcode, u64> {
        &self.opcode_counts
    }

    pub fn reset_opcode_counts(&mut self) {
        self.opcode_counts.clear();
    }

    /// The `n` most frequently executed opcodes so far, most frequent
    /// first, ties broken by mnemonic for determinism.
    pub fn top_opcodes(&self, n: usize) -> Vec<(Opcode, u64)> {
        let mut counts: Vec<(Opcode, u64)> = self.opcode_counts.iter().map(|(&o, &c)| (o, c)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.mnemonic().cmp(b.0.mnemonic())));
        counts.truncate(n);
        counts
    }

    pub(crate) fn record_opcode(&mut self, op: Opcode) {
        *self.opcode_counts.entry(op).or_insert(0) += 1;
    }

    fn start_entry(&mut self) -> Option<TrapInfo> {
        self.started = true;
        let Some(func_index) = self.module.functions.iter().position(|f| f.name == "main") else {
            return Some(TrapInfo {
                kind: crate::trap_info::TrapKind::Invariant,
                code: None,
                ip: 0,
                line: 0,
                function: String::new(),
                message: "module declares no `@main` function".to_string(),
            });
        };
        let Some(entry) = self.module.functions[func_index].entry() else {
            return Some(TrapInfo {
                kind: crate::trap_info::TrapKind::Invariant,
                code: None,
                ip: 0,
                line: 0,
                function: "main".to_string(),
                message: "`@main` has no entry block".to_string(),
            });
        };
        self.frames.push(Frame::new(func_index, entry));
        None
    }

    fn current_loc(&self) -> Option<SourceLoc> {
        let frame = self.frames.last()?;
        let func = &self.module.functions[frame.func_index];
        let block = func.block(frame.block);
        block.insts.get(frame.pc).map(|i| i.loc)
    }

    /// Execute exactly one instruction, initialising the entry frame on the
    /// first call (§4.5 "Stepping").
    pub fn step(&mut self) -> StepResult {
        if self.halted {
            return StepResult::Halted;
        }
        if self.pause.load(Ordering::Relaxed) {
            return StepResult::Paused;
        }
        if !self.started {
            if let Some(trap) = self.start_entry() {
                self.last_trap = Some(trap);
                self.halted = true;
                return StepResult::Trapped;
            }
        }
        if let Some(max) = self.max_steps {
            if self.instruction_count >= max {
                return StepResult::Paused;
            }
        }

        if let Some(loc) = self.current_loc() {
            if loc.is_valid() && self.breakpoints.contains(&loc) && !self.breakpoint_suppressed {
                self.breakpoint_suppressed = true;
                return StepResult::BreakpointHit;
            }
        }
        self.breakpoint_suppressed = false;

        match self.execute_current() {
            Outcome::Advanced => {
                self.instruction_count += 1;
                StepResult::Advanced
            }
            Outcome::Halted(code) => {
                self.instruction_count += 1;
                self.halted = true;
                self.exit_code = code;
                StepResult::Halted
            }
            Outcome::Trapped(info) => {
                self.instruction_count += 1;
                self.last_trap = Some(info);
                self.halted = true;
                StepResult::Trapped
            }
        }
    }

    /// Loop `step()` until a terminal condition, honouring breakpoints, the
    /// step budget, and external pause signalling (§4.5 "continueRun").
    pub fn continue_run(&mut self) -> RunStatus {
        loop {
            match self.step() {
                StepResult::Advanced => continue,
                StepResult::Halted => return RunStatus::Completed,
                StepResult::BreakpointHit => return RunStatus::BreakpointHit,
                StepResult::Trapped => return RunStatus::Trapped,
                StepResult::Paused => {
                    return if self.pause.load(Ordering::Relaxed) {
                        RunStatus::Paused
                    } else {
                        RunStatus::StepBudgetExceeded
                    };
                }
            }
        }
    }

    /// Run to completion, ignoring breakpoints/budget (both left at their
    /// configured defaults), returning the exit code (§6 "run() -> i64").
    /// A trap or an unset step budget exhaustion both yield `0`, matching a
    /// POSIX process that was killed rather than exited normally.
    pub fn run_to_exit_code(&mut self) -> i64 {
        loop {
            match self.continue_run() {
                RunStatus::Completed => return self.exit_code,
                RunStatus::Trapped => return 0,
                RunStatus::BreakpointHit => continue,
                RunStatus::Paused | RunStatus::StepBudgetExceeded => return 0,
            }
        }
    }
}
