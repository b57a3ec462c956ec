//! The opcode dispatcher (§3, §4.5): `Vm::execute_current` fetches the
//! instruction at the top frame's program counter and interprets it.

use crate::frame::{Frame, HandlerEntry, ResumeSite};
use crate::trap_info::{TrapInfo, TrapKind};
use crate::value::RuntimeValue;
use crate::vm::{Outcome, PtrTarget, Vm};
use viper_ir::{BranchTarget, Instruction, Opcode, Type, Value, ValueData};
use viper_support::SourceLoc;

/// Mask/sign-extend `raw` back to `ty`'s declared width. Integer types
/// narrower than 64 bits are all carried as `i64` internally (§3
/// `RuntimeValue`); every arithmetic/conversion result passes through this
/// so a value always round-trips through its declared width the same way
/// native code would.
fn narrow(ty: Type, raw: i64) -> i64 {
    match ty {
        Type::I1 => raw & 1,
        Type::I16 => raw as i16 as i64,
        Type::I32 => raw as i32 as i64,
        _ => raw,
    }
}

fn zero_extend(from: Type, raw: i64, to: Type) -> i64 {
    let bits = from.int_bits().unwrap_or(64);
    let mask: u64 = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    narrow(to, ((raw as u64) & mask) as i64)
}

struct TrapSite {
    function: String,
    block: String,
    loc: SourceLoc,
}

impl Vm {
    /// Read an operand's value, resolving constants/globals/SSA refs
    /// against the current top frame.
    fn read_operand(&mut self, v: &Value) -> RuntimeValue {
        match v.data {
            ValueData::ConstInt(i) => RuntimeValue::I64(narrow(v.ty, i)),
            ValueData::ConstFloat(f) => RuntimeValue::F64(f),
            ValueData::StrLit(g) => {
                let bytes = &self.module.globals[g].bytes;
                RuntimeValue::Str(String::from_utf8_lossy(bytes).into_owned().into())
            }
            ValueData::GlobalAddr(g) => RuntimeValue::Ptr(self.global_ptr(g)),
            ValueData::Temp(id) | ValueData::BlockParam(id) => self
                .frames
                .last()
                .and_then(|f| f.get(id))
                .cloned()
                .unwrap_or_else(|| panic!("%{} read before any definition reached it (verify() was skipped)", id.index())),
        }
    }

    fn global_ptr(&mut self, g: viper_ir::Global) -> u64 {
        if let Some(&h) = self.global_ptr_cache.get(&g) {
            return h;
        }
        let h = self.next_ptr_handle;
        self.next_ptr_handle += 1;
        self.ptr_targets.insert(h, PtrTarget::Global(g));
        self.global_ptr_cache.insert(g, h);
        h
    }

    fn alloc_ptr(&mut self, init: RuntimeValue) -> u64 {
        let h = self.next_ptr_handle;
        self.next_ptr_handle += 1;
        self.ptr_targets.insert(h, PtrTarget::Alloca);
        self.allocas.push(init);
        h
    }

    fn slot_index(&self, handle: u64) -> Option<usize> {
        match self.ptr_targets.get(&handle) {
            Some(PtrTarget::Alloca) => {
                // Handles are minted in the same order slots are pushed, so
                // the count of prior `Alloca` handles gives the slot index.
                Some(self.ptr_targets.iter().filter(|(&h, t)| h <= handle && matches!(t, PtrTarget::Alloca)).count() - 1)
            }
            _ => None,
        }
    }

    fn bind_block_params(&mut self, target: &BranchTarget) {
        let args: Vec<RuntimeValue> = target.args.iter().map(|a| self.read_operand(a)).collect();
        let frame = self.frames.last().unwrap();
        let func = &self.module.functions[frame.func_index];
        let dest = func.block(target.block);
        let ids: Vec<_> = dest.params.iter().map(|p| p.id).collect();
        let frame = self.frames.last_mut().unwrap();
        for (id, val) in ids.into_iter().zip(args) {
            frame.set(id, val);
        }
        frame.goto(target.block);
    }

    fn trap_site(&self) -> TrapSite {
        let frame = self.frames.last().unwrap();
        let func = &self.module.functions[frame.func_index];
        let block = func.block(frame.block);
        let loc = block.insts.get(frame.pc).map(|i| i.loc).unwrap_or(SourceLoc::UNKNOWN);
        TrapSite { function: func.name.clone(), block: block.label.clone(), loc }
    }

    /// Raise a trap. Unwinds frames looking for an active `eh.push` handler
    /// to deliver it to; if none is found anywhere on the stack, returns the
    /// final `Trapped` outcome captured at the *originating* site (so §8 P8
    /// holds even though unwinding may cross several frames).
    fn raise_trap(&mut self, kind: TrapKind, code: Option<String>, message: String) -> Outcome {
        let site = self.trap_site();
        log::debug!("trap: {:?} in {} at {} ({})", kind, site.function, site.block, message);
        loop {
            let Some(frame) = self.frames.last_mut() else {
                log::warn!("trap: unhandled {:?}, unwound past every frame", kind);
                return Outcome::Trapped(TrapInfo {
                    kind,
                    code,
                    ip: self.instruction_count(),
                    line: site.loc.line,
                    function: site.function,
                    message,
                });
            };
            if let Some(HandlerEntry { label }) = frame.handlers.pop() {
                let func = &self.module.functions[frame.func_index];
                let Some(target) = func.block_by_label(&label) else {
                    // Verifier-guaranteed to exist; defensively keep
                    // unwinding rather than panic if it somehow doesn't.
                    continue;
                };
                let token = self.next_resume_token;
                self.next_resume_token += 1;
                let resume_block = frame.block;
                let resume_index = frame.pc;
                let dest = func.block(target);
                let param_ids: Vec<_> = dest.params.iter().map(|p| p.id).collect();
                frame.active_resume = Some(ResumeSite { block: resume_block, index: resume_index, token });
                if let Some(&err_id) = param_ids.first() {
                    frame.set(err_id, RuntimeValue::Error(message.clone().into()));
                }
                if let Some(&tok_id) = param_ids.get(1) {
                    frame.set(tok_id, RuntimeValue::ResumeTok(token));
                }
                frame.goto(target);
                return Outcome::Advanced;
            }
            self.frames.pop();
        }
    }

    fn return_from_current(&mut self, result: Option<RuntimeValue>) -> Outcome {
        let popped = self.frames.pop().expect("ret executed with no active frame");
        match self.frames.last_mut() {
            None => {
                let code = result.and_then(|v| v.as_i64()).unwrap_or(0);
                Outcome::Halted(code)
            }
            Some(caller) => {
                if let (Some(id), Some(val)) = (current_call_result(caller, &self.module), result) {
                    caller.set(id, val);
                }
                caller.pc += 1;
                let _ = popped;
                Outcome::Advanced
            }
        }
    }

    fn dispatch_call(&mut self, inst: &Instruction, callee: &str) -> Outcome {
        let args: Vec<RuntimeValue> = inst.operands.iter().map(|o| self.read_operand(o)).collect();
        if let Some(idx) = self.module.functions.iter().position(|f| f.name == callee) {
            let entry = self.module.functions[idx]
                .entry()
                .unwrap_or_else(|| panic!("callee `{callee}` has no entry block (verify() was skipped)"));
            let param_ids: Vec<_> = {
                let entry_block = self.module.functions[idx].block(entry);
                entry_block.params.iter().map(|p| p.id).collect()
            };
            let mut frame = Frame::new(idx, entry);
            for (id, arg) in param_ids.into_iter().zip(args) {
                frame.set(id, arg);
            }
            self.frames.push(frame);
            return Outcome::Advanced;
        }

        if !self.registry.is_registered(callee) {
            return self.raise_trap(
                TrapKind::UnregisteredExtern,
                Some(callee.to_string()),
                format!("call to unregistered extern `{callee}`"),
            );
        }
        let host_args: Vec<viper_runtime::ArgValue> = args
            .iter()
            .map(|v| match v {
                RuntimeValue::F64(f) => viper_runtime::ArgValue::F64(*f),
                RuntimeValue::I64(i) => viper_runtime::ArgValue::I64(*i),
                other => viper_runtime::ArgValue::Handle(other.as_i64().unwrap_or(0) as u64),
            })
            .collect();
        let site = self.trap_site();
        let ctx = viper_runtime::TrapContext { function: site.function, block: site.block, loc: site.loc };
        match viper_runtime::call_extern(&self.registry, callee, &host_args, ctx) {
            None => unreachable!("is_registered checked above"),
            Some(Ok(ret)) => {
                if let (Some(id), Some(arg)) = (inst.result, ret) {
                    let frame = self.frames.last_mut().unwrap();
                    let val = match arg {
                        viper_runtime::ArgValue::I64(i) => RuntimeValue::I64(narrow(inst.result_ty, i)),
                        viper_runtime::ArgValue::F64(f) => RuntimeValue::F64(f),
                        viper_runtime::ArgValue::Handle(h) => RuntimeValue::Ptr(h),
                    };
                    frame.set(id, val);
                }
                let frame = self.frames.last_mut().unwrap();
                frame.pc += 1;
                Outcome::Advanced
            }
            Some(Err(signal)) => self.raise_trap(TrapKind::Bridge, Some(callee.to_string()), signal.message),
        }
    }

    pub(crate) fn execute_current(&mut self) -> Outcome {
        let inst = {
            let frame = self.frames.last().unwrap();
            let func = &self.module.functions[frame.func_index];
            func.block(frame.block).insts[frame.pc].clone()
        };
        self.record_opcode(inst.opcode);

        use Opcode::*;
        match inst.opcode {
            Add | Sub | Mul | And | Or | Xor | Shl | Lshr | Ashr => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap();
                let raw = match inst.opcode {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    And => a & b,
                    Or => a | b,
                    Xor => a ^ b,
                    Shl => a.wrapping_shl(b as u32),
                    Lshr => ((a as u64).wrapping_shr(b as u32)) as i64,
                    Ashr => a.wrapping_shr(b as u32),
                    _ => unreachable!(),
                };
                self.bind_result(&inst, RuntimeValue::I64(narrow(inst.result_ty, raw)));
                self.advance()
            }
            IAddOvf => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap();
                match a.checked_add(b) {
                    Some(sum) if narrow(inst.result_ty, sum) == sum => {
                        self.bind_result(&inst, RuntimeValue::I64(sum));
                        self.advance()
                    }
                    _ => self.raise_trap(TrapKind::Explicit, Some("iadd.ovf".into()), "integer overflow in iadd.ovf".into()),
                }
            }
            SDiv | SDivChk0 | SRem => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap();
                if b == 0 {
                    return self.raise_trap(TrapKind::Explicit, Some(inst.opcode.mnemonic().into()), "division by zero".into());
                }
                let raw = if inst.opcode == SRem { a.wrapping_rem(b) } else { a.wrapping_div(b) };
                self.bind_result(&inst, RuntimeValue::I64(narrow(inst.result_ty, raw)));
                self.advance()
            }
            UDiv | UDivChk0 | URem => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap() as u64;
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap() as u64;
                if b == 0 {
                    return self.raise_trap(TrapKind::Explicit, Some(inst.opcode.mnemonic().into()), "division by zero".into());
                }
                let raw = if inst.opcode == URem { a.wrapping_rem(b) } else { a.wrapping_div(b) };
                self.bind_result(&inst, RuntimeValue::I64(narrow(inst.result_ty, raw as i64)));
                self.advance()
            }
            IcmpEq | IcmpNe | ScmpLt | ScmpLe | ScmpGt | ScmpGe => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap();
                let r = match inst.opcode {
                    IcmpEq => a == b,
                    IcmpNe => a != b,
                    ScmpLt => a < b,
                    ScmpLe => a <= b,
                    ScmpGt => a > b,
                    ScmpGe => a >= b,
                    _ => unreachable!(),
                };
                self.bind_result(&inst, RuntimeValue::I64(r as i64));
                self.advance()
            }
            UcmpLt | UcmpLe | UcmpGt | UcmpGe => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap() as u64;
                let b = self.read_operand(&inst.operands[1]).as_i64().unwrap() as u64;
                let r = match inst.opcode {
                    UcmpLt => a < b,
                    UcmpLe => a <= b,
                    UcmpGt => a > b,
                    UcmpGe => a >= b,
                    _ => unreachable!(),
                };
                self.bind_result(&inst, RuntimeValue::I64(r as i64));
                self.advance()
            }
            FcmpEq | FcmpLt | FcmpLe | FcmpGt | FcmpGe => {
                let a = self.read_operand(&inst.operands[0]).as_f64().unwrap();
                let b = self.read_operand(&inst.operands[1]).as_f64().unwrap();
                let r = match inst.opcode {
                    FcmpEq => a == b,
                    FcmpLt => a < b,
                    FcmpLe => a <= b,
                    FcmpGt => a > b,
                    FcmpGe => a >= b,
                    _ => unreachable!(),
                };
                self.bind_result(&inst, RuntimeValue::I64(r as i64));
                self.advance()
            }
            Sitofp => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                self.bind_result(&inst, RuntimeValue::F64(a as f64));
                self.advance()
            }
            Fptosi => {
                let a = self.read_operand(&inst.operands[0]).as_f64().unwrap();
                self.bind_result(&inst, RuntimeValue::I64(narrow(inst.result_ty, a as i64)));
                self.advance()
            }
            Trunc1 => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                self.bind_result(&inst, RuntimeValue::I64(a & 1));
                self.advance()
            }
            Zext1 | Sext => {
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                self.bind_result(&inst, RuntimeValue::I64(narrow(inst.result_ty, a)));
                self.advance()
            }
            Zext => {
                let from_ty = inst.operands[0].ty;
                let a = self.read_operand(&inst.operands[0]).as_i64().unwrap();
                self.bind_result(&inst, RuntimeValue::I64(zero_extend(from_ty, a, inst.result_ty)));
                self.advance()
            }
            Alloca => {
                let handle = self.alloc_ptr(RuntimeValue::I64(0));
                self.bind_result(&inst, RuntimeValue::Ptr(handle));
                self.advance()
            }
            Load => {
                let handle = self.read_operand(&inst.operands[0]).as_ptr().unwrap_or(0);
                let value = match self.slot_index(handle) {
                    Some(i) => self.allocas[i].clone(),
                    None => RuntimeValue::zero_of(inst.result_ty),
                };
                self.bind_result(&inst, value);
                self.advance()
            }
            Store => {
                let handle = self.read_operand(&inst.operands[0]).as_ptr().unwrap_or(0);
                let value = self.read_operand(&inst.operands[1]);
                if let Some(i) = self.slot_index(handle) {
                    self.allocas[i] = value;
                }
                self.advance()
            }
            ConstStr => {
                let g = self.module.global_by_name(inst.labels.first().map(String::as_str).unwrap_or_default()).map(|(g, _)| g);
                let value = match g {
                    Some(g) => {
                        let bytes = &self.module.globals[g].bytes;
                        RuntimeValue::Str(String::from_utf8_lossy(bytes).into_owned().into())
                    }
                    None => RuntimeValue::Str("".into()),
                };
                self.bind_result(&inst, value);
                self.advance()
            }
            ConstInt => {
                let v = self.read_operand(&inst.operands[0]);
                self.bind_result(&inst, v);
                self.advance()
            }
            GlobalAddr => {
                let g = self.module.global_by_name(inst.labels.first().map(String::as_str).unwrap_or_default()).map(|(g, _)| g);
                let handle = g.map(|g| self.global_ptr(g)).unwrap_or(0);
                self.bind_result(&inst, RuntimeValue::Ptr(handle));
                self.advance()
            }
            Br => {
                self.bind_block_params(&inst.targets[0]);
                Outcome::Advanced
            }
            Cbr => {
                let cond = self.read_operand(&inst.operands[0]).as_bool().unwrap_or(false);
                let target = if cond { &inst.targets[0] } else { &inst.targets[1] };
                self.bind_block_params(target);
                Outcome::Advanced
            }
            SwitchI32 => {
                let sel = self.read_operand(&inst.operands[0]).as_i64().unwrap_or(0) as i32;
                let target = inst
                    .switch_cases
                    .iter()
                    .find(|c| c.label == sel)
                    .map(|c| &c.target)
                    .unwrap_or(&inst.targets[0]);
                self.bind_block_params(target);
                Outcome::Advanced
            }
            Ret => {
                let result = inst.operands.first().map(|o| self.read_operand(o));
                self.return_from_current(result)
            }
            Call => {
                let callee = inst.labels.first().cloned().unwrap_or_default();
                self.dispatch_call(&inst, &callee)
            }
            CallIndirect => {
                if let Some(callee) = inst.labels.first().cloned() {
                    self.dispatch_call(&inst, &callee)
                } else {
                    self.raise_trap(
                        TrapKind::InvalidIndirectTarget,
                        None,
                        "call.indirect through a pointer operand has no resolvable target".into(),
                    )
                }
            }
            EhPush => {
                let label = inst.labels.first().cloned().unwrap_or_default();
                self.frames.last_mut().unwrap().handlers.push(HandlerEntry { label });
                self.advance()
            }
            EhPop => {
                self.frames.last_mut().unwrap().handlers.pop();
                self.advance()
            }
            EhEntry => self.advance(),
            Trap => {
                let message = inst.operands.first().map(|o| self.read_operand(o)).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "trap".to_string());
                self.raise_trap(TrapKind::Explicit, None, message)
            }
            TrapFromErr => {
                let message = inst.operands.first().map(|o| self.read_operand(o)).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "error".to_string());
                self.raise_trap(TrapKind::FromError, None, message)
            }
            ResumeSame | ResumeNext => {
                let frame = self.frames.last_mut().unwrap();
                if let Some(site) = frame.active_resume.take() {
                    frame.block = site.block;
                    frame.pc = if inst.opcode == ResumeNext { site.index + 1 } else { site.index };
                    Outcome::Advanced
                } else {
                    self.advance()
                }
            }
            ResumeLabel => {
                let label = inst.labels.first().cloned().unwrap_or_default();
                let frame = self.frames.last_mut().unwrap();
                frame.active_resume = None;
                let func = &self.module.functions[frame.func_index];
                match func.block_by_label(&label) {
                    Some(target) => {
                        frame.goto(target);
                        Outcome::Advanced
                    }
                    None => self.raise_trap(TrapKind::Invariant, None, format!("resume.label target `{label}` does not exist")),
                }
            }
        }
    }

    fn bind_result(&mut self, inst: &Instruction, value: RuntimeValue) {
        if let Some(id) = inst.result {
            self.frames.last_mut().unwrap().set(id, value);
        }
    }

    fn advance(&mut self) -> Outcome {
        self.frames.last_mut().unwrap().pc += 1;
        Outcome::Advanced
    }
}

/// The `ValueId` a pending `call`/`call.indirect` in `caller`'s current
/// instruction would bind its result to, if any — looked up by re-reading
/// the instruction the caller's (not-yet-advanced) `pc` still points at.
fn current_call_result(caller: &Frame, module: &viper_ir::Module) -> Option<viper_ir::ValueId> {
    let func = &module.functions[caller.func_index];
    let block = func.block(caller.block);
    block.insts.get(caller.pc).and_then(|i| i.result)
}
