//! IL → Machine IR instruction selection (§4.6 "Instruction selection").
//!
//! One [`viper_ir::Function`] selects into one [`MirFunction`] via a
//! per-opcode table (`select_inst`), matching the spec's "pattern helpers"
//! description: compares lower to `cmp`+`cset`, switches to a `cmp`+`b.eq`
//! chain, branches to the textually-next block are left for the peephole
//! pass to drop.
//!
//! Every integer value is kept sign/zero-extended to its declared width in
//! its 64-bit register at the point it is defined — the same invariant
//! `viper-vm`'s interpreter keeps for [`viper_vm`]'s `RuntimeValue` — so a
//! later consumer never has to re-derive a value's width from the
//! instruction that produced it.

use hashbrown::{HashMap, HashSet};

use viper_ir::{BranchTarget, Function as IlFunction, Instruction as IlInst, Module, Opcode, Type, Value, ValueData, ValueId};
use viper_machinst::{CondCode, MInst, MemOperand, MirBlockId, MirFunction, PReg, Reg, RegClass, VReg};

use crate::abi::{classify_args, classify_params, outgoing_stack_bytes, ret_loc, ArgLoc};

/// Everything the rest of the backend (frame layout, emission) needs about
/// one selected function, beyond the [`MirFunction`] itself.
pub struct FuncSelection {
    pub mir: MirFunction,
    /// Virtual registers bound to a block parameter — regalloc forces these
    /// to spill slots rather than physical registers (§4.6 "Register
    /// allocator").
    pub block_param_vregs: HashSet<VReg>,
    /// Total bytes this function's `alloca`s need, in the order selected.
    pub locals_bytes: u32,
    pub param_tys: Vec<Type>,
    pub ret_ty: Type,
}

fn class_of(ty: Type) -> RegClass {
    if ty.is_fpr() {
        RegClass::Fpr
    } else {
        RegClass::Gpr
    }
}

struct Selector<'m> {
    module: &'m Module,
    mir: MirFunction,
    value_map: HashMap<ValueId, Reg>,
    block_param_vregs: HashSet<VReg>,
    block_params: HashMap<viper_ir::Block, Vec<(VReg, Type)>>,
    block_id_map: HashMap<viper_ir::Block, MirBlockId>,
    label_to_block: HashMap<String, MirBlockId>,
    cur: MirBlockId,
    locals_bytes: u32,
}

impl<'m> Selector<'m> {
    fn push(&mut self, inst: MInst) {
        self.mir.block_mut(self.cur).insts.push(inst);
    }

    fn fresh(&mut self, class: RegClass) -> Reg {
        Reg::Virtual(self.mir.new_vreg(class))
    }

    /// Sign/zero-extend `raw` up to 64 bits as `ty`'s declared width
    /// prescribes, matching `viper_vm::interp::narrow` exactly (§3 "Every
    /// IL `Value`... carries exactly one `Type`").
    fn narrow(&mut self, ty: Type, raw: Reg) -> Reg {
        match ty {
            Type::I1 => {
                let one = self.fresh(RegClass::Gpr);
                self.push(MInst::MovRI { dst: one, imm: 1 });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AndRRR { dst, a: raw, b: one });
                dst
            }
            Type::I16 => {
                let shifted = self.fresh(RegClass::Gpr);
                self.push(MInst::LslRI { dst: shifted, src: raw, imm: 48 });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AsrRI { dst, src: shifted, imm: 48 });
                dst
            }
            Type::I32 => {
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::Sxtw { dst, src: raw });
                dst
            }
            _ => raw,
        }
    }

    /// Zero-extend a value known to hold `from`'s width up to 64 bits
    /// (`viper_vm::interp::zero_extend`'s codegen counterpart — used only
    /// by the IL `zext` opcode, which is explicit about its source width
    /// unlike `sext`/`zext1`, whose source is always the ambient 64-bit
    /// register already carrying its declared type's sign).
    fn zero_extend_from(&mut self, from: Type, raw: Reg) -> Reg {
        match from {
            Type::I1 => {
                let one = self.fresh(RegClass::Gpr);
                self.push(MInst::MovRI { dst: one, imm: 1 });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AndRRR { dst, a: raw, b: one });
                dst
            }
            Type::I16 => {
                let mask = self.fresh(RegClass::Gpr);
                self.push(MInst::MovRI { dst: mask, imm: 0xffff });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AndRRR { dst, a: raw, b: mask });
                dst
            }
            Type::I32 => {
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::Uxtw { dst, src: raw });
                dst
            }
            _ => raw,
        }
    }

    fn value_reg(&mut self, v: &Value) -> Reg {
        match v.data {
            ValueData::ConstInt(i) => {
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::MovRI { dst, imm: i });
                self.narrow(v.ty, dst)
            }
            ValueData::ConstFloat(f) => {
                let dst = self.fresh(RegClass::Fpr);
                self.push(MInst::FMovRI { dst, bits: f.to_bits() });
                dst
            }
            ValueData::StrLit(g) | ValueData::GlobalAddr(g) => {
                let symbol = self.module.globals[g].name.clone();
                let page = self.fresh(RegClass::Gpr);
                self.push(MInst::Adrp { dst: page, symbol: symbol.clone() });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AddLo12 { dst, src: page, symbol });
                dst
            }
            ValueData::Temp(id) | ValueData::BlockParam(id) => {
                *self.value_map.get(&id).unwrap_or_else(|| panic!("%{} selected before its definition", id.index()))
            }
        }
    }

    fn bind(&mut self, id: ValueId, reg: Reg) {
        self.value_map.insert(id, reg);
    }

    fn int_cond(op: Opcode) -> CondCode {
        match op {
            Opcode::IcmpEq | Opcode::FcmpEq => CondCode::Eq,
            Opcode::IcmpNe => CondCode::Ne,
            Opcode::ScmpLt | Opcode::FcmpLt => CondCode::Lt,
            Opcode::ScmpLe | Opcode::FcmpLe => CondCode::Le,
            Opcode::ScmpGt | Opcode::FcmpGt => CondCode::Gt,
            Opcode::ScmpGe | Opcode::FcmpGe => CondCode::Ge,
            Opcode::UcmpLt => CondCode::Lo,
            Opcode::UcmpLe => CondCode::Ls,
            Opcode::UcmpGt => CondCode::Hi,
            Opcode::UcmpGe => CondCode::Hs,
            _ => unreachable!("not a compare opcode: {op:?}"),
        }
    }

    /// `sdiv.chk0`/`udiv.chk0`/plain `srem`/`urem` all need the zero check
    /// the bare `sdiv`/`udiv` opcodes deliberately omit (§3 opcode family
    /// "`sdiv[.chk0]`" — the unchecked spelling exists so a frontend that
    /// has already proven the divisor non-zero can skip the guard).
    fn checked_divrem(&mut self, opcode: Opcode, a: Reg, b: Reg, result_ty: Type) -> Reg {
        let cont = self.mir.add_block(format!("divchk_ok_{}", self.mir.blocks.len()));
        let trap = self.mir.add_block(format!("divchk_trap_{}", self.mir.blocks.len()));
        self.push(MInst::Cbnz { src: b, target: cont, fallthrough: trap });

        self.cur = trap;
        self.push(MInst::TrapCall);
        self.push(MInst::Ret);

        self.cur = cont;
        self.divrem(opcode, a, b, result_ty)
    }

    fn divrem(&mut self, opcode: Opcode, a: Reg, b: Reg, result_ty: Type) -> Reg {
        use Opcode::*;
        match opcode {
            SDiv | SDivChk0 => {
                let raw = self.fresh(RegClass::Gpr);
                self.push(MInst::SDiv { dst: raw, a, b });
                self.narrow(result_ty, raw)
            }
            UDiv | UDivChk0 => {
                let raw = self.fresh(RegClass::Gpr);
                self.push(MInst::UDiv { dst: raw, a, b });
                self.narrow(result_ty, raw)
            }
            SRem => {
                let q = self.fresh(RegClass::Gpr);
                self.push(MInst::SDiv { dst: q, a, b });
                let raw = self.fresh(RegClass::Gpr);
                self.push(MInst::Msub { dst: raw, a: q, b, c: a });
                self.narrow(result_ty, raw)
            }
            URem => {
                let q = self.fresh(RegClass::Gpr);
                self.push(MInst::UDiv { dst: q, a, b });
                let raw = self.fresh(RegClass::Gpr);
                self.push(MInst::Msub { dst: raw, a: q, b, c: a });
                self.narrow(result_ty, raw)
            }
            _ => unreachable!(),
        }
    }

    fn select_inst(&mut self, inst: &IlInst) {
        use Opcode::*;
        match inst.opcode {
            Add | Sub | Mul | And | Or | Xor | Shl | Lshr | Ashr | IAddOvf => {
                let a = self.value_reg(&inst.operands[0]);
                let b = self.value_reg(&inst.operands[1]);
                let raw = self.fresh(RegClass::Gpr);
                self.push(match inst.opcode {
                    Add | IAddOvf => MInst::AddRRR { dst: raw, a, b },
                    Sub => MInst::SubRRR { dst: raw, a, b },
                    Mul => MInst::MulRRR { dst: raw, a, b },
                    And => MInst::AndRRR { dst: raw, a, b },
                    Or => MInst::OrrRRR { dst: raw, a, b },
                    Xor => MInst::EorRRR { dst: raw, a, b },
                    Shl => MInst::LslRR { dst: raw, src: a, amount: b },
                    Lshr => MInst::LsrRR { dst: raw, src: a, amount: b },
                    Ashr => MInst::AsrRR { dst: raw, src: a, amount: b },
                    _ => unreachable!(),
                });
                let dst = self.narrow(inst.result_ty, raw);
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            SDiv | SDivChk0 | UDiv | UDivChk0 | SRem | URem => {
                let a = self.value_reg(&inst.operands[0]);
                let b = self.value_reg(&inst.operands[1]);
                let dst = if matches!(inst.opcode, SDivChk0 | UDivChk0) {
                    self.checked_divrem(inst.opcode, a, b, inst.result_ty)
                } else {
                    self.divrem(inst.opcode, a, b, inst.result_ty)
                };
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            IcmpEq | IcmpNe | ScmpLt | ScmpLe | ScmpGt | ScmpGe | UcmpLt | UcmpLe | UcmpGt | UcmpGe => {
                let a = self.value_reg(&inst.operands[0]);
                let b = self.value_reg(&inst.operands[1]);
                self.push(MInst::CmpRR { a, b });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::Cset { dst, cond: Self::int_cond(inst.opcode) });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            FcmpEq | FcmpLt | FcmpLe | FcmpGt | FcmpGe => {
                let a = self.value_reg(&inst.operands[0]);
                let b = self.value_reg(&inst.operands[1]);
                self.push(MInst::FCmpRR { a, b });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::Cset { dst, cond: Self::int_cond(inst.opcode) });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Sitofp => {
                let a = self.value_reg(&inst.operands[0]);
                let dst = self.fresh(RegClass::Fpr);
                self.push(MInst::Scvtf { dst, src: a });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Fptosi => {
                let a = self.value_reg(&inst.operands[0]);
                let raw = self.fresh(RegClass::Gpr);
                self.push(MInst::Fcvtzs { dst: raw, src: a });
                let dst = self.narrow(inst.result_ty, raw);
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Trunc1 => {
                let a = self.value_reg(&inst.operands[0]);
                let dst = self.narrow(Type::I1, a);
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Zext1 | Sext => {
                let a = self.value_reg(&inst.operands[0]);
                let dst = self.narrow(inst.result_ty, a);
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Zext => {
                let from_ty = inst.operands[0].ty;
                let a = self.value_reg(&inst.operands[0]);
                let widened = self.zero_extend_from(from_ty, a);
                let dst = self.narrow(inst.result_ty, widened);
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Alloca => {
                let bytes = match inst.operands.first() {
                    Some(Value { data: ValueData::ConstInt(n), .. }) => (*n).max(0) as u32,
                    _ => 8,
                };
                let local_offset = self.locals_bytes;
                self.locals_bytes += (bytes + 7) & !7;
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::LocalAddr { dst, local_offset });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Load => {
                let ptr = self.value_reg(&inst.operands[0]);
                let class = class_of(inst.result_ty);
                let dst = self.fresh(class);
                self.push(MInst::Ldr { dst, mem: MemOperand::Local { base: ptr, offset: 0 } });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            Store => {
                let ptr = self.value_reg(&inst.operands[0]);
                let val = self.value_reg(&inst.operands[1]);
                self.push(MInst::Str { src: val, mem: MemOperand::Local { base: ptr, offset: 0 } });
            }
            ConstStr | GlobalAddr => {
                let name = inst.labels.first().cloned().unwrap_or_default();
                let symbol = self.module.global_by_name(&name).map(|(_, g)| g.name.clone()).unwrap_or(name);
                let page = self.fresh(RegClass::Gpr);
                self.push(MInst::Adrp { dst: page, symbol: symbol.clone() });
                let dst = self.fresh(RegClass::Gpr);
                self.push(MInst::AddLo12 { dst, src: page, symbol });
                if let Some(id) = inst.result {
                    self.bind(id, dst);
                }
            }
            ConstInt => {
                let v = self.value_reg(&inst.operands[0]);
                if let Some(id) = inst.result {
                    self.bind(id, v);
                }
            }
            Br => {
                self.branch_to(&inst.targets[0]);
                self.push(MInst::Br { target: self.block_id_map[&inst.targets[0].block] });
            }
            Cbr => {
                let cond = self.value_reg(&inst.operands[0]);
                // Both successors may need their block-parameter vregs
                // written; branch args are marshalled before the final
                // conditional jump itself so they're visible regardless of
                // which edge is taken.
                self.branch_to(&inst.targets[0]);
                self.branch_to(&inst.targets[1]);
                let then_id = self.block_id_map[&inst.targets[0].block];
                let else_id = self.block_id_map[&inst.targets[1].block];
                self.push(MInst::Cbnz { src: cond, target: then_id, fallthrough: else_id });
            }
            SwitchI32 => {
                let sel_raw = self.value_reg(&inst.operands[0]);
                let sel = self.fresh(RegClass::Gpr);
                self.push(MInst::Sxtw { dst: sel, src: sel_raw });
                for case in &inst.switch_cases {
                    self.branch_to(&case.target);
                }
                if let Some(default) = inst.targets.first() {
                    self.branch_to(default);
                }
                // `cmp`+`b.eq` chain (§4.6): one synthetic "next check"
                // block per case, falling through to the next comparison
                // or, after the last case, to the default block.
                for case in &inst.switch_cases {
                    let next = self.mir.add_block(format!("switch_chk_{}", self.mir.blocks.len()));
                    let target = self.block_id_map[&case.target.block];
                    self.push(MInst::CmpRI { a: sel, imm: case.label as i64 });
                    self.push(MInst::BCond { cond: CondCode::Eq, target, fallthrough: next });
                    self.cur = next;
                }
                if let Some(default) = inst.targets.first() {
                    let default_id = self.block_id_map[&default.block];
                    self.push(MInst::Br { target: default_id });
                }
            }
            Ret => {
                if let Some(v) = inst.operands.first() {
                    let val = self.value_reg(v);
                    let ret_reg = ret_loc(v.ty).expect("non-void return has a location");
                    if v.ty.is_fpr() {
                        self.push(MInst::FMovRR { dst: Reg::Physical(ret_reg), src: val });
                    } else {
                        self.push(MInst::MovRR { dst: Reg::Physical(ret_reg), src: val });
                    }
                }
                self.push(MInst::Ret);
            }
            Call => {
                let callee = inst.labels.first().cloned().unwrap_or_default();
                self.select_call(&callee, &inst.operands, inst.result, inst.result_ty);
            }
            CallIndirect => {
                if let Some(callee) = inst.labels.first().cloned() {
                    self.select_call(&callee, &inst.operands, inst.result, inst.result_ty);
                } else {
                    let fn_reg = self.value_reg(&inst.operands[0]);
                    self.select_call_indirect(fn_reg, &inst.operands[1..], inst.result, inst.result_ty);
                }
            }
            EhPush | EhPop | EhEntry => {
                // No-ops on this backend: the protected-region structure is
                // already fully expressed as ordinary control flow by the
                // time IL reaches the selector (§4.6 "EH markers...are
                // no-ops in the current backend").
                self.push(MInst::Nop);
            }
            Trap => {
                if let Some(msg) = inst.operands.first() {
                    let v = self.value_reg(msg);
                    self.push(MInst::MovRR { dst: Reg::Physical(PReg::gpr(0)), src: v });
                }
                self.push(MInst::TrapCall);
                self.push(MInst::Ret);
            }
            TrapFromErr => {
                let code = self.value_reg(&inst.operands[0]);
                self.push(MInst::MovRR { dst: Reg::Physical(PReg::gpr(0)), src: code });
                self.push(MInst::TrapCall);
                self.push(MInst::Ret);
            }
            ResumeLabel => {
                let label = inst.labels.first().cloned().unwrap_or_default();
                if let Some(&target) = self.label_to_block.get(&label) {
                    self.push(MInst::Br { target });
                } else {
                    self.push(MInst::TrapCall);
                    self.push(MInst::Ret);
                }
            }
            ResumeSame | ResumeNext => {
                // Resumption through a dynamically-captured VM trap site has
                // no static target once compiled ahead of time; this
                // backend never reaches these opcodes through a path the
                // verifier accepts without an enclosing `eh.push`/handler,
                // and the VM-only resume-token bridge (§4.5) is not part of
                // this backend's contract, so treat them as unreachable.
                self.push(MInst::TrapCall);
                self.push(MInst::Ret);
            }
        }
    }

    fn branch_to(&mut self, target: &BranchTarget) {
        let params = self.block_params.get(&target.block).cloned().unwrap_or_default();
        for (arg, (param_vreg, ty)) in target.args.iter().zip(params.iter()) {
            let src = self.value_reg(arg);
            let dst = Reg::Virtual(*param_vreg);
            if ty.is_fpr() {
                self.push(MInst::FMovRR { dst, src });
            } else {
                self.push(MInst::MovRR { dst, src });
            }
        }
    }

    fn select_call(&mut self, callee: &str, args: &[Value], result: Option<ValueId>, ret_ty: Type) {
        let arg_tys: Vec<Type> = args.iter().map(|a| a.ty).collect();
        let arg_regs: Vec<Reg> = args.iter().map(|a| self.value_reg(a)).collect();
        self.marshal_and_call(Some(callee.to_string()), None, &arg_tys, &arg_regs, result, ret_ty);
    }

    fn select_call_indirect(&mut self, fn_reg: Reg, args: &[Value], result: Option<ValueId>, ret_ty: Type) {
        let arg_tys: Vec<Type> = args.iter().map(|a| a.ty).collect();
        let arg_regs: Vec<Reg> = args.iter().map(|a| self.value_reg(a)).collect();
        self.marshal_and_call(None, Some(fn_reg), &arg_tys, &arg_regs, result, ret_ty);
    }

    /// Shared call-site codegen for `call`/`call.indirect`: marshal
    /// arguments into AAPCS64 locations (spilling overflow args to the
    /// stack, §4.6, §8 S4/S5), emit `bl`/`blr`, then move the return value
    /// out of `x0`/`d0`.
    fn marshal_and_call(
        &mut self,
        callee: Option<String>,
        fn_reg: Option<Reg>,
        arg_tys: &[Type],
        arg_regs: &[Reg],
        result: Option<ValueId>,
        ret_ty: Type,
    ) {
        let locs = classify_args(arg_tys);
        let stack_bytes = outgoing_stack_bytes(arg_tys);
        if stack_bytes > 0 {
            self.push(MInst::SubSpImm { imm: stack_bytes as i64 });
        }
        for (loc, &reg) in locs.iter().zip(arg_regs.iter()) {
            match loc {
                ArgLoc::Reg(p) => {
                    if p.class == RegClass::Fpr {
                        self.push(MInst::FMovRR { dst: Reg::Physical(*p), src: reg });
                    } else {
                        self.push(MInst::MovRR { dst: Reg::Physical(*p), src: reg });
                    }
                }
                ArgLoc::StackOffset(off) => {
                    self.push(MInst::Str { src: reg, mem: MemOperand::Local { base: Reg::Physical(PReg::SP), offset: *off as i32 } });
                }
            }
        }
        match (callee, fn_reg) {
            (Some(func), _) => self.push(MInst::Bl { func }),
            (None, Some(target)) => self.push(MInst::Blr { target }),
            (None, None) => unreachable!("call site needs either a symbol or a register target"),
        }
        if stack_bytes > 0 {
            self.push(MInst::AddSpImm { imm: stack_bytes as i64 });
        }
        if let (Some(id), Some(ret_reg)) = (result, ret_loc(ret_ty)) {
            let class = class_of(ret_ty);
            let dst = self.fresh(class);
            if class == RegClass::Fpr {
                self.push(MInst::FMovRR { dst, src: Reg::Physical(ret_reg) });
            } else {
                self.push(MInst::MovRR { dst, src: Reg::Physical(ret_reg) });
            }
            self.bind(id, dst);
        }
    }
}

/// Selects one IL function into Machine IR.
pub fn select_function(module: &Module, func: &IlFunction) -> FuncSelection {
    let mut mir = MirFunction::new(func.name.clone());
    let mut block_id_map = HashMap::new();
    let mut label_to_block = HashMap::new();
    for (b, bb) in func.blocks_in_order() {
        let id = mir.add_block(bb.label.clone());
        block_id_map.insert(b, id);
        label_to_block.insert(bb.label.clone(), id);
    }

    let mut block_param_vregs = HashSet::new();
    let mut block_params: HashMap<viper_ir::Block, Vec<(VReg, Type)>> = HashMap::new();
    let mut value_map = HashMap::new();
    for (b, bb) in func.blocks_in_order() {
        let mut params = Vec::with_capacity(bb.params.len());
        for p in &bb.params {
            let vreg = mir.new_vreg(class_of(p.ty));
            block_param_vregs.insert(vreg);
            value_map.insert(p.id, Reg::Virtual(vreg));
            params.push((vreg, p.ty));
        }
        block_params.insert(b, params);
    }

    // Incoming parameters: the entry block's IL "parameters" are the
    // function's own formal parameters, bound from their AAPCS64 locations
    // rather than from a predecessor's branch arguments.
    let mut selector = Selector {
        module,
        mir,
        value_map,
        block_param_vregs,
        block_params,
        block_id_map: block_id_map.clone(),
        label_to_block,
        cur: 0,
        locals_bytes: 0,
    };

    if let Some(entry) = func.entry() {
        selector.cur = block_id_map[&entry];
        let locs = classify_params(&func.param_tys);
        let entry_params = selector.block_params.get(&entry).cloned().unwrap_or_default();
        for ((vreg, ty), loc) in entry_params.iter().zip(locs.iter()) {
            match loc {
                ArgLoc::Reg(p) => {
                    let dst = Reg::Virtual(*vreg);
                    if ty.is_fpr() {
                        selector.push(MInst::FMovRR { dst, src: Reg::Physical(*p) });
                    } else {
                        selector.push(MInst::MovRR { dst, src: Reg::Physical(*p) });
                    }
                }
                ArgLoc::StackOffset(off) => {
                    let dst = Reg::Virtual(*vreg);
                    selector.push(MInst::Ldr { dst, mem: MemOperand::IncomingArg(*off as i32) });
                }
            }
        }
    }

    for (b, bb) in func.blocks_in_order() {
        selector.cur = block_id_map[&b];
        for inst in &bb.insts {
            selector.select_inst(inst);
        }
    }

    FuncSelection {
        mir: selector.mir,
        block_param_vregs: selector.block_param_vregs,
        locals_bytes: selector.locals_bytes,
        param_tys: func.param_tys.clone(),
        ret_ty: func.ret_ty,
    }
}
