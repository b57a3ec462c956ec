//! Register-allocation application and frame layout (§4.6 "Register
//! allocator", "Prologue/epilogue").
//!
//! Two passes run over a selected [`MirFunction`] before it is ready for
//! the peephole pass and emission:
//!
//! 1. [`apply_regalloc`] rewrites every [`Reg::Virtual`] the selector left
//!    behind into a [`Reg::Physical`], splicing in spill-slot load/store
//!    pairs through the scratch registers [`SCRATCH_GPR`]/[`SCRATCH_FPR`]
//!    reserve for exactly this purpose.
//! 2. [`build_frame`] resolves every [`MInst::LocalAddr`] and
//!    `Ldr`/`MemOperand::IncomingArg` left by the selector into concrete
//!    `sp`-relative offsets, then prepends a prologue and splices an
//!    epilogue before every `ret` — omitting the frame-link push entirely
//!    for a leaf function with nothing to spill (§4.6 "leaf function").

use hashbrown::HashMap;

use viper_machinst::{Assignment, MInst, MemOperand, MirFunction, PReg, Reg, RegAllocResult, RegClass, VReg, SCRATCH_FPR, SCRATCH_GPR};

use crate::abi::round_up_16;

/// Rewrites every virtual register in `func` to a physical one, inserting
/// spill-fill sequences around any instruction touching a spilled value.
/// Scratch registers are scoped per instruction: an instruction never needs
/// more live scratch values at once than it has register operands, and the
/// widest opcode (`madd`/`msub`) has exactly as many operands as
/// [`SCRATCH_GPR`] has entries.
pub fn apply_regalloc(func: &mut MirFunction, result: &RegAllocResult) {
    let classes: Vec<RegClass> = (0..func.vreg_count())
        .map(|i| func.vreg_class(VReg::from_u32(i as u32)))
        .collect();

    for block in &mut func.blocks {
        let mut rewritten = Vec::with_capacity(block.insts.len());
        for mut inst in std::mem::take(&mut block.insts) {
            // Pass 1 (read-only): which vregs appear, and in which role.
            let mut needs_load: HashMap<VReg, RegClass> = HashMap::new();
            let mut needs_store: HashMap<VReg, RegClass> = HashMap::new();
            inst.for_each_reg_mut(&mut |reg, is_def| {
                if let Reg::Virtual(v) = *reg {
                    if let Assignment::Spill(_) = result.assignments[&v] {
                        let class = classes[v.index()];
                        if is_def {
                            needs_store.insert(v, class);
                        } else {
                            needs_load.insert(v, class);
                        }
                    }
                }
            });

            // Assign one scratch register per distinct spilled vreg in this
            // instruction, GPR and FPR counted separately.
            let mut scratch_of: HashMap<VReg, Reg> = HashMap::new();
            let mut next_gpr = 0usize;
            let mut next_fpr = 0usize;
            let mut assign_scratch = |v: VReg, class: RegClass, scratch_of: &mut HashMap<VReg, Reg>, next_gpr: &mut usize, next_fpr: &mut usize| {
                *scratch_of.entry(v).or_insert_with(|| match class {
                    RegClass::Gpr => {
                        let r = Reg::Physical(PReg::gpr(SCRATCH_GPR[*next_gpr]));
                        *next_gpr += 1;
                        r
                    }
                    RegClass::Fpr => {
                        let r = Reg::Physical(PReg::fpr(SCRATCH_FPR[*next_fpr]));
                        *next_fpr += 1;
                        r
                    }
                })
            };
            for (&v, &class) in needs_load.iter() {
                assign_scratch(v, class, &mut scratch_of, &mut next_gpr, &mut next_fpr);
            }
            for (&v, &class) in needs_store.iter() {
                assign_scratch(v, class, &mut scratch_of, &mut next_gpr, &mut next_fpr);
            }

            let mut pre = Vec::new();
            let mut slots: Vec<(&VReg, &RegClass)> = needs_load.iter().collect();
            slots.sort_by_key(|(v, _)| v.index());
            for (v, _) in slots {
                let slot = match result.assignments[v] {
                    Assignment::Spill(s) => s,
                    Assignment::Phys(_) => unreachable!(),
                };
                pre.push(MInst::Ldr { dst: scratch_of[v], mem: MemOperand::SpillSlot(slot) });
            }

            // Pass 2: rewrite the instruction's own registers in place.
            inst.for_each_reg_mut(&mut |reg, _| {
                if let Reg::Virtual(v) = *reg {
                    *reg = match result.assignments[&v] {
                        Assignment::Phys(p) => Reg::Physical(p),
                        Assignment::Spill(_) => scratch_of[&v],
                    };
                }
            });

            let mut post = Vec::new();
            let mut store_slots: Vec<(&VReg, &RegClass)> = needs_store.iter().collect();
            store_slots.sort_by_key(|(v, _)| v.index());
            for (v, _) in store_slots {
                let slot = match result.assignments[v] {
                    Assignment::Spill(s) => s,
                    Assignment::Phys(_) => unreachable!(),
                };
                post.push(MInst::Str { src: scratch_of[v], mem: MemOperand::SpillSlot(slot) });
            }

            rewritten.extend(pre);
            let is_terminator = inst.is_terminator();
            if is_terminator {
                // A terminator must stay the last instruction in the block;
                // any store of its own (spilled) result has nowhere
                // meaningful to go before a branch, and no MIR terminator
                // produces a value anyway, so `post` is always empty here.
                debug_assert!(post.is_empty());
                rewritten.push(inst);
            } else {
                rewritten.push(inst);
                rewritten.extend(post);
            }
        }
        block.insts = rewritten;
    }
}

/// Byte offset, from the final (post-prologue) `sp`, of the spill area, the
/// `alloca` locals, and the callee-saved save slots.
struct Layout {
    spill_bytes: u32,
    locals_bytes: u32,
    callee_saved_bytes: u32,
    frame_bytes: u32,
    link_bytes: u32,
}

impl Layout {
    fn new(spill_slot_count: u32, locals_bytes: u32, callee_saved_count: u32, is_leaf: bool) -> Layout {
        let spill_bytes = spill_slot_count * 8;
        let callee_saved_bytes = callee_saved_count * 8;
        let frame_bytes = round_up_16(spill_bytes + locals_bytes + callee_saved_bytes);
        let link_bytes = if is_leaf { 0 } else { 16 };
        Layout { spill_bytes, locals_bytes, callee_saved_bytes, frame_bytes, link_bytes }
    }

    fn total_adjust(&self) -> u32 {
        self.link_bytes + self.frame_bytes
    }

    fn callee_saved_offset(&self, i: u32) -> i32 {
        (self.spill_bytes + self.locals_bytes + i * 8) as i32
    }
}

/// Resolves `LocalAddr`/`IncomingArg` placeholders and emits the
/// prologue/epilogue, after [`apply_regalloc`] has already run.
pub fn build_frame(func: &mut MirFunction, locals_bytes: u32, result: &RegAllocResult) {
    let is_leaf = func.is_leaf() && result.used_callee_saved.is_empty();
    let layout = Layout::new(result.spill_slot_count, locals_bytes, result.used_callee_saved.len() as u32, is_leaf);
    let total_adjust = layout.total_adjust();

    for block in &mut func.blocks {
        for inst in &mut block.insts {
            match inst {
                MInst::LocalAddr { dst, local_offset } => {
                    let imm = (layout.spill_bytes + *local_offset) as i64;
                    *inst = MInst::AddRI { dst: *dst, src: Reg::Physical(PReg::SP), imm };
                }
                MInst::Ldr { mem: MemOperand::IncomingArg(off), dst } => {
                    *inst = MInst::Ldr {
                        dst: *dst,
                        mem: MemOperand::Local { base: Reg::Physical(PReg::SP), offset: *off + total_adjust as i32 },
                    };
                }
                _ => {}
            }
        }
    }

    if total_adjust == 0 {
        return;
    }

    let mut prologue = Vec::new();
    if !is_leaf {
        prologue.push(MInst::StpPre { a: Reg::Physical(PReg::FP), b: Reg::Physical(PReg::LR), pre_dec: 16 });
        prologue.push(MInst::MovFpFromSp);
    }
    if layout.frame_bytes > 0 {
        prologue.push(MInst::SubSpImm { imm: layout.frame_bytes as i64 });
    }
    for (i, &preg) in result.used_callee_saved.iter().enumerate() {
        prologue.push(MInst::Str {
            src: Reg::Physical(preg),
            mem: MemOperand::Local { base: Reg::Physical(PReg::SP), offset: layout.callee_saved_offset(i as u32) },
        });
    }

    let mut epilogue = Vec::new();
    for (i, &preg) in result.used_callee_saved.iter().enumerate() {
        epilogue.push(MInst::Ldr {
            dst: Reg::Physical(preg),
            mem: MemOperand::Local { base: Reg::Physical(PReg::SP), offset: layout.callee_saved_offset(i as u32) },
        });
    }
    if layout.frame_bytes > 0 {
        epilogue.push(MInst::AddSpImm { imm: layout.frame_bytes as i64 });
    }
    if !is_leaf {
        epilogue.push(MInst::LdpPost { a: Reg::Physical(PReg::FP), b: Reg::Physical(PReg::LR), post_inc: 16 });
    }

    let entry = 0usize;
    func.blocks[entry].insts.splice(0..0, prologue);

    for block in &mut func.blocks {
        let mut i = 0;
        while i < block.insts.len() {
            if matches!(block.insts[i], MInst::Ret) {
                block.insts.splice(i..i, epilogue.clone());
                i += epilogue.len() + 1;
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_machinst::{allocate, MirFunction, RegClass};
    use hashbrown::HashSet;

    #[test]
    fn leaf_function_with_no_locals_gets_no_prologue() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let dst = Reg::Virtual(f.new_vreg(RegClass::Gpr));
        f.block_mut(entry).insts.push(MInst::MovRI { dst, imm: 1 });
        f.block_mut(entry).insts.push(MInst::MovRR { dst: Reg::Physical(PReg::gpr(0)), src: dst });
        f.block_mut(entry).insts.push(MInst::Ret);

        let result = allocate(&f, &HashSet::new());
        apply_regalloc(&mut f, &result);
        build_frame(&mut f, 0, &result);

        assert!(!f.blocks[0].insts.iter().any(|i| matches!(i, MInst::SubSpImm { .. } | MInst::StpPre { .. })));
    }

    #[test]
    fn non_leaf_function_saves_and_restores_the_frame_link() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        f.block_mut(entry).insts.push(MInst::Bl { func: "callee".to_string() });
        f.block_mut(entry).insts.push(MInst::Ret);

        let result = allocate(&f, &HashSet::new());
        apply_regalloc(&mut f, &result);
        build_frame(&mut f, 0, &result);

        assert!(matches!(f.blocks[0].insts.first(), Some(MInst::StpPre { .. })));
        assert!(matches!(f.blocks[0].insts.last(), Some(MInst::LdpPost { .. })));
    }
}
