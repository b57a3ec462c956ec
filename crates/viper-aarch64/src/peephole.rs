//! Peephole pass (§4.6 "Peephole pass", §8 P7/L2).
//!
//! Runs to a fixed point: each individual rewrite is a local, strictly
//! size/ops-reducing transformation, so repeated passes converge and, once
//! they do, re-running the pass is the identity (§8 L2 "peephole is
//! idempotent").

use viper_machinst::{CondCode, MInst, MirFunction, Reg};

/// Per-kind rewrite counts, for tests that want to assert a specific
/// rewrite fired without over-specifying the resulting instruction stream.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeepholeStats {
    pub identity_moves_removed: usize,
    pub chained_moves_folded: usize,
    pub cmp_zero_to_tst: usize,
    pub identity_arith_to_mov: usize,
    pub fallthrough_branches_removed: usize,
}

impl PeepholeStats {
    fn total(&self) -> usize {
        self.identity_moves_removed + self.chained_moves_folded + self.cmp_zero_to_tst + self.identity_arith_to_mov + self.fallthrough_branches_removed
    }

    fn add(&mut self, other: PeepholeStats) {
        self.identity_moves_removed += other.identity_moves_removed;
        self.chained_moves_folded += other.chained_moves_folded;
        self.cmp_zero_to_tst += other.cmp_zero_to_tst;
        self.identity_arith_to_mov += other.identity_arith_to_mov;
        self.fallthrough_branches_removed += other.fallthrough_branches_removed;
    }
}

pub fn run(func: &mut MirFunction) -> PeepholeStats {
    let mut total = PeepholeStats::default();
    loop {
        let pass = run_one_pass(func);
        total.add(pass);
        if pass.total() == 0 {
            break;
        }
    }
    total
}

fn run_one_pass(func: &mut MirFunction) -> PeepholeStats {
    let mut stats = PeepholeStats::default();
    let block_count = func.blocks.len();
    for (block_idx, block) in func.blocks.iter_mut().enumerate() {
        identity_arith_to_mov(&mut block.insts, &mut stats);
        cmp_zero_to_tst(&mut block.insts, &mut stats);
        fold_chained_moves(&mut block.insts, &mut stats);
        remove_identity_moves(&mut block.insts, &mut stats);
        remove_fallthrough_branch(&mut block.insts, block_idx, block_count, &mut stats);
    }
    stats
}

fn remove_identity_moves(insts: &mut Vec<MInst>, stats: &mut PeepholeStats) {
    let before = insts.len();
    insts.retain(|i| !matches!(i, MInst::MovRR { dst, src } if dst == src) && !matches!(i, MInst::FMovRR { dst, src } if dst == src));
    stats.identity_moves_removed += before - insts.len();
}

/// `mov d1, s1` immediately followed by `mov d2, d1` becomes `mov d2, s1` —
/// a later pass's [`remove_identity_moves`] then drops the first move if it
/// turns out dead (its destination is never read again once the second
/// move no longer references it).
fn fold_chained_moves(insts: &mut [MInst], stats: &mut PeepholeStats) {
    for i in 0..insts.len().saturating_sub(1) {
        let first = insts[i].clone();
        if let MInst::MovRR { dst: d1, src: s1 } = first {
            if let MInst::MovRR { dst: _, src: s2 } = &mut insts[i + 1] {
                if *s2 == d1 {
                    *s2 = s1;
                    stats.chained_moves_folded += 1;
                }
            }
        }
    }
}

fn cmp_zero_to_tst(insts: &mut [MInst], stats: &mut PeepholeStats) {
    for i in 0..insts.len().saturating_sub(1) {
        let is_eq_or_ne_consumer = match &insts[i + 1] {
            MInst::Cset { cond, .. } | MInst::BCond { cond, .. } => matches!(*cond, CondCode::Eq | CondCode::Ne),
            _ => false,
        };
        if !is_eq_or_ne_consumer {
            continue;
        }
        if let MInst::CmpRI { a, imm: 0 } = insts[i] {
            insts[i] = MInst::TstRR { a, b: a };
            stats.cmp_zero_to_tst += 1;
        }
    }
}

fn identity_arith_to_mov(insts: &mut [MInst], stats: &mut PeepholeStats) {
    for inst in insts.iter_mut() {
        let replacement = match *inst {
            MInst::AddRI { dst, src, imm: 0 } => Some(mov_for(dst, src)),
            MInst::SubRI { dst, src, imm: 0 } => Some(mov_for(dst, src)),
            MInst::LslRI { dst, src, imm: 0 } => Some(mov_for(dst, src)),
            MInst::LsrRI { dst, src, imm: 0 } => Some(mov_for(dst, src)),
            MInst::AsrRI { dst, src, imm: 0 } => Some(mov_for(dst, src)),
            _ => None,
        };
        if let Some(rewritten) = replacement {
            *inst = rewritten;
            stats.identity_arith_to_mov += 1;
        }
    }
}

fn mov_for(dst: Reg, src: Reg) -> MInst {
    MInst::MovRR { dst, src }
}

fn remove_fallthrough_branch(insts: &mut Vec<MInst>, block_idx: usize, block_count: usize, stats: &mut PeepholeStats) {
    let next = (block_idx + 1) as u32;
    if next as usize >= block_count {
        return;
    }
    if let Some(MInst::Br { target }) = insts.last() {
        if *target == next {
            insts.pop();
            stats.fallthrough_branches_removed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_machinst::{PReg, RegClass};

    #[test]
    fn identity_move_is_removed() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let r = Reg::Physical(PReg::gpr(0));
        f.block_mut(entry).insts.push(MInst::MovRR { dst: r, src: r });
        f.block_mut(entry).insts.push(MInst::Ret);
        let stats = run(&mut f);
        assert_eq!(stats.identity_moves_removed, 1);
        assert_eq!(f.blocks[0].insts.len(), 1);
    }

    #[test]
    fn cmp_zero_before_eq_branch_becomes_tst() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let other = f.add_block("other");
        let a = Reg::Physical(PReg::gpr(1));
        f.block_mut(entry).insts.push(MInst::CmpRI { a, imm: 0 });
        f.block_mut(entry).insts.push(MInst::BCond { cond: CondCode::Eq, target: other, fallthrough: 99 });
        let stats = run(&mut f);
        assert_eq!(stats.cmp_zero_to_tst, 1);
        assert!(matches!(f.blocks[0].insts[0], MInst::TstRR { .. }));
    }

    #[test]
    fn identity_add_becomes_move() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let d = Reg::Virtual(f.new_vreg(RegClass::Gpr));
        let s = Reg::Physical(PReg::gpr(2));
        f.block_mut(entry).insts.push(MInst::AddRI { dst: d, src: s, imm: 0 });
        let stats = run(&mut f);
        assert_eq!(stats.identity_arith_to_mov, 1);
        assert!(matches!(f.blocks[0].insts[0], MInst::MovRR { .. }));
    }

    #[test]
    fn unconditional_branch_to_the_next_block_is_dropped() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let _next = f.add_block("next");
        f.block_mut(entry).insts.push(MInst::Br { target: 1 });
        let stats = run(&mut f);
        assert_eq!(stats.fallthrough_branches_removed, 1);
        assert!(f.blocks[0].insts.is_empty());
    }

    #[test]
    fn running_twice_is_a_no_op() {
        let mut f = MirFunction::new("f");
        let entry = f.add_block("entry");
        let r = Reg::Physical(PReg::gpr(0));
        f.block_mut(entry).insts.push(MInst::MovRR { dst: r, src: r });
        f.block_mut(entry).insts.push(MInst::Ret);
        run(&mut f);
        let second = run(&mut f);
        assert_eq!(second.total(), 0);
    }
}
