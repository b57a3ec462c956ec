//! Control-flow graph successors and a generic dominator-tree computation.
//!
//! Used twice per function: once forward from the entry block (SSA
//! dominance, pass 3) and once on the *reversed* graph from a synthetic exit
//! node (post-dominance, for `resume.label`'s EH discipline check, pass 5).
//! Both uses share the same iterative algorithm (Cooper, Harvey & Kennedy,
//! "A Simple, Fast Dominance Algorithm"), which converges quickly on the
//! small, mostly-structured CFGs IL functions produce.

use cranelift_entity::EntityRef;
use hashbrown::{HashMap, HashSet};
use viper_ir::{Block, Function, Instruction, Opcode};

/// Every block a terminator can transfer control to.
pub fn successors(inst: &Instruction) -> Vec<Block> {
    match inst.opcode {
        Opcode::Br | Opcode::Cbr => inst.targets.iter().map(|t| t.block).collect(),
        Opcode::SwitchI32 => {
            let mut out: Vec<Block> = inst.switch_cases.iter().map(|c| c.target.block).collect();
            out.extend(inst.targets.iter().map(|t| t.block));
            out
        }
        _ => Vec::new(),
    }
}

pub fn block_successors(f: &Function, b: Block) -> Vec<Block> {
    match f.block(b).terminator() {
        Some(inst) => successors(inst),
        None => Vec::new(),
    }
}

/// Blocks reachable from `entry`, in a reverse-postorder suitable for both
/// forward-dominance computation and as the fixed iteration order of the
/// dominator fixed-point loop.
pub fn reverse_postorder(f: &Function, entry: Block) -> Vec<Block> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            postorder.push(b);
            continue;
        }
        if !visited.insert(b) {
            continue;
        }
        stack.push((b, true));
        for succ in block_successors(f, b) {
            if !visited.contains(&succ) {
                stack.push((succ, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// A dominator tree over a reachable subset of a function's blocks, keyed by
/// the immediate dominator of each block (the entry's own idom is itself).
pub struct Dominators {
    rpo: Vec<Block>,
    rpo_index: HashMap<Block, usize>,
    idom: HashMap<Block, Block>,
    entry: Block,
}

impl Dominators {
    /// Compute dominators of the graph reachable from `entry` via `succ_fn`.
    pub fn compute(entry: Block, rpo: Vec<Block>, preds: &HashMap<Block, Vec<Block>>) -> Self {
        let rpo_index: HashMap<Block, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let mut idom: HashMap<Block, Block> = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter() {
                if b == entry {
                    continue;
                }
                let Some(preds_of_b) = preds.get(&b) else { continue };
                let mut new_idom: Option<Block> = None;
                for &p in preds_of_b {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&rpo_index, &idom, cur, p),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom.get(&b) != Some(&ni) {
                        idom.insert(b, ni);
                        changed = true;
                    }
                }
            }
        }

        Dominators { rpo, rpo_index, idom, entry }
    }

    pub fn is_reachable(&self, b: Block) -> bool {
        self.rpo_index.contains_key(&b)
    }

    /// `true` iff every path from the entry to `b` passes through `a`
    /// (reflexive: a block dominates itself).
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            if cur == self.entry {
                return a == self.entry;
            }
            cur = self.idom[&cur];
        }
    }

    pub fn reachable_blocks(&self) -> &[Block] {
        &self.rpo
    }
}

fn intersect(rpo_index: &HashMap<Block, usize>, idom: &HashMap<Block, Block>, mut a: Block, mut b: Block) -> Block {
    loop {
        match rpo_index[&a].cmp(&rpo_index[&b]) {
            std::cmp::Ordering::Greater => a = idom[&a],
            std::cmp::Ordering::Less => b = idom[&b],
            std::cmp::Ordering::Equal => return a,
        }
    }
}

/// Forward dominators from the function's entry block.
pub fn forward_dominators(f: &Function) -> Option<(Dominators, HashMap<Block, Vec<Block>>)> {
    let entry = f.entry()?;
    let rpo = reverse_postorder(f, entry);
    let mut preds: HashMap<Block, Vec<Block>> = HashMap::new();
    for &b in &rpo {
        for succ in block_successors(f, b) {
            preds.entry(succ).or_default().push(b);
        }
    }
    Some((Dominators::compute(entry, rpo, &preds), preds))
}

/// Post-dominators: dominators of the reverse graph rooted at a synthetic
/// exit that all `ret`/`trap`-terminated blocks flow into. A block with no
/// path to any exit (an infinite loop) is simply unreachable in this graph
/// and never post-dominated by anything but itself.
pub fn post_dominators(f: &Function) -> Option<Dominators> {
    let entry = f.entry()?;
    let fwd_rpo = reverse_postorder(f, entry);
    if fwd_rpo.is_empty() {
        return None;
    }

    // A synthetic node id outside any real block index range.
    let exit_block = Block::new(u32::MAX as usize);

    let mut orig_preds: HashMap<Block, Vec<Block>> = HashMap::new();
    let mut exiting_blocks = Vec::new();
    for &b in &fwd_rpo {
        for succ in block_successors(f, b) {
            orig_preds.entry(succ).or_default().push(b);
        }
        let exits_function = matches!(
            f.block(b).terminator().map(|i| i.opcode),
            Some(Opcode::Ret) | Some(Opcode::Trap) | Some(Opcode::TrapFromErr)
        );
        if exits_function {
            exiting_blocks.push(b);
        }
    }

    // Successors in the *reversed* graph: the virtual exit's successors are
    // the exiting blocks; every other block's successor is its set of
    // original predecessors.
    let rev_succ = |b: Block| -> Vec<Block> {
        if b == exit_block {
            exiting_blocks.clone()
        } else {
            orig_preds.get(&b).cloned().unwrap_or_default()
        }
    };

    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(exit_block, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            postorder.push(b);
            continue;
        }
        if !visited.insert(b) {
            continue;
        }
        stack.push((b, true));
        for s in rev_succ(b) {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    postorder.reverse();

    // Predecessors in the reversed graph: a real block's reversed-preds are
    // its original successors, plus the virtual exit if it exits the
    // function; the virtual exit itself has none.
    let mut rev_preds: HashMap<Block, Vec<Block>> = HashMap::new();
    for &b in &postorder {
        if b == exit_block {
            continue;
        }
        let mut ps = block_successors(f, b);
        if exiting_blocks.contains(&b) {
            ps.push(exit_block);
        }
        rev_preds.insert(b, ps);
    }

    Some(Dominators::compute(exit_block, postorder, &rev_preds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{BranchTarget, Instruction, Type};

    fn diamond() -> (Function, Block, Block, Block, Block) {
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let left = f.create_block("left");
        let right = f.create_block("right");
        let end = f.create_block("end");
        let cond = viper_ir::Value::const_int(Type::I1, 1);
        let mut cbr = Instruction::new(Opcode::Cbr);
        cbr.operands.push(cond);
        cbr.targets = smallvec::smallvec![BranchTarget::new(left, vec![]), BranchTarget::new(right, vec![])];
        f.push_inst(entry, cbr).unwrap();
        f.push_inst(left, Instruction::new(Opcode::Br).with_targets([BranchTarget::new(end, vec![])])).unwrap();
        f.push_inst(right, Instruction::new(Opcode::Br).with_targets([BranchTarget::new(end, vec![])])).unwrap();
        f.push_inst(end, Instruction::new(Opcode::Ret)).unwrap();
        (f, entry, left, right, end)
    }

    #[test]
    fn entry_dominates_everything_in_a_diamond() {
        let (f, entry, left, right, end) = diamond();
        let (doms, _) = forward_dominators(&f).unwrap();
        assert!(doms.dominates(entry, left));
        assert!(doms.dominates(entry, right));
        assert!(doms.dominates(entry, end));
        assert!(!doms.dominates(left, right));
        assert!(!doms.dominates(left, end));
    }

    #[test]
    fn end_postdominates_the_whole_diamond() {
        let (f, entry, left, right, _end) = diamond();
        let post = post_dominators(&f).unwrap();
        assert!(post.dominates(post_label(&f, "end"), entry));
        assert!(post.dominates(post_label(&f, "end"), left));
        assert!(post.dominates(post_label(&f, "end"), right));
    }

    fn post_label(f: &Function, label: &str) -> Block {
        f.block_by_label(label).unwrap()
    }
}
