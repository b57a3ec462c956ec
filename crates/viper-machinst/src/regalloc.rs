//! Linear-scan register allocation (`L10`) over the GPR/FPR classes (§4.6
//! "Register allocator").
//!
//! Block-parameter values are never candidates here — callers pre-assign
//! them a spill slot (`MirBlock::param_slots`) before instruction selection
//! even runs, turning every cross-block transfer into an explicit
//! store/load pair rather than a parallel copy the allocator would need to
//! reason about under merges. What this module allocates is everything
//! else: the ordinary def/use temporaries instruction selection introduces
//! within a block.

use crate::mir::MirFunction;
use crate::regs::{PReg, Reg, RegClass, VReg, CALLEE_SAVED_FPR, CALLEE_SAVED_GPR, CALLER_SAVED_FPR, CALLER_SAVED_GPR};
use cranelift_entity::EntityRef;
use hashbrown::{HashMap, HashSet};

/// Where a virtual register ended up after allocation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Assignment {
    Phys(PReg),
    Spill(u32),
}

pub struct RegAllocResult {
    pub assignments: HashMap<VReg, Assignment>,
    pub spill_slot_count: u32,
    pub used_callee_saved: Vec<PReg>,
}

#[derive(Clone, Copy)]
struct LiveRange {
    vreg: VReg,
    start: u32,
    end: u32,
    crosses_call: bool,
}

/// Flattens a function's blocks into one position-numbered instruction
/// stream (one position per def/use opportunity) and records, per `VReg`,
/// its first def and last use position plus whether any call instruction
/// falls within that span.
fn compute_live_ranges(func: &MirFunction) -> Vec<LiveRange> {
    let mut first: HashMap<VReg, u32> = HashMap::new();
    let mut last: HashMap<VReg, u32> = HashMap::new();
    let mut call_positions: Vec<u32> = Vec::new();

    let mut pos: u32 = 0;
    for block in &func.blocks {
        for inst in &block.insts {
            if inst.is_call() {
                call_positions.push(pos);
            }
            for r in inst.uses() {
                if let Reg::Virtual(v) = r {
                    last.insert(v, pos);
                    first.entry(v).or_insert(pos);
                }
            }
            for r in inst.defs() {
                if let Reg::Virtual(v) = r {
                    first.entry(v).or_insert(pos);
                    last.entry(v).or_insert(pos);
                }
            }
            pos += 1;
        }
    }

    let mut ranges: Vec<LiveRange> = first
        .into_iter()
        .map(|(vreg, start)| {
            let end = *last.get(&vreg).unwrap_or(&start);
            let crosses_call = call_positions.iter().any(|&c| c >= start && c <= end);
            LiveRange { vreg, start, end, crosses_call }
        })
        .collect();
    // `first`/`last` are hash maps, so their iteration order is not itself
    // deterministic across runs; sort by vreg index (a stable, run-
    // independent key) before the allocator ever sees them so identical MIR
    // always produces identical assignments (§8 L3).
    ranges.sort_by_key(|r| r.vreg.index());
    ranges
}

struct Pool {
    caller: Vec<u8>,
    callee: Vec<u8>,
}

impl Pool {
    fn new(caller: &[u8], callee: &[u8]) -> Pool {
        Pool { caller: caller.to_vec(), callee: callee.to_vec() }
    }

    fn take(&mut self, prefer_callee_saved: bool) -> Option<u8> {
        if prefer_callee_saved {
            self.callee.pop().or_else(|| self.caller.pop())
        } else {
            self.caller.pop().or_else(|| self.callee.pop())
        }
    }

    fn give_back(&mut self, num: u8, was_callee_saved: &HashSet<u8>) {
        if was_callee_saved.contains(&num) {
            self.callee.push(num);
        } else {
            self.caller.push(num);
        }
    }
}

struct ActiveEntry {
    range: LiveRange,
    num: u8,
}

/// Runs one class's linear scan in isolation; GPR and FPR never contend for
/// the same pool.
fn scan_class(mut ranges: Vec<LiveRange>, class: RegClass, caller_saved: &[u8], callee_saved: &[u8]) -> (HashMap<VReg, Assignment>, HashSet<u8>) {
    ranges.sort_by_key(|r| (r.start, r.vreg.index()));
    let mut pool = Pool::new(caller_saved, callee_saved);
    let callee_set: HashSet<u8> = callee_saved.iter().copied().collect();
    let mut active: Vec<ActiveEntry> = Vec::new();
    let mut assignments = HashMap::new();
    let mut used_callee_saved = HashSet::new();

    for range in ranges {
        active.retain(|a| {
            if a.range.end < range.start {
                pool.give_back(a.num, &callee_set);
                false
            } else {
                true
            }
        });

        let want_callee_saved = range.crosses_call;
        match pool.take(want_callee_saved) {
            Some(num) => {
                if callee_set.contains(&num) {
                    used_callee_saved.insert(num);
                }
                assignments.insert(range.vreg, Assignment::Phys(PReg { class, num }));
                active.push(ActiveEntry { range, num });
            }
            None if want_callee_saved => {
                // No callee-saved register free: must spill since leaving
                // this value in a caller-saved register would not survive
                // the call it crosses.
                log::trace!("regalloc: spilling v{} (no free callee-saved {:?} register, crosses a call)", range.vreg.index(), class);
                assignments.insert(range.vreg, Assignment::Spill(u32::MAX));
            }
            None => {
                // Spill the active entry whose range ends furthest out, if
                // it ends later than this one; otherwise spill the new one.
                let victim = active.iter().enumerate().max_by_key(|(_, a)| a.range.end);
                match victim {
                    Some((idx, a)) if a.range.end > range.end => {
                        let freed_num = a.num;
                        let freed_vreg = a.range.vreg;
                        log::trace!("regalloc: spilling v{} to free {:?}#{} for v{}", freed_vreg.index(), class, freed_num, range.vreg.index());
                        active.remove(idx);
                        assignments.insert(freed_vreg, Assignment::Spill(u32::MAX));
                        if callee_set.contains(&freed_num) {
                            used_callee_saved.insert(freed_num);
                        }
                        assignments.insert(range.vreg, Assignment::Phys(PReg { class, num: freed_num }));
                        active.push(ActiveEntry { range, num: freed_num });
                    }
                    _ => {
                        log::trace!("regalloc: spilling v{} ({:?} pool exhausted)", range.vreg.index(), class);
                        assignments.insert(range.vreg, Assignment::Spill(u32::MAX));
                    }
                }
            }
        }
    }

    (assignments, used_callee_saved)
}

/// Runs linear-scan allocation over `func`, excluding `block_params` (which
/// the caller has already routed to fixed spill slots).
pub fn allocate(func: &MirFunction, block_param_vregs: &HashSet<VReg>) -> RegAllocResult {
    let all_ranges = compute_live_ranges(func);
    let (gpr_ranges, fpr_ranges): (Vec<_>, Vec<_>) = all_ranges
        .into_iter()
        .filter(|r| !block_param_vregs.contains(&r.vreg))
        .partition(|r| func.vreg_class(r.vreg) == RegClass::Gpr);

    let (mut assignments, used_gpr) = scan_class(gpr_ranges, RegClass::Gpr, &CALLER_SAVED_GPR, &CALLEE_SAVED_GPR);
    let (fpr_assignments, used_fpr) = scan_class(fpr_ranges, RegClass::Fpr, &CALLER_SAVED_FPR, &CALLEE_SAVED_FPR);
    assignments.extend(fpr_assignments);

    let mut next_slot = 0u32;
    let mut sorted_params: Vec<VReg> = block_param_vregs.iter().copied().collect();
    sorted_params.sort_by_key(|v| v.index());
    for v in sorted_params {
        assignments.insert(v, Assignment::Spill(next_slot));
        next_slot += 1;
    }
    // Spilled non-param vregs get the remaining slots in vreg-index order —
    // `assignments` is a hash map, so iterate a sorted key list rather than
    // its own (non-deterministic) iteration order (§8 L3).
    let mut spilled: Vec<VReg> = assignments
        .iter()
        .filter(|(_, a)| matches!(a, Assignment::Spill(u32::MAX)))
        .map(|(v, _)| *v)
        .collect();
    spilled.sort_by_key(|v| v.index());
    for v in spilled {
        assignments.insert(v, Assignment::Spill(next_slot));
        next_slot += 1;
    }

    let mut used_callee_saved: Vec<PReg> = used_gpr.into_iter().map(PReg::gpr).collect();
    used_callee_saved.extend(used_fpr.into_iter().map(PReg::fpr));
    used_callee_saved.sort_by_key(|p| (p.class == RegClass::Fpr, p.num));

    RegAllocResult { assignments, spill_slot_count: next_slot, used_callee_saved }
}
