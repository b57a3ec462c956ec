//! Pass 5: EH discipline (§3 invariant 4, §4.4, §8 P4).
//!
//! Walks every path from the entry block, maintaining an abstract
//! `eh.push`/`eh.pop` stack of handler labels. Three independent violations
//! are reported, each under its own stable code:
//!
//!   - `verify.eh.unreleased` — the push/pop stack is non-empty at a `ret`,
//!     or a `eh.pop` runs with nothing pushed.
//!   - `verify.eh.resume_token_missing` — a `resume.*` runs on a path that
//!     never executed `eh.entry`.
//!   - `verify.eh.resume_label_target` — `resume.label`'s target does not
//!     post-dominate the block it runs in.
//!
//! Because the push/pop stack and "do we hold a token" flag both depend on
//! path history, this is a DFS over the CFG (not a single linear scan like
//! the shape/type passes), revisiting a block only when it's reached with a
//! different abstract state — which bounds the walk for the structured,
//! non-pathological control flow IL lowering produces.

use crate::cfg::{block_successors, post_dominators};
use hashbrown::HashSet;
use viper_ir::{Block, Function, Opcode};
use viper_support::{Diagnostic, DiagnosticList};

#[derive(Clone, PartialEq, Eq, Hash)]
struct PathState {
    push_stack: Vec<String>,
    has_token: bool,
}

pub fn verify(f: &Function, diags: &mut DiagnosticList) {
    let Some(entry) = f.entry() else { return };
    let post_doms = post_dominators(f);

    let mut visited_states: HashSet<(Block, PathState)> = HashSet::new();
    let mut stack = vec![(entry, PathState { push_stack: Vec::new(), has_token: false })];

    while let Some((b, mut state)) = stack.pop() {
        let key = (b, state.clone());
        if !visited_states.insert(key) {
            continue;
        }

        let bb = f.block(b);
        for inst in &bb.insts {
            match inst.opcode {
                Opcode::EhPush => {
                    if let Some(label) = inst.labels.first() {
                        state.push_stack.push(label.clone());
                    }
                }
                Opcode::EhPop => {
                    if state.push_stack.pop().is_none() {
                        diags.push(Diagnostic::error(
                            "verify.eh.unreleased",
                            format!("`{}`: eh.pop with no matching eh.push (unmatched eh.push depth -1)", f.name),
                        ));
                    }
                }
                Opcode::EhEntry => {
                    state.has_token = true;
                }
                Opcode::ResumeSame | Opcode::ResumeNext | Opcode::ResumeLabel => {
                    if !state.has_token {
                        diags.push(Diagnostic::error(
                            "verify.eh.resume_token_missing",
                            format!("`{}`: {} executes without a live resume token", f.name, inst.opcode.mnemonic()),
                        ));
                    }
                    if inst.opcode == Opcode::ResumeLabel {
                        if let Some(label) = inst.labels.first() {
                            if let Some(target) = f.block_by_label(label) {
                                let ok = post_doms.as_ref().is_some_and(|pd| pd.dominates(target, b));
                                if !ok {
                                    diags.push(Diagnostic::error(
                                        "verify.eh.resume_label_target",
                                        format!(
                                            "`{}`: resume.label target `{label}` does not post-dominate the resuming block",
                                            f.name
                                        ),
                                    ));
                                }
                            }
                        }
                    }
                }
                Opcode::Ret => {
                    if !state.push_stack.is_empty() {
                        diags.push(Diagnostic::error(
                            "verify.eh.unreleased",
                            format!(
                                "`{}`: function returns with unmatched eh.push depth {}",
                                f.name,
                                state.push_stack.len()
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        for succ in block_successors(f, b) {
            stack.push((succ, state.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Instruction, Type};
    use viper_support::DiagnosticList;

    #[test]
    fn flags_unreleased_push_at_return() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let mut push = Instruction::new(Opcode::EhPush);
        push.labels.push("handler".into());
        f.push_inst(entry, push).unwrap();
        f.push_inst(entry, Instruction::new(Opcode::Ret)).unwrap();

        let mut diags = DiagnosticList::new();
        verify(&f, &mut diags);
        assert!(diags.contains_code("verify.eh.unreleased"));
        assert!(diags.iter().any(|d| d.message.contains("unmatched eh.push depth")));
    }

    #[test]
    fn balanced_push_pop_is_clean() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let mut push = Instruction::new(Opcode::EhPush);
        push.labels.push("handler".into());
        f.push_inst(entry, push).unwrap();
        f.push_inst(entry, Instruction::new(Opcode::EhPop)).unwrap();
        f.push_inst(entry, Instruction::new(Opcode::Ret)).unwrap();

        let mut diags = DiagnosticList::new();
        verify(&f, &mut diags);
        assert!(!diags.contains_code("verify.eh.unreleased"));
    }

    #[test]
    fn flags_resume_without_token() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let tok = f.fresh_value();
        f.push_inst(
            entry,
            Instruction::new(Opcode::ResumeSame).with_operands(vec![viper_ir::Value::temp(tok, Type::ResumeTok)]),
        )
        .unwrap();
        f.push_inst(entry, Instruction::new(Opcode::Ret)).unwrap();

        let mut diags = DiagnosticList::new();
        verify(&f, &mut diags);
        assert!(diags.contains_code("verify.eh.resume_token_missing"));
    }
}
