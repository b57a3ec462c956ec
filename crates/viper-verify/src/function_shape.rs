//! Pass 2: function shape (§4.4).
//!
//! Entry block present, every block terminated exactly once, every block
//! reachable from the entry. `BasicBlock::terminated` already guarantees "at
//! most once, as the last instruction" at construction time (§3 invariant
//! 3); this pass re-confirms it (a parser-built function is never run
//! through the builder, so nothing else has checked it yet) and adds
//! reachability and block-label-uniqueness checks the builder doesn't.

use crate::cfg::reverse_postorder;
use hashbrown::HashSet;
use viper_ir::Function;
use viper_support::{Diagnostic, DiagnosticList};

pub fn verify(f: &Function, diags: &mut DiagnosticList) {
    let Some(entry) = f.entry() else {
        diags.push(Diagnostic::error(
            "verify.function.no_entry",
            format!("function `{}` has no entry block", f.name),
        ));
        return;
    };

    let mut labels = HashSet::new();
    for (_, bb) in f.blocks_in_order() {
        if !labels.insert(bb.label.as_str()) {
            diags.push(Diagnostic::error(
                "verify.function.duplicate_block_label",
                format!("function `{}` has two blocks labelled `{}`", f.name, bb.label),
            ));
        }
        if !bb.terminated {
            diags.push(Diagnostic::error(
                "verify.function.not_terminated",
                format!("block `{}` in function `{}` is not terminated", bb.label, f.name),
            ));
        }
    }

    let reachable: HashSet<_> = reverse_postorder(f, entry).into_iter().collect();
    for (b, bb) in f.blocks_in_order() {
        if !reachable.contains(&b) {
            diags.push(Diagnostic::error(
                "verify.function.unreachable_block",
                format!("block `{}` in function `{}` is unreachable from the entry", bb.label, f.name),
            ));
        }
    }
}
