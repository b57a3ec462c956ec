//! Passes 3 and 4: SSA dominance + per-opcode type contracts, and
//! block-argument arity/typing on every branch edge (§3 invariants 1-3, §8
//! P5).
//!
//! Both passes share one walk over the function because both need the same
//! "where was this value defined" bookkeeping.

use crate::cfg::forward_dominators;
use cranelift_entity::EntityRef;
use hashbrown::HashMap;
use viper_ir::{Block, Function, Instruction, Module, Opcode, Type, Value, ValueData, ValueId};
use viper_support::{Diagnostic, DiagnosticList};

#[derive(Clone, Copy)]
enum DefSite {
    /// A block parameter: live from the very start of the block.
    BlockEntry(Block),
    /// An instruction result at position `index` within its block.
    Instruction(Block, usize),
}

pub fn verify(module: &Module, f: &Function, diags: &mut DiagnosticList) {
    let Some((doms, _preds)) = forward_dominators(f) else { return };

    let mut defs: HashMap<ValueId, DefSite> = HashMap::new();
    for &b in doms.reachable_blocks() {
        let bb = f.block(b);
        for p in &bb.params {
            defs.insert(p.id, DefSite::BlockEntry(b));
        }
        for (i, inst) in bb.insts.iter().enumerate() {
            if let Some(id) = inst.result {
                defs.insert(id, DefSite::Instruction(b, i));
            }
        }
    }

    for &b in doms.reachable_blocks() {
        let bb = f.block(b);
        for p in &bb.params {
            let _ = p; // params have no operands to check
        }
        for (i, inst) in bb.insts.iter().enumerate() {
            for operand in &inst.operands {
                check_dominance(f, &doms, &defs, b, i, operand, diags);
            }
            for target in &inst.targets {
                for arg in &target.args {
                    check_dominance(f, &doms, &defs, b, i, arg, diags);
                }
                check_branch_arity(f, inst.opcode, target, diags);
            }
            for case in &inst.switch_cases {
                for arg in &case.target.args {
                    check_dominance(f, &doms, &defs, b, i, arg, diags);
                }
                check_branch_arity(f, inst.opcode, &case.target, diags);
            }
            check_opcode_types(module, f, inst, diags);
        }
    }
}

fn check_dominance(
    f: &Function,
    doms: &crate::cfg::Dominators,
    defs: &HashMap<ValueId, DefSite>,
    use_block: Block,
    use_index: usize,
    v: &Value,
    diags: &mut DiagnosticList,
) {
    let Some(id) = v.as_ssa() else { return };
    let Some(&site) = defs.get(&id) else {
        diags.push(Diagnostic::error(
            "verify.ssa.undefined",
            format!("%{} used in `{}` before any definition reaches it", id.index(), f.name),
        ));
        return;
    };
    let ok = match site {
        DefSite::BlockEntry(def_block) => {
            if def_block == use_block {
                true
            } else {
                doms.dominates(def_block, use_block)
            }
        }
        DefSite::Instruction(def_block, def_index) => {
            if def_block == use_block {
                def_index < use_index
            } else {
                doms.dominates(def_block, use_block)
            }
        }
    };
    if !ok {
        diags.push(Diagnostic::error(
            "verify.ssa.dominance",
            format!("%{} is used in `{}` without dominating its definition", id.index(), f.name),
        ));
    }
}

fn check_branch_arity(f: &Function, opcode: Opcode, target: &viper_ir::BranchTarget, diags: &mut DiagnosticList) {
    let dest = f.block(target.block);
    if target.args.len() != dest.params.len() {
        diags.push(Diagnostic::error(
            "verify.branch.arity",
            format!(
                "`{}` supplies {} argument(s) to `{}`, which expects {}",
                opcode.mnemonic(),
                target.args.len(),
                dest.label,
                dest.params.len()
            ),
        ));
        return;
    }
    for (arg, param) in target.args.iter().zip(dest.params.iter()) {
        if arg.ty != param.ty {
            diags.push(Diagnostic::error(
                "verify.branch.arity",
                format!(
                    "`{}` passes a {} argument where `{}` expects {} for `%{}`",
                    opcode.mnemonic(),
                    arg.ty,
                    dest.label,
                    param.ty,
                    param.id.index()
                ),
            ));
        }
    }
}

fn mismatch(diags: &mut DiagnosticList, opcode: Opcode, detail: impl std::fmt::Display) {
    diags.push(Diagnostic::error(
        "verify.type.mismatch",
        format!("`{}`: {}", opcode.mnemonic(), detail),
    ));
}

fn check_opcode_types(module: &Module, f: &Function, inst: &Instruction, diags: &mut DiagnosticList) {
    use Opcode::*;
    match inst.opcode {
        Add | Sub | Mul | SDiv | SDivChk0 | UDiv | UDivChk0 | SRem | URem | And | Or | Xor | Shl | Lshr | Ashr
        | IAddOvf => {
            let [a, b] = operand_pair(inst, diags, f) else { return };
            if a.ty != b.ty || a.ty != inst.result_ty {
                mismatch(diags, inst.opcode, format!("operands {} / {} must both match result type {}", a.ty, b.ty, inst.result_ty));
            } else if !a.ty.is_integer() {
                mismatch(diags, inst.opcode, format!("expects integer operands, found {}", a.ty));
            }
        }
        IcmpEq | IcmpNe => {
            let [a, b] = operand_pair(inst, diags, f) else { return };
            if a.ty != b.ty {
                mismatch(diags, inst.opcode, format!("operand types differ: {} vs {}", a.ty, b.ty));
            }
            if inst.result_ty != Type::I1 {
                mismatch(diags, inst.opcode, format!("result must be i1, found {}", inst.result_ty));
            }
        }
        ScmpLt | ScmpLe | ScmpGt | ScmpGe | UcmpLt | UcmpLe | UcmpGt | UcmpGe => {
            let [a, b] = operand_pair(inst, diags, f) else { return };
            if a.ty != b.ty || !a.ty.is_integer() {
                mismatch(diags, inst.opcode, format!("expects two matching integer operands, found {} / {}", a.ty, b.ty));
            }
            if inst.result_ty != Type::I1 {
                mismatch(diags, inst.opcode, format!("result must be i1, found {}", inst.result_ty));
            }
        }
        FcmpEq | FcmpLt | FcmpLe | FcmpGt | FcmpGe => {
            let [a, b] = operand_pair(inst, diags, f) else { return };
            if a.ty != Type::F64 || b.ty != Type::F64 {
                mismatch(diags, inst.opcode, format!("expects two f64 operands, found {} / {}", a.ty, b.ty));
            }
            if inst.result_ty != Type::I1 {
                mismatch(diags, inst.opcode, format!("result must be i1, found {}", inst.result_ty));
            }
        }
        Sitofp => {
            if let Some(a) = operand_one(inst, diags) {
                if !a.ty.is_integer() {
                    mismatch(diags, inst.opcode, format!("operand must be integer, found {}", a.ty));
                }
                if inst.result_ty != Type::F64 {
                    mismatch(diags, inst.opcode, format!("result must be f64, found {}", inst.result_ty));
                }
            }
        }
        Fptosi => {
            if let Some(a) = operand_one(inst, diags) {
                if a.ty != Type::F64 {
                    mismatch(diags, inst.opcode, format!("operand must be f64, found {}", a.ty));
                }
                if !inst.result_ty.is_integer() {
                    mismatch(diags, inst.opcode, format!("result must be integer, found {}", inst.result_ty));
                }
            }
        }
        Trunc1 | Zext1 | Sext | Zext => {
            if let Some(a) = operand_one(inst, diags) {
                if !a.ty.is_integer() || !inst.result_ty.is_integer() {
                    mismatch(diags, inst.opcode, format!("expects integer operand and result, found {} -> {}", a.ty, inst.result_ty));
                }
            }
        }
        Alloca => {
            if inst.result_ty != Type::Ptr {
                mismatch(diags, inst.opcode, format!("result must be ptr, found {}", inst.result_ty));
            }
        }
        Load => {
            if let Some(a) = operand_one(inst, diags) {
                if a.ty != Type::Ptr {
                    mismatch(diags, inst.opcode, format!("address operand must be ptr, found {}", a.ty));
                }
            }
        }
        Store => {
            if inst.operands.len() != 2 {
                mismatch(diags, inst.opcode, format!("expects (ptr, value), found {} operand(s)", inst.operands.len()));
            } else if inst.operands[0].ty != Type::Ptr {
                mismatch(diags, inst.opcode, format!("address operand must be ptr, found {}", inst.operands[0].ty));
            }
        }
        ConstStr => {
            if inst.result_ty != Type::Str {
                mismatch(diags, inst.opcode, format!("result must be str, found {}", inst.result_ty));
            }
        }
        GlobalAddr => {
            if inst.result_ty != Type::Ptr && inst.result_ty != Type::Void {
                mismatch(diags, inst.opcode, format!("result must be ptr, found {}", inst.result_ty));
            }
        }
        Ret => {
            let expected = f.ret_ty;
            if expected == Type::Void {
                if !inst.operands.is_empty() {
                    mismatch(diags, inst.opcode, "returns a value from a void function");
                }
            } else if inst.operands.len() != 1 {
                mismatch(diags, inst.opcode, format!("expects exactly one value of type {expected}"));
            } else if inst.operands[0].ty != expected {
                mismatch(diags, inst.opcode, format!("returns {}, function declares {}", inst.operands[0].ty, expected));
            }
        }
        Cbr => {
            if let Some(a) = operand_one(inst, diags) {
                if a.ty != Type::I1 {
                    mismatch(diags, inst.opcode, format!("condition must be i1, found {}", a.ty));
                }
            }
        }
        SwitchI32 => {
            if let Some(a) = operand_one(inst, diags) {
                if a.ty != Type::I32 {
                    mismatch(diags, inst.opcode, format!("selector must be i32, found {}", a.ty));
                }
            }
        }
        Call => {
            let Some(callee) = inst.labels.first() else { return };
            check_call_signature(module, f, inst, callee, diags);
        }
        _ => {}
    }
}

fn operand_pair<'i>(inst: &'i Instruction, diags: &mut DiagnosticList, f: &Function) -> Option<[&'i Value; 2]> {
    let _ = f;
    if inst.operands.len() != 2 {
        mismatch(diags, inst.opcode, format!("expects two operands, found {}", inst.operands.len()));
        return None;
    }
    Some([&inst.operands[0], &inst.operands[1]])
}

fn operand_one<'i>(inst: &'i Instruction, diags: &mut DiagnosticList) -> Option<&'i Value> {
    if inst.operands.len() != 1 {
        mismatch(diags, inst.opcode, format!("expects one operand, found {}", inst.operands.len()));
        return None;
    }
    Some(&inst.operands[0])
}

fn check_call_signature(module: &Module, f: &Function, inst: &Instruction, callee: &str, diags: &mut DiagnosticList) {
    let (param_tys, ret_ty): (Vec<Type>, Type) = if let Some((_, decl)) = module.extern_by_name(callee) {
        (decl.param_tys.clone(), decl.ret_ty)
    } else if let Some(callee_fn) = module.function_by_name(callee) {
        (callee_fn.param_tys.clone(), callee_fn.ret_ty)
    } else {
        diags.push(Diagnostic::error(
            "verify.type.call_signature",
            format!("call in `{}` names undeclared callee `@{callee}`", f.name),
        ));
        return;
    };

    if inst.operands.len() != param_tys.len() {
        diags.push(Diagnostic::error(
            "verify.type.call_signature",
            format!(
                "call to `@{callee}` in `{}` passes {} argument(s), expected {}",
                f.name,
                inst.operands.len(),
                param_tys.len()
            ),
        ));
    } else {
        for (arg, expected) in inst.operands.iter().zip(param_tys.iter()) {
            if arg.ty != *expected {
                diags.push(Diagnostic::error(
                    "verify.type.call_signature",
                    format!("call to `@{callee}` in `{}` passes {}, expected {}", f.name, arg.ty, expected),
                ));
            }
        }
    }

    if inst.result_ty != ret_ty {
        diags.push(Diagnostic::error(
            "verify.type.call_signature",
            format!("call to `@{callee}` in `{}` expects return type {}, got {}", f.name, ret_ty, inst.result_ty),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{BranchTarget, Instruction as Inst, Module, Version};

    #[test]
    fn flags_branch_argument_arity_mismatch() {
        let mut f = Function::new("f", Type::Void, vec![]);
        let entry = f.create_block("entry");
        let target = f.create_block_with_params("target", &[Type::I64]);
        f.push_inst(entry, Inst::new(Opcode::Br).with_targets([BranchTarget::new(target, vec![])])).unwrap();
        f.push_inst(target, Inst::new(Opcode::Ret)).unwrap();

        let m = Module::new(Version::new(0, 2, Some(0)));
        let mut diags = DiagnosticList::new();
        verify(&m, &f, &mut diags);
        assert!(diags.contains_code("verify.branch.arity"));
    }

    #[test]
    fn flags_type_mismatched_binop() {
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let id = f.fresh_value();
        let mut inst = Inst::new(Opcode::Add).with_result(id, Type::I64);
        inst.operands = smallvec::smallvec![Value::const_int(Type::I32, 1), Value::const_int(Type::I64, 2)];
        f.push_inst(entry, inst).unwrap();
        f.push_inst(entry, Inst::new(Opcode::Ret).with_operands(vec![Value::temp(id, Type::I64)])).unwrap();

        let m = Module::new(Version::new(0, 2, Some(0)));
        let mut diags = DiagnosticList::new();
        verify(&m, &f, &mut diags);
        assert!(diags.contains_code("verify.type.mismatch"));
    }
}
