//! Table-driven builtin dispatch (§4.2 "Builtin dispatch").
//!
//! A registry maps a builtin's canonical name to either a direct
//! coercion/call rule (the common case: one extern, one call) or a custom
//! lowering function with full access to [`BuiltinLowerContext`] for the
//! handful of builtins whose runtime call can fail in more than one way.
//! Either way dispatch itself is a single hash lookup, never a conditional
//! tree, so adding a builtin never touches the lowering code that calls
//! through here.

use crate::block_namer::BlockNamer;
use crate::rval::RVal;
use crate::runtime_abi::ensure_extern;
use crate::strings::StringInterner;
use hashbrown::{HashMap, HashSet};
use viper_ir::{Block, IrBuilder, Module, Opcode, Type, Value};
use viper_support::SourceLoc;

/// The coercion/binding rule for a table-driven builtin: which runtime
/// function implements it and what it expects/returns.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinRule {
    pub runtime_fn: &'static str,
    pub param_tys: &'static [Type],
    pub ret_ty: Type,
}

/// `cont`/`trap` pair from [`BuiltinLowerContext::guard_cont_trap`]: `trap`
/// is already terminated with `trap`, so the caller only ever needs to
/// branch into one or the other and keep building from `cont`.
#[derive(Clone, Copy, Debug)]
pub struct TrapGuard {
    pub cont: Block,
    pub trap: Block,
}

/// The block set behind a builtin that parses a string into a number
/// (§4.2: "specialised 'value parse' block sets with dedicated NaN/overflow
/// edges"). `nan` and `overflow` are both already terminated with `trap`;
/// the caller fills in `ok` with the successful-parse path and must leave
/// `cont` as the block execution rejoins at.
#[derive(Clone, Copy, Debug)]
pub struct ValueParseGuard {
    pub ok: Block,
    pub nan: Block,
    pub overflow: Block,
    pub cont: Block,
}

/// Tracks which runtime helpers a lowered builtin required, so a frontend
/// can decide at link/codegen time which optional runtime support to pull
/// in (§4.2: "feature-flag bookkeeping to mark required runtime helpers").
#[derive(Default)]
pub struct FeatureFlags {
    required: HashSet<&'static str>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        FeatureFlags::default()
    }

    pub fn require(&mut self, name: &'static str) {
        self.required.insert(name);
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required.iter().copied()
    }
}

/// What a builtin's lowering function sees: the pieces it needs to emit
/// calls, coerce arguments, branch into guard blocks, and intern any
/// literal operands, without taking on a dependency of its own on the
/// lowerer's internal bookkeeping.
///
/// `call_expr` carries the original call expression from the frontend's own
/// AST, opaque to this crate (§4.2: "the context exposes... the original
/// call expression") — frontends that need it for diagnostics or
/// source-level coercions downcast it themselves; `()` is the type when a
/// custom lowering function has no use for it.
pub struct BuiltinLowerContext<'a, 'f, C = ()> {
    pub module: &'a mut Module,
    pub builder: &'a mut IrBuilder<'f>,
    pub interner: &'a mut StringInterner,
    pub namer: &'a mut BlockNamer,
    pub features: &'a mut FeatureFlags,
    pub call_expr: C,
    pub loc: SourceLoc,
}

impl<'a, 'f, C> BuiltinLowerContext<'a, 'f, C> {
    /// A `cont`/`trap` pair (§4.2): allocates both blocks and terminates
    /// `trap` immediately, since a trap block never has anything left to do.
    /// Leaves the builder's current block untouched — the caller branches
    /// into one of the two and then keeps building from `cont`.
    pub fn guard_cont_trap(&mut self) -> TrapGuard {
        let current = self.builder.current();
        let cont = self.builder.add_block(self.namer.name("builtin_cont"));
        let trap = self.builder.add_block(self.namer.name("builtin_trap"));
        self.builder.set_current(trap);
        self.builder.emit_trap(self.loc);
        if let Some(b) = current {
            self.builder.set_current(b);
        }
        TrapGuard { cont, trap }
    }

    /// The "value parse" block set (§4.2): an `ok` path plus dedicated `nan`
    /// and `overflow` trap edges, both pre-terminated, and a `cont` block
    /// every path rejoins at. Used by builtins that coerce a string to a
    /// number and must distinguish "not a number at all" from "parsed but
    /// out of range" rather than collapsing both into one generic trap.
    pub fn guard_value_parse(&mut self) -> ValueParseGuard {
        let current = self.builder.current();
        let ok = self.builder.add_block(self.namer.name("value_parse_ok"));
        let nan = self.builder.add_block(self.namer.name("value_parse_nan"));
        let overflow = self.builder.add_block(self.namer.name("value_parse_overflow"));
        let cont = self.builder.add_block(self.namer.name("value_parse_cont"));

        self.builder.set_current(nan);
        self.builder.emit_trap(self.loc);
        self.builder.set_current(overflow);
        self.builder.emit_trap(self.loc);
        if let Some(b) = current {
            self.builder.set_current(b);
        }
        ValueParseGuard { ok, nan, overflow, cont }
    }

    /// Record that lowering this call required `name` from the runtime
    /// (§4.2: "feature-flag bookkeeping to mark required runtime helpers").
    pub fn require_feature(&mut self, name: &'static str) {
        self.features.require(name);
    }
}

/// One registered builtin: either the common table-driven shape (coerce,
/// declare extern, emit one call) or a custom lowering function for a
/// builtin whose runtime call can fail in more than one way.
enum BuiltinImpl {
    Direct(BuiltinRule),
    Custom(fn(&mut BuiltinLowerContext<()>, Vec<RVal>) -> Option<RVal>),
}

/// Canonical-name → implementation table (§4.2: "Dispatch MUST be
/// table-driven; no large conditional tree").
pub struct BuiltinRegistry {
    rules: HashMap<&'static str, BuiltinImpl>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        BuiltinRegistry { rules: HashMap::new() }
    }

    /// The representative builtin set named across §4.2/§6: string length,
    /// string-to-number parsing (the one builtin with its own NaN/overflow
    /// edges), numeric-to-string coercion, and a transcendental math
    /// function to stand in for the rest of the language-specific builtin
    /// surface (out of scope per §1 Non-goals — only the dispatch mechanism
    /// itself is specified here).
    pub fn standard() -> Self {
        let mut reg = BuiltinRegistry::new();
        reg.register("len", BuiltinRule { runtime_fn: "rt_len", param_tys: &[Type::Str], ret_ty: Type::I64 });
        reg.register(
            "cos",
            BuiltinRule { runtime_fn: "rt_cos", param_tys: &[Type::F64], ret_ty: Type::F64 },
        );
        reg.register_custom("val", lower_val);
        reg
    }

    pub fn register(&mut self, name: &'static str, rule: BuiltinRule) {
        self.rules.insert(name, BuiltinImpl::Direct(rule));
    }

    pub fn register_custom(&mut self, name: &'static str, f: fn(&mut BuiltinLowerContext<()>, Vec<RVal>) -> Option<RVal>) {
        self.rules.insert(name, BuiltinImpl::Custom(f));
    }

    pub fn rule(&self, name: &str) -> Option<&BuiltinRule> {
        match self.rules.get(name)? {
            BuiltinImpl::Direct(rule) => Some(rule),
            BuiltinImpl::Custom(_) => None,
        }
    }

    /// Lower a call to builtin `name` with already-coerced `args`, returning
    /// `None` both when the builtin has no result and when `name` isn't
    /// registered.
    pub fn lower(&self, name: &str, ctx: &mut BuiltinLowerContext<()>, args: Vec<RVal>) -> Option<RVal> {
        match self.rules.get(name)? {
            BuiltinImpl::Direct(rule) => {
                let rule = *rule;
                ensure_extern(ctx.module, rule.runtime_fn, rule.param_tys, rule.ret_ty);
                let vals = args.into_iter().map(|a| a.value).collect();
                ctx.builder.emit_call(rule.runtime_fn, vals, rule.ret_ty, ctx.loc).map(RVal::new)
            }
            BuiltinImpl::Custom(f) => f(ctx, args),
        }
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        BuiltinRegistry::new()
    }
}

const RT_PARSE_STATUS: &str = "rt_parse_status";
const RT_TO_INT: &str = "rt_to_int";

/// `val`: parse a string as an integer, trapping through dedicated NaN and
/// overflow edges rather than one generic failure block (§4.2). The runtime
/// is asked for a status first (`0` = ok, `1` = not a number, anything else
/// = out of range) and only calls the fallible conversion once that status
/// says it will succeed.
fn lower_val(ctx: &mut BuiltinLowerContext<()>, args: Vec<RVal>) -> Option<RVal> {
    let s = args.into_iter().next().expect("val takes exactly one string argument");
    ctx.require_feature("checked_numeric_parse");
    ensure_extern(ctx.module, RT_PARSE_STATUS, &[Type::Str], Type::I32);
    ensure_extern(ctx.module, RT_TO_INT, &[Type::Str], Type::I64);

    let guard = ctx.guard_value_parse();
    let status = ctx.builder.emit_call(RT_PARSE_STATUS, vec![s.value], Type::I32, ctx.loc).expect("rt_parse_status always returns a value");

    let is_nan = ctx.builder.emit_cmp(Opcode::IcmpNe, status, Value::const_int(Type::I32, 0), ctx.loc);
    let overflow_check = ctx.builder.add_block(ctx.namer.name("value_parse_overflow_check"));
    ctx.builder.emit_cbr(is_nan, overflow_check, vec![], guard.ok, vec![], ctx.loc);

    ctx.builder.set_current(overflow_check);
    let is_overflow = ctx.builder.emit_cmp(Opcode::IcmpEq, status, Value::const_int(Type::I32, 1), ctx.loc);
    ctx.builder.emit_cbr(is_overflow, guard.overflow, vec![], guard.nan, vec![], ctx.loc);

    ctx.builder.set_current(guard.ok);
    let parsed = ctx.builder.emit_call(RT_TO_INT, vec![s.value], Type::I64, ctx.loc).expect("rt_to_int always returns a value on the checked-ok path");
    ctx.builder.emit_br(guard.cont, vec![], ctx.loc);

    ctx.builder.set_current(guard.cont);
    Some(RVal::new(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Module, Value, Version};

    fn new_ctx<'a, 'f>(
        module: &'a mut Module,
        builder: &'a mut IrBuilder<'f>,
        interner: &'a mut StringInterner,
        namer: &'a mut BlockNamer,
        features: &'a mut FeatureFlags,
    ) -> BuiltinLowerContext<'a, 'f, ()> {
        BuiltinLowerContext { module, builder, interner, namer, features, call_expr: (), loc: SourceLoc::UNKNOWN }
    }

    #[test]
    fn len_dispatches_to_rt_len() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut interner = StringInterner::new();
        let mut namer = BlockNamer::new();
        let mut features = FeatureFlags::new();
        let reg = BuiltinRegistry::standard();
        let s = interner.emit_const_str(&mut m, &mut b, b"hi", SourceLoc::UNKNOWN);
        let mut ctx = new_ctx(&mut m, &mut b, &mut interner, &mut namer, &mut features);
        let result = reg.lower("len", &mut ctx, vec![RVal::new(s)]).expect("len returns a value");
        assert_eq!(result.ty, Type::I64);
        assert!(m.extern_by_name("rt_len").is_some());
        let _ = Value::const_int(Type::I64, 0);
    }

    #[test]
    fn unknown_builtin_dispatches_to_nothing() {
        let reg = BuiltinRegistry::standard();
        assert!(reg.rule("not_a_builtin").is_none());
    }

    #[test]
    fn val_is_a_custom_builtin_with_no_direct_rule() {
        let reg = BuiltinRegistry::standard();
        assert!(reg.rule("val").is_none(), "val is Custom, not Direct");
    }

    #[test]
    fn val_requires_the_checked_numeric_parse_feature_and_declares_both_externs() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut interner = StringInterner::new();
        let mut namer = BlockNamer::new();
        let mut features = FeatureFlags::new();
        let reg = BuiltinRegistry::standard();
        let s = interner.emit_const_str(&mut m, &mut b, b"42", SourceLoc::UNKNOWN);
        let mut ctx = new_ctx(&mut m, &mut b, &mut interner, &mut namer, &mut features);
        let result = reg.lower("val", &mut ctx, vec![RVal::new(s)]);
        assert!(result.is_some(), "val's ok path produces a value");
        assert!(features.is_required("checked_numeric_parse"));
        assert!(m.extern_by_name(RT_PARSE_STATUS).is_some());
        assert!(m.extern_by_name(RT_TO_INT).is_some());
    }

    #[test]
    fn val_builds_dedicated_nan_and_overflow_trap_blocks() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut interner = StringInterner::new();
        let mut namer = BlockNamer::new();
        let mut features = FeatureFlags::new();
        let reg = BuiltinRegistry::standard();
        let s = interner.emit_const_str(&mut m, &mut b, b"not a number", SourceLoc::UNKNOWN);
        let mut ctx = new_ctx(&mut m, &mut b, &mut interner, &mut namer, &mut features);
        reg.lower("val", &mut ctx, vec![RVal::new(s)]);

        let nan_block = b.func().blocks_in_order().find(|(_, blk)| blk.label == "value_parse_nan_0").expect("nan block exists");
        let overflow_block = b.func().blocks_in_order().find(|(_, blk)| blk.label == "value_parse_overflow_0").expect("overflow block exists");
        assert_eq!(nan_block.1.insts.last().map(|i| i.opcode), Some(Opcode::Trap));
        assert_eq!(overflow_block.1.insts.last().map(|i| i.opcode), Some(Opcode::Trap));
    }

    #[test]
    fn guard_cont_trap_pre_terminates_the_trap_block_and_restores_current() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        let mut f = Function::new("f", Type::I64, vec![]);
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut interner = StringInterner::new();
        let mut namer = BlockNamer::new();
        let mut features = FeatureFlags::new();
        let mut ctx = new_ctx(&mut m, &mut b, &mut interner, &mut namer, &mut features);
        let guard = ctx.guard_cont_trap();
        assert_eq!(ctx.builder.current(), Some(entry), "factory must not leave a different block current");
        assert!(ctx.builder.func().block(guard.trap).terminated);
        assert!(!ctx.builder.func().block(guard.cont).terminated);
    }
}
