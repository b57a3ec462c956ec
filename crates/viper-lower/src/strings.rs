//! String interning and the string-ownership (retain/release) discipline
//! (§4.2 "String interning" / "String-ownership insertion").

use crate::runtime_abi::ensure_extern;
use hashbrown::HashMap;
use viper_ir::{Block, GlobalDef, Instruction, IrBuilder, Module, Opcode, Type, Value};
use viper_support::SourceLoc;

/// `rt_str_retain_maybe(str) -> void`, called immediately after every `load`
/// of a heap-owned `Str` field (§4.2, §8 P3).
pub const RT_STR_RETAIN_MAYBE: &str = "rt_str_retain_maybe";
/// `rt_str_release_maybe(str) -> void`, called when an owned `Str` value's
/// lifetime ends.
pub const RT_STR_RELEASE_MAYBE: &str = "rt_str_release_maybe";

/// Interns string literals as `global const str @.Lk = "<bytes>"` entries and
/// hands back `const_str` IL values for them.
///
/// Interning is byte-exact (§4.2: "literals containing embedded null bytes
/// are distinct from shorter literals that happen to share a prefix"), so
/// the key is the raw byte sequence, never a `str`/`String`.
#[derive(Default)]
pub struct StringInterner {
    by_bytes: HashMap<Vec<u8>, String>,
    next: u32,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner { by_bytes: HashMap::new(), next: 0 }
    }

    /// The canonical global name for `bytes`, declaring a new global in
    /// `module` the first time this exact byte sequence is seen.
    pub fn intern(&mut self, module: &mut Module, bytes: &[u8]) -> String {
        if let Some(name) = self.by_bytes.get(bytes) {
            return name.clone();
        }
        let name = format!(".L{}", self.next);
        self.next += 1;
        module.declare_global(GlobalDef { name: name.clone(), is_const: true, bytes: bytes.to_vec() });
        self.by_bytes.insert(bytes.to_vec(), name.clone());
        name
    }

    /// Intern `bytes` and emit `const_str @name` at the builder's current
    /// block, producing the resulting `Str` value (§4.2 "b. an IL `Value` of
    /// kind `Str` produced by `const_str @name`").
    pub fn emit_const_str(&mut self, module: &mut Module, builder: &mut IrBuilder, bytes: &[u8], loc: SourceLoc) -> Value {
        let name = self.intern(module, bytes);
        let block: Block = builder.current().expect("no current block set");
        let id = builder.func_mut().fresh_value();
        let mut inst = Instruction::new(Opcode::ConstStr).with_result(id, Type::Str).with_loc(loc);
        inst.labels.push(name);
        builder.func_mut().push_inst(block, inst).expect("const_str emitted after terminator");
        Value::temp(id, Type::Str)
    }
}

/// Emit `call @rt_str_retain_maybe(%loaded)` immediately after a `load` of a
/// heap `Str` field — the contract that prevents use-after-free of strings
/// owned by entities (§4.2, §8 P3). Declares the extern on first use.
pub fn retain_loaded_str(module: &mut Module, builder: &mut IrBuilder, loaded: Value, loc: SourceLoc) {
    debug_assert_eq!(loaded.ty, Type::Str, "retain_loaded_str requires a Str value");
    ensure_extern(module, RT_STR_RETAIN_MAYBE, &[Type::Str], Type::Void);
    builder.emit_call(RT_STR_RETAIN_MAYBE, vec![loaded], Type::Void, loc);
}

/// Emit `call @rt_str_release_maybe(%val)` when an owned `Str` value's
/// lifetime ends (overwrite, out-of-scope, non-retaining parameter pass).
pub fn release_str(module: &mut Module, builder: &mut IrBuilder, val: Value, loc: SourceLoc) {
    debug_assert_eq!(val.ty, Type::Str, "release_str requires a Str value");
    ensure_extern(module, RT_STR_RELEASE_MAYBE, &[Type::Str], Type::Void);
    builder.emit_call(RT_STR_RELEASE_MAYBE, vec![val], Type::Void, loc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Version};

    fn fresh() -> (Module, Function) {
        (Module::new(Version::new(0, 2, Some(0))), Function::new("f", Type::Void, vec![]))
    }

    #[test]
    fn interning_is_byte_exact() {
        let (mut m, _f) = fresh();
        let mut interner = StringInterner::new();
        let a = interner.intern(&mut m, b"abc");
        let b = interner.intern(&mut m, b"abc\0");
        assert_ne!(a, b, "embedded-null literal must not collide with its prefix");
        let a_again = interner.intern(&mut m, b"abc");
        assert_eq!(a, a_again);
        assert_eq!(m.globals.values().count(), 2);
    }

    #[test]
    fn emit_const_str_reuses_the_same_global_for_repeats() {
        let (mut m, mut f) = fresh();
        let entry = f.create_block("entry");
        let mut interner = StringInterner::new();
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let v1 = interner.emit_const_str(&mut m, &mut b, b"hi", SourceLoc::UNKNOWN);
        let v2 = interner.emit_const_str(&mut m, &mut b, b"hi", SourceLoc::UNKNOWN);
        assert_ne!(v1, v2, "each const_str site gets its own SSA temp");
        assert_eq!(m.globals.values().count(), 1, "the underlying global is still interned once");
    }

    #[test]
    fn retain_declares_the_extern_exactly_once() {
        let (mut m, mut f) = fresh();
        let entry = f.create_block("entry");
        let mut b = IrBuilder::new(&mut f);
        b.set_current(entry);
        let mut interner = StringInterner::new();
        let s = interner.emit_const_str(&mut m, &mut b, b"hi", SourceLoc::UNKNOWN);
        retain_loaded_str(&mut m, &mut b, s, SourceLoc::UNKNOWN);
        release_str(&mut m, &mut b, s, SourceLoc::UNKNOWN);
        assert_eq!(m.externs.values().filter(|d| d.name == RT_STR_RETAIN_MAYBE).count(), 1);
        assert_eq!(m.externs.values().filter(|d| d.name == RT_STR_RELEASE_MAYBE).count(), 1);
    }
}
