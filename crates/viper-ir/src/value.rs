//! Typed IL operands.
//!
//! Every `Value` carries exactly one [`Type`] (§3). A value is one of: a
//! constant integer or float, a reference to an interned string literal, an
//! SSA temporary, a reference to a module global's address, or a block
//! parameter. Block parameters and SSA temporaries share the `ValueId`
//! namespace — they're the phi-equivalent the verifier's dominance pass
//! treats uniformly (§4.4 pass 3).

use crate::entities::{Global, ValueId};
use crate::types::Type;
use core::fmt;

/// The payload half of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueData {
    ConstInt(i64),
    ConstFloat(f64),
    /// `const_str @name` — a reference to an interned string global.
    StrLit(Global),
    /// `global_addr @name` — the address of a global.
    GlobalAddr(Global),
    /// An instruction result.
    Temp(ValueId),
    /// A basic block's incoming parameter.
    BlockParam(ValueId),
}

/// A fully typed IL operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value {
    pub data: ValueData,
    pub ty: Type,
}

impl Value {
    pub fn const_int(ty: Type, v: i64) -> Self {
        debug_assert!(ty.is_integer());
        Value { data: ValueData::ConstInt(v), ty }
    }

    pub fn const_float(v: f64) -> Self {
        Value { data: ValueData::ConstFloat(v), ty: Type::F64 }
    }

    pub fn str_lit(global: Global) -> Self {
        Value { data: ValueData::StrLit(global), ty: Type::Str }
    }

    pub fn global_addr(global: Global) -> Self {
        Value { data: ValueData::GlobalAddr(global), ty: Type::Ptr }
    }

    pub fn temp(id: ValueId, ty: Type) -> Self {
        Value { data: ValueData::Temp(id), ty }
    }

    pub fn block_param(id: ValueId, ty: Type) -> Self {
        Value { data: ValueData::BlockParam(id), ty }
    }

    /// The underlying SSA id, for both instruction results and block
    /// parameters. `None` for constants, string literals, and global
    /// addresses.
    pub fn as_ssa(&self) -> Option<ValueId> {
        match self.data {
            ValueData::Temp(id) | ValueData::BlockParam(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, ValueData::ConstInt(_) | ValueData::ConstFloat(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data {
            // Constants carry an explicit `:ty` suffix so the parser never
            // has to guess an integer literal's width from context.
            ValueData::ConstInt(v) => write!(f, "{v}:{}", self.ty),
            ValueData::ConstFloat(v) => write!(f, "{v:?}:{}", self.ty),
            ValueData::StrLit(g) => write!(f, "const_str @{g}"),
            ValueData::GlobalAddr(g) => write!(f, "@{g}"),
            ValueData::Temp(id) | ValueData::BlockParam(id) => write!(f, "%{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn ssa_extraction() {
        let v = Value::temp(ValueId::new(2), Type::I64);
        assert_eq!(v.as_ssa(), Some(ValueId::new(2)));
        assert!(!v.is_constant());

        let c = Value::const_int(Type::I32, 5);
        assert_eq!(c.as_ssa(), None);
        assert!(c.is_constant());
    }
}
