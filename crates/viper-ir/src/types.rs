//! The IL's closed type lattice.
//!
//! Equality is structural: two `Type` values are equal iff they're the same
//! variant. There is no subtyping and no width-coercion implied by the type
//! system itself — conversions are explicit opcodes (`sitofp`, `trunc1`, …).

use core::fmt;

/// One of the IL's fixed set of value types (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    I1,
    I16,
    I32,
    I64,
    F64,
    /// Reference-counted string handle.
    Str,
    /// Opaque address.
    Ptr,
    /// Trap payload carried by `trap.from_err` / EH handler entry.
    Error,
    /// Resumption token handed to a catch handler, consumed by `resume.*`.
    ResumeTok,
}

impl Type {
    pub fn is_integer(self) -> bool {
        matches!(self, Type::I1 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F64)
    }

    /// Bit width for integer types; `None` for non-integer types.
    pub fn int_bits(self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            _ => None,
        }
    }

    /// Register-class hint used by the codegen backend: integer/pointer-like
    /// types go in GPRs, `F64` goes in FPRs. `Void` has no class.
    pub fn is_fpr(self) -> bool {
        matches!(self, Type::F64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Str => "str",
            Type::Ptr => "ptr",
            Type::Error => "error",
            Type::ResumeTok => "resume_tok",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Type {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "void" => Type::Void,
            "i1" => Type::I1,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f64" => Type::F64,
            "str" => Type::Str,
            "ptr" => Type::Ptr,
            "error" => Type::Error,
            "resume_tok" => Type::ResumeTok,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        for ty in [
            Type::Void,
            Type::I1,
            Type::I16,
            Type::I32,
            Type::I64,
            Type::F64,
            Type::Str,
            Type::Ptr,
            Type::Error,
            Type::ResumeTok,
        ] {
            let text = ty.to_string();
            assert_eq!(text.parse::<Type>().unwrap(), ty);
        }
    }
}
