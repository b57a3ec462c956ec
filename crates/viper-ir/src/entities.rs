//! Opaque entity references into a [`Function`](crate::function::Function)
//! or [`Module`](crate::module::Module).
//!
//! These wrap a `u32` index the same way `cranelift_entity`'s own IR entities
//! do, rather than using real Rust references, so that functions and blocks
//! stay `Copy`, cheap to pass around, and free of lifetime parameters.

use cranelift_entity::entity_impl;
use core::fmt;

/// A reference to a basic block within its owning function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an SSA value: either an instruction result or a block
/// parameter. Constants and literals are *not* `ValueId`s — see
/// [`crate::value::Value`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);
entity_impl!(ValueId, "v");

/// A reference to a module-scoped global (a named, possibly `const`, byte
/// payload).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Global(u32);
entity_impl!(Global, "g");

/// A reference to a module-scoped extern declaration.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extern(u32);
entity_impl!(Extern, "extern");

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn entities_display_with_their_prefix() {
        assert_eq!(Block::new(3).to_string(), "block3");
        assert_eq!(ValueId::new(7).to_string(), "v7");
        assert_eq!(Global::new(0).to_string(), "g0");
    }
}
