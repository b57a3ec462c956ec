//! Textual IL parsing (the other half of `L3`, alongside `viper_ir::write_module`).
//!
//! `parse_module` turns IL text back into a [`viper_ir::Module`]. It is
//! layout-insensitive — one instruction per line or everything crammed onto
//! one line both parse identically — which is what lets `parse(serialize(m))
//! == m` hold regardless of which style produced the text (§8 P1/L1).
//! Structural/type/dominance/EH checking is `viper-verify`'s job, not this
//! crate's: a module that parses is merely well-formed *lexically*.

mod error;
mod lexer;
mod parser;

pub use error::*;
pub use lexer::{LexError, Lexer, Tok};
pub use parser::parse_module;
