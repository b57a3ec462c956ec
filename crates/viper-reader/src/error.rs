//! `parse.*` diagnostic codes (§7).

use crate::lexer::{LexError, Tok};
use viper_support::{Diagnostic, SourceLoc};

/// `parse_module` takes one source string with no file table of its own, so
/// every diagnostic it raises is attributed to the same synthetic file id —
/// a real multi-file table is a `viper`-facade concern, layered on top.
const SOURCE_FILE_ID: u32 = 1;

pub fn loc_at(line: u32) -> SourceLoc {
    SourceLoc::new(SOURCE_FILE_ID, line, 0)
}

pub fn from_lex_error(e: LexError) -> Diagnostic {
    let line = match e {
        LexError::UnterminatedString { line } => line,
        LexError::BadHexEscape { line } => line,
        LexError::UnexpectedChar { line, .. } => line,
    };
    Diagnostic::error("parse.lex", e.to_string()).with_loc(loc_at(line))
}

pub fn unexpected_token(line: u32, expected: &str, found: &Tok) -> Diagnostic {
    Diagnostic::error("parse.unexpected_token", format!("expected {expected}, found {found}"))
        .with_loc(loc_at(line))
}

pub fn unknown_type(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.unknown_type", format!("`{text}` is not a known type")).with_loc(loc_at(line))
}

pub fn unknown_opcode(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.unknown_opcode", format!("`{text}` is not a known opcode")).with_loc(loc_at(line))
}

pub fn duplicate_block_label(line: u32, label: &str) -> Diagnostic {
    Diagnostic::error("parse.duplicate_block_label", format!("block label `{label}` is already in use"))
        .with_loc(loc_at(line))
}

pub fn unknown_block_label(line: u32, label: &str) -> Diagnostic {
    Diagnostic::error("parse.unknown_block_label", format!("branch target `^{label}` names no block in this function"))
        .with_loc(loc_at(line))
}

pub fn bad_version(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.bad_version", format!("`{text}` is not a valid `major.minor[.patch]` version"))
        .with_loc(loc_at(line))
}

pub fn bad_int_literal(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.bad_int_literal", format!("`{text}` is not a valid integer literal")).with_loc(loc_at(line))
}

pub fn bad_float_literal(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.bad_float_literal", format!("`{text}` is not a valid float literal")).with_loc(loc_at(line))
}

pub fn bad_loc_spec(line: u32, text: &str) -> Diagnostic {
    Diagnostic::error("parse.bad_loc_spec", format!("`{text}` is not a valid `file:line[:col]` location")).with_loc(loc_at(line))
}
