//! Tokenizer for the textual IL format (§4.1).
//!
//! Layout is not significant: blocks and instructions may be written on one
//! line (as the scenario text in the original spec does) or one token per
//! line (as `viper_ir::write_module` emits them) — the lexer treats all
//! whitespace, including newlines, as a separator. The only layout-sensitive
//! production is `.loc file:line:col`, which is lexed as a keyword followed
//! immediately by a single digit/colon run.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    Ident(String),
    /// A bare `-?[0-9]+([.:][0-9]+)*` run; the parser decides whether it is
    /// a version, a `.loc` spec, an integer, or a float from context.
    NumLike(String),
    Bytes(Vec<u8>),
    Percent,
    At,
    Caret,
    Colon,
    Comma,
    Eq,
    Arrow,
    Dot,
    Semi,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(s) => write!(f, "`{s}`"),
            Tok::NumLike(s) => write!(f, "`{s}`"),
            Tok::Bytes(_) => write!(f, "a string literal"),
            Tok::Percent => write!(f, "`%`"),
            Tok::At => write!(f, "`@`"),
            Tok::Caret => write!(f, "`^`"),
            Tok::Colon => write!(f, "`:`"),
            Tok::Comma => write!(f, "`,`"),
            Tok::Eq => write!(f, "`=`"),
            Tok::Arrow => write!(f, "`->`"),
            Tok::Dot => write!(f, "`.`"),
            Tok::Semi => write!(f, "`;`"),
            Tok::LParen => write!(f, "`(`"),
            Tok::RParen => write!(f, "`)`"),
            Tok::LBracket => write!(f, "`[`"),
            Tok::RBracket => write!(f, "`]`"),
            Tok::LBrace => write!(f, "`{{`"),
            Tok::RBrace => write!(f, "`}}`"),
            Tok::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpannedTok {
    pub tok: Tok,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },
    #[error("line {line}: invalid \\x escape in string literal")]
    BadHexEscape { line: u32 },
    #[error("line {line}: unexpected character {ch:?}")]
    UnexpectedChar { line: u32, ch: char },
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b';') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenize the whole input, for the parser to index into.
    pub fn tokenize(mut self) -> Result<Vec<SpannedTok>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let eof = tok.tok == Tok::Eof;
            out.push(tok);
            if eof {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<SpannedTok, LexError> {
        self.skip_trivia();
        let line = self.line;
        let Some(b) = self.peek() else {
            return Ok(SpannedTok { tok: Tok::Eof, line });
        };

        let tok = match b {
            b'%' => {
                self.bump();
                Tok::Percent
            }
            b'@' => {
                self.bump();
                Tok::At
            }
            b'^' => {
                self.bump();
                Tok::Caret
            }
            b':' => {
                self.bump();
                Tok::Colon
            }
            b',' => {
                self.bump();
                Tok::Comma
            }
            b';' => {
                self.bump();
                Tok::Semi
            }
            b'=' => {
                self.bump();
                Tok::Eq
            }
            b'(' => {
                self.bump();
                Tok::LParen
            }
            b')' => {
                self.bump();
                Tok::RParen
            }
            b'[' => {
                self.bump();
                Tok::LBracket
            }
            b']' => {
                self.bump();
                Tok::RBracket
            }
            b'{' => {
                self.bump();
                Tok::LBrace
            }
            b'}' => {
                self.bump();
                Tok::RBrace
            }
            b'-' if self.peek_at(1) == Some(b'>') => {
                self.bump();
                self.bump();
                Tok::Arrow
            }
            b'-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.lex_numlike()
            }
            b'.' if !self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.bump();
                Tok::Dot
            }
            b'0'..=b'9' => self.lex_numlike(),
            b'"' => self.lex_string(line)?,
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.lex_ident(),
            other => {
                return Err(LexError::UnexpectedChar { line, ch: other as char });
            }
        };
        Ok(SpannedTok { tok, line })
    }

    fn lex_numlike(&mut self) -> Tok {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        while matches!(self.peek(), Some(b'.') | Some(b':'))
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap().to_string();
        Tok::NumLike(text)
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.pos;
        while matches!(self.peek(), Some(b'_') | Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9')) {
            self.bump();
        }
        // Permit embedded single dots for dotted opcode mnemonics
        // (`call.indirect`, `switch.i32`, `trap.from_err`, ...), but only
        // when immediately followed by another identifier character so a
        // trailing `.` (end of directive) or `.loc` (handled above) is
        // never swallowed here.
        while self.peek() == Some(b'.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.bump();
            while matches!(self.peek(), Some(b'_') | Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap().to_string();
        Tok::Ident(text)
    }

    fn lex_string(&mut self, line: u32) -> Result<Tok, LexError> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString { line }),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(b'"') => bytes.push(b'"'),
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'r') => bytes.push(b'\r'),
                    Some(b'x') => {
                        let hi = self.bump().ok_or(LexError::BadHexEscape { line })?;
                        let lo = self.bump().ok_or(LexError::BadHexEscape { line })?;
                        let hex = [hi, lo];
                        let s = std::str::from_utf8(&hex).map_err(|_| LexError::BadHexEscape { line })?;
                        let byte = u8::from_str_radix(s, 16).map_err(|_| LexError::BadHexEscape { line })?;
                        bytes.push(byte);
                    }
                    _ => return Err(LexError::BadHexEscape { line }),
                },
                Some(b) => bytes.push(b),
            }
        }
        Ok(Tok::Bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|s| s.tok).collect()
    }

    #[test]
    fn lexes_dotted_opcode_mnemonics() {
        assert_eq!(toks("call.indirect"), vec![Tok::Ident("call.indirect".into()), Tok::Eof]);
        assert_eq!(toks("switch.i32"), vec![Tok::Ident("switch.i32".into()), Tok::Eof]);
    }

    #[test]
    fn lexes_loc_directive_number_after_dot() {
        assert_eq!(
            toks(".loc 3:10:2"),
            vec![Tok::Dot, Tok::Ident("loc".into()), Tok::NumLike("3:10:2".into()), Tok::Eof]
        );
    }

    #[test]
    fn lexes_negative_int_and_arrow() {
        assert_eq!(toks("-5 ->"), vec![Tok::NumLike("-5".into()), Tok::Arrow, Tok::Eof]);
    }

    #[test]
    fn lexes_escaped_string_with_hex_escape() {
        let toks = toks(r#""hi\x00\n""#);
        assert_eq!(toks, vec![Tok::Bytes(vec![b'h', b'i', 0, b'\n']), Tok::Eof]);
    }
}
