//! Recursive-descent parser over the token stream from [`crate::lexer`].
//!
//! Mirrors the shape of the original implementation's `ParserState`: a
//! module under construction, the function/block currently being filled in,
//! a table mapping `%N` text to the `Type` it was declared with, and a list
//! of not-yet-resolved branch targets (`pending`) that reference block
//! labels appearing later in the same function's text. Layout — one
//! instruction per line versus everything on one line — is never
//! significant; only token order is.

use crate::error;
use crate::lexer::{Lexer, SpannedTok, Tok};
use cranelift_entity::EntityRef;
use smallvec::SmallVec;
use std::collections::HashMap;
use viper_ir::{
    Block, BranchTarget, Extern, ExternDecl, Function, Global, GlobalDef, Instruction, Module, Opcode, SwitchCase,
    Type, Value, ValueId, Version,
};
use viper_support::{Diagnostic, DiagnosticList, SourceLoc};

pub fn parse_module(src: &str) -> Result<Module, DiagnosticList> {
    let toks = Lexer::new(src).tokenize().map_err(|e| {
        let mut d = DiagnosticList::new();
        d.push(error::from_lex_error(e));
        d
    })?;
    let mut p = Parser { toks, pos: 0, externs_by_name: HashMap::new(), globals_by_name: HashMap::new() };
    p.parse_module_inner().map_err(|d| {
        let mut l = DiagnosticList::new();
        l.push(d);
        l
    })
}

/// Placeholder destination for a branch target whose label hasn't been seen
/// yet — patched in by [`FunctionBuilder::resolve_pending`] once the whole
/// function body has been scanned. `Block` entities are just wrapped `u32`s
/// (via `cranelift_entity::entity_impl!`), so this is never read as a real
/// block index.
fn placeholder_block() -> Block {
    Block::new(u32::MAX as usize)
}

/// `switch.i32` cases share the pending-target list with `br`/`cbr`
/// targets; case indices are offset past this so `resolve_pending` can tell
/// the two apart.
const SWITCH_CASE_SLOT_BASE: usize = 1_000_000;

struct Parser {
    toks: Vec<SpannedTok>,
    pos: usize,
    externs_by_name: HashMap<String, Extern>,
    globals_by_name: HashMap<String, Global>,
}

type PResult<T> = Result<T, Diagnostic>;

impl Parser {
    fn cur(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.toks[self.pos].line
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur(), Tok::Eof)
    }

    fn check(&self, t: &Tok) -> bool {
        self.cur() == t
    }

    fn check_ident(&self, s: &str) -> bool {
        matches!(self.cur(), Tok::Ident(i) if i == s)
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: Tok, what: &str) -> PResult<()> {
        if self.cur() == &t {
            self.bump();
            Ok(())
        } else {
            Err(error::unexpected_token(self.line(), what, self.cur()))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
        if self.check_ident(kw) {
            self.bump();
            Ok(())
        } else {
            Err(error::unexpected_token(self.line(), &format!("`{kw}`"), self.cur()))
        }
    }

    fn eat_ident(&mut self, what: &str) -> PResult<String> {
        match self.cur().clone() {
            Tok::Ident(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(error::unexpected_token(self.line(), what, self.cur())),
        }
    }

    fn eat_numlike(&mut self, what: &str) -> PResult<String> {
        match self.cur().clone() {
            Tok::NumLike(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(error::unexpected_token(self.line(), what, self.cur())),
        }
    }

    fn eat_bytes(&mut self, what: &str) -> PResult<Vec<u8>> {
        match self.cur().clone() {
            Tok::Bytes(b) => {
                self.bump();
                Ok(b)
            }
            _ => Err(error::unexpected_token(self.line(), what, self.cur())),
        }
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let line = self.line();
        let name = self.eat_ident("a type")?;
        name.parse::<Type>().map_err(|_| error::unknown_type(line, &name))
    }

    fn parse_type_list(&mut self) -> PResult<Vec<Type>> {
        let mut out = Vec::new();
        if !self.check(&Tok::RParen) {
            loop {
                out.push(self.parse_type()?);
                if self.check(&Tok::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        Ok(out)
    }

    // ---- top level ------------------------------------------------------

    fn parse_module_inner(&mut self) -> PResult<Module> {
        self.expect_keyword("il")?;
        let line = self.line();
        let vtext = self.eat_numlike("a version number")?;
        let version = parse_version(&vtext).ok_or_else(|| error::bad_version(line, &vtext))?;
        let mut module = Module::new(version);

        while !self.at_eof() {
            if self.check_ident("extern") {
                self.parse_extern(&mut module)?;
            } else if self.check_ident("global") {
                self.parse_global(&mut module)?;
            } else if self.check_ident("func") {
                self.parse_function(&mut module)?;
            } else {
                return Err(error::unexpected_token(self.line(), "`extern`, `global`, or `func`", self.cur()));
            }
        }
        Ok(module)
    }

    fn parse_extern(&mut self, module: &mut Module) -> PResult<()> {
        self.bump(); // "extern"
        self.expect(Tok::At, "`@`")?;
        let name = self.eat_ident("an extern name")?;
        self.expect(Tok::LParen, "`(`")?;
        let param_tys = self.parse_type_list()?;
        self.expect(Tok::RParen, "`)`")?;
        self.expect(Tok::Arrow, "`->`")?;
        let ret_ty = self.parse_type()?;
        let e = module.declare_extern(ExternDecl { name: name.clone(), param_tys, ret_ty });
        self.externs_by_name.insert(name, e);
        Ok(())
    }

    fn parse_global(&mut self, module: &mut Module) -> PResult<()> {
        self.bump(); // "global"
        let is_const = if self.check_ident("const") {
            self.bump();
            true
        } else {
            false
        };
        self.expect_keyword("str")?;
        self.expect(Tok::At, "`@`")?;
        let name = self.eat_ident("a global name")?;
        self.expect(Tok::Eq, "`=`")?;
        let bytes = self.eat_bytes("a string literal")?;
        let g = module.declare_global(GlobalDef { name: name.clone(), is_const, bytes });
        self.globals_by_name.insert(name, g);
        Ok(())
    }

    // ---- functions --------------------------------------------------------

    fn parse_function(&mut self, module: &mut Module) -> PResult<()> {
        self.bump(); // "func"
        self.expect(Tok::At, "`@`")?;
        let name = self.eat_ident("a function name")?;
        self.expect(Tok::LParen, "`(`")?;
        let param_tys = self.parse_type_list()?;
        self.expect(Tok::RParen, "`)`")?;
        self.expect(Tok::Arrow, "`->`")?;
        let ret_ty = self.parse_type()?;
        self.expect(Tok::LBrace, "`{`")?;

        let mut fb = FunctionBuilder::new(name, ret_ty, param_tys, self.globals_by_name.clone());
        while !self.check(&Tok::RBrace) {
            self.parse_block(&mut fb)?;
        }
        self.bump(); // "}"
        fb.resolve_pending()?;
        module.add_function(fb.f);
        Ok(())
    }

    fn parse_block(&mut self, fb: &mut FunctionBuilder) -> PResult<()> {
        let header_line = self.line();
        let label = self.eat_ident("a block label")?;
        if fb.labels.contains_key(&label) {
            return Err(error::duplicate_block_label(header_line, &label));
        }

        let block = if self.check(&Tok::LParen) {
            self.bump();
            let mut params = Vec::new();
            if !self.check(&Tok::RParen) {
                loop {
                    self.expect(Tok::Percent, "`%`")?;
                    let id_line = self.line();
                    let n: u32 = self
                        .eat_numlike("a value id")?
                        .parse()
                        .map_err(|_| error::unexpected_token(id_line, "a value id", self.cur()))?;
                    self.expect(Tok::Colon, "`:`")?;
                    let ty = self.parse_type()?;
                    params.push((n, ty));
                    if self.check(&Tok::Comma) {
                        self.bump();
                        continue;
                    }
                    break;
                }
            }
            self.expect(Tok::RParen, "`)`")?;
            fb.f.create_block_with_explicit_params(label.clone(), params)
        } else {
            fb.f.create_block(label.clone())
        };
        self.expect(Tok::Colon, "`:`")?;

        for (id, ty) in fb.f.block(block).params.iter().map(|p| (p.id, p.ty)) {
            fb.value_types.insert(id.index() as u32, ty);
        }
        fb.labels.insert(label, block);

        loop {
            if self.check(&Tok::RBrace) || self.is_block_header_start() {
                break;
            }
            let line = self.line();
            let (inst, pending_targets) = self.parse_instruction(fb)?;
            self.expect(Tok::Semi, "`;`")?;
            if let Some(id) = inst.result {
                fb.value_types.insert(id.index() as u32, inst.result_ty);
            }
            let slot = fb.f.block(block).insts.len();
            fb.f
                .push_inst(block, inst)
                .map_err(|e| Diagnostic::error("parse.terminator", e).with_loc(SourceLoc::new(0, line, 0)))?;
            for p in pending_targets {
                fb.pending.push(PendingRef { block, inst_idx: slot, slot: p.slot, label: p.label });
            }
            if fb.f.block(block).terminated {
                break;
            }
        }
        Ok(())
    }

    /// Peeks whether the parser is sitting at the start of a new block
    /// header (`label:` or `label(...):`) rather than another instruction
    /// in the current block — the only two productions that can legally
    /// follow an instruction inside a `{ ... }` body, since no opcode
    /// mnemonic is ever directly followed by `:` or `(`.
    fn is_block_header_start(&self) -> bool {
        if !matches!(self.cur(), Tok::Ident(_)) {
            return false;
        }
        let next = &self.toks[(self.pos + 1).min(self.toks.len() - 1)].tok;
        matches!(next, Tok::Colon | Tok::LParen)
    }

    fn parse_instruction(&mut self, fb: &mut FunctionBuilder) -> PResult<(Instruction, Vec<PendingTarget>)> {
        let mut loc = SourceLoc::UNKNOWN;
        if self.check(&Tok::Dot) {
            self.bump();
            self.expect_keyword("loc")?;
            let line = self.line();
            let text = self.eat_numlike("a `file:line[:col]` location")?;
            loc = parse_loc(&text).ok_or_else(|| error::bad_loc_spec(line, &text))?;
        }

        let result_id = if self.check(&Tok::Percent) {
            self.bump();
            let line = self.line();
            let n: u32 = self
                .eat_numlike("a value id")?
                .parse()
                .map_err(|_| error::unexpected_token(line, "a value id", self.cur()))?;
            self.expect(Tok::Eq, "`=`")?;
            Some(fb.f.reserve_value_id(n))
        } else {
            None
        };

        let op_line = self.line();
        let mnemonic = self.eat_ident("an opcode")?;
        let opcode = opcode_from_mnemonic(&mnemonic).ok_or_else(|| error::unknown_opcode(op_line, &mnemonic))?;

        let mut inst = Instruction::new(opcode).with_loc(loc);
        if let Some(id) = result_id {
            if self.looks_like_type() {
                let ty = self.parse_type()?;
                inst = inst.with_result(id, ty);
            } else {
                inst.result = Some(id);
            }
        }

        let mut pending = Vec::new();

        match opcode {
            Opcode::Call => {
                self.expect(Tok::At, "`@`")?;
                let callee = self.eat_ident("a callee name")?;
                inst.labels.push(callee);
                inst.operands = SmallVec::from_vec(self.parse_value_list(fb)?);
            }
            Opcode::CallIndirect => {
                if self.check(&Tok::At) {
                    self.bump();
                    let callee = self.eat_ident("a callee name")?;
                    inst.labels.push(callee);
                } else {
                    let fn_ptr = self.parse_value(fb)?;
                    inst.operands.push(fn_ptr);
                    if self.check(&Tok::Comma) {
                        self.bump();
                    }
                }
                inst.operands.extend(self.parse_value_list(fb)?);
            }
            Opcode::ConstStr | Opcode::GlobalAddr => {
                self.expect(Tok::At, "`@`")?;
                let name = self.eat_ident("a global name")?;
                inst.labels.push(name);
            }
            Opcode::Br => {
                let (target, maybe_pending) = self.parse_branch_target(fb, 0)?;
                inst.targets.push(target);
                pending.extend(maybe_pending);
            }
            Opcode::Cbr => {
                let cond = self.parse_value(fb)?;
                inst.operands.push(cond);
                if self.check(&Tok::Comma) {
                    self.bump();
                }
                for slot in 0..2 {
                    let (target, maybe_pending) = self.parse_branch_target(fb, slot)?;
                    inst.targets.push(target);
                    pending.extend(maybe_pending);
                }
            }
            Opcode::SwitchI32 => {
                let sel = self.parse_value(fb)?;
                inst.operands.push(sel);
                if self.check(&Tok::Comma) {
                    self.bump();
                }
                self.expect(Tok::LBracket, "`[`")?;
                if !self.check(&Tok::RBracket) {
                    loop {
                        let cline = self.line();
                        let label_text = self.eat_numlike("a case label")?;
                        let label: i32 =
                            label_text.parse().map_err(|_| error::bad_int_literal(cline, &label_text))?;
                        self.expect(Tok::Arrow, "`->`")?;
                        let case_idx = inst.switch_cases.len();
                        let (target, maybe_pending) =
                            self.parse_branch_target(fb, SWITCH_CASE_SLOT_BASE + case_idx)?;
                        inst.switch_cases.push(SwitchCase { label, target });
                        pending.extend(maybe_pending);
                        if self.check(&Tok::Comma) {
                            self.bump();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Tok::RBracket, "`]`")?;
                self.expect_keyword("default")?;
                let (target, maybe_pending) = self.parse_branch_target(fb, 0)?;
                inst.targets.push(target);
                pending.extend(maybe_pending);
            }
            Opcode::EhPush => {
                self.expect(Tok::Caret, "`^`")?;
                let label = self.eat_ident("a handler label")?;
                inst.labels.push(label);
            }
            Opcode::ResumeLabel => {
                inst.operands = SmallVec::from_vec(self.parse_value_list_until_caret(fb)?);
                self.expect(Tok::Caret, "`^`")?;
                let label = self.eat_ident("a resume label")?;
                inst.labels.push(label);
            }
            _ => {
                // Binary/unary ops, compares, conversions, `load`/`store`,
                // `ret`, `alloca`, `trap`, `trap.from_err`,
                // `resume.same`/`resume.next`, `eh.pop`/`eh.entry`: all take
                // a plain comma-separated operand list (possibly empty).
                inst.operands = SmallVec::from_vec(self.parse_value_list(fb)?);
            }
        }

        Ok((inst, pending))
    }

    /// `true` if the next token can only start a type name — used to tell
    /// apart a result's type annotation from the start of an operand list
    /// (both are bare identifiers at that position).
    fn looks_like_type(&self) -> bool {
        matches!(self.cur(), Tok::Ident(s) if s.parse::<Type>().is_ok())
    }

    fn parse_value_list(&mut self, fb: &mut FunctionBuilder) -> PResult<Vec<Value>> {
        let mut out = Vec::new();
        if matches!(self.cur(), Tok::Caret | Tok::LBracket | Tok::Semi) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_value(fb)?);
            if self.check(&Tok::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        Ok(out)
    }

    fn parse_value_list_until_caret(&mut self, fb: &mut FunctionBuilder) -> PResult<Vec<Value>> {
        if self.check(&Tok::Caret) {
            return Ok(Vec::new());
        }
        self.parse_value_list(fb)
    }

    fn parse_value(&mut self, fb: &mut FunctionBuilder) -> PResult<Value> {
        let line = self.line();
        match self.cur().clone() {
            Tok::Percent => {
                self.bump();
                let n: u32 = self
                    .eat_numlike("a value id")?
                    .parse()
                    .map_err(|_| error::unexpected_token(line, "a value id", self.cur()))?;
                let ty = fb.value_types.get(&n).copied().ok_or_else(|| {
                    Diagnostic::error("parse.unknown_value", format!("%{n} is not defined yet"))
                        .with_loc(SourceLoc::new(0, line, 0))
                })?;
                Ok(Value::temp(ValueId::new(n as usize), ty))
            }
            Tok::At => {
                self.bump();
                let name = self.eat_ident("a global name")?;
                let g = fb.globals.get(&name).copied().ok_or_else(|| {
                    Diagnostic::error("parse.unknown_global", format!("`@{name}` is not declared"))
                        .with_loc(SourceLoc::new(0, line, 0))
                })?;
                Ok(Value::global_addr(g))
            }
            Tok::NumLike(text) => {
                self.bump();
                if text.contains('.') {
                    let v: f64 = text.parse().map_err(|_| error::bad_float_literal(line, &text))?;
                    self.expect(Tok::Colon, "`:`")?;
                    self.parse_type()?;
                    Ok(Value::const_float(v))
                } else {
                    let v: i64 = text.parse().map_err(|_| error::bad_int_literal(line, &text))?;
                    self.expect(Tok::Colon, "`:`")?;
                    let ty = self.parse_type()?;
                    Ok(Value::const_int(ty, v))
                }
            }
            _ => Err(error::unexpected_token(line, "a value", self.cur())),
        }
    }

    /// Parses `^label` or `^label(args...)`. If `label` names a block
    /// already registered in `fb.labels` the target resolves immediately;
    /// otherwise a placeholder is returned along with a [`PendingTarget`]
    /// for the caller to record against `slot` once the instruction has
    /// been pushed.
    fn parse_branch_target(
        &mut self,
        fb: &mut FunctionBuilder,
        slot: usize,
    ) -> PResult<(BranchTarget, Option<PendingTarget>)> {
        self.expect(Tok::Caret, "`^`")?;
        let label = self.eat_ident("a block label")?;
        let mut args = SmallVec::new();
        if self.check(&Tok::LParen) {
            self.bump();
            if !self.check(&Tok::RParen) {
                loop {
                    args.push(self.parse_value(fb)?);
                    if self.check(&Tok::Comma) {
                        self.bump();
                        continue;
                    }
                    break;
                }
            }
            self.expect(Tok::RParen, "`)`")?;
        }
        if let Some(&block) = fb.labels.get(&label) {
            Ok((BranchTarget::new(block, args), None))
        } else {
            Ok((BranchTarget::new(placeholder_block(), args), Some(PendingTarget { slot, label })))
        }
    }
}

struct PendingTarget {
    /// `0`/`1` for `cbr`'s then/else, `0` for `br`'s only target or a
    /// switch's default, `SWITCH_CASE_SLOT_BASE + i` for switch case `i`.
    slot: usize,
    label: String,
}

struct PendingRef {
    block: Block,
    inst_idx: usize,
    slot: usize,
    label: String,
}

struct FunctionBuilder {
    f: Function,
    labels: HashMap<String, Block>,
    value_types: HashMap<u32, Type>,
    globals: HashMap<String, Global>,
    pending: Vec<PendingRef>,
}

impl FunctionBuilder {
    fn new(name: String, ret_ty: Type, param_tys: Vec<Type>, globals: HashMap<String, Global>) -> Self {
        FunctionBuilder {
            f: Function::new(name, ret_ty, param_tys),
            labels: HashMap::new(),
            value_types: HashMap::new(),
            globals,
            pending: Vec::new(),
        }
    }

    /// Patches every branch target that named a label before it had been
    /// seen. Forward references are the only thing this parser defers
    /// resolving until after the fact, so a label that still doesn't exist
    /// once the whole function has been scanned is unrecoverable.
    fn resolve_pending(&mut self) -> PResult<()> {
        let deferred = self.pending.len();
        for p in std::mem::take(&mut self.pending) {
            let block = *self.labels.get(&p.label).ok_or_else(|| {
                log::warn!("parser: forward reference to block `{}` never resolved ({} deferred in {})", p.label, deferred, self.f.name);
                error::unknown_block_label(0, &p.label)
            })?;
            let inst = &mut self.f.block_mut(p.block).insts[p.inst_idx];
            if p.slot >= SWITCH_CASE_SLOT_BASE {
                inst.switch_cases[p.slot - SWITCH_CASE_SLOT_BASE].target.block = block;
            } else {
                inst.targets[p.slot].block = block;
            }
        }
        if deferred > 0 {
            log::debug!("parser: resolved {} forward branch reference(s) in {}", deferred, self.f.name);
        }
        Ok(())
    }
}

fn opcode_from_mnemonic(s: &str) -> Option<Opcode> {
    Some(match s {
        "add" => Opcode::Add,
        "sub" => Opcode::Sub,
        "mul" => Opcode::Mul,
        "sdiv" => Opcode::SDiv,
        "sdiv.chk0" => Opcode::SDivChk0,
        "udiv" => Opcode::UDiv,
        "udiv.chk0" => Opcode::UDivChk0,
        "srem" => Opcode::SRem,
        "urem" => Opcode::URem,
        "and" => Opcode::And,
        "or" => Opcode::Or,
        "xor" => Opcode::Xor,
        "shl" => Opcode::Shl,
        "lshr" => Opcode::Lshr,
        "ashr" => Opcode::Ashr,
        "iadd.ovf" => Opcode::IAddOvf,
        "icmp_eq" => Opcode::IcmpEq,
        "icmp_ne" => Opcode::IcmpNe,
        "scmp_lt" => Opcode::ScmpLt,
        "scmp_le" => Opcode::ScmpLe,
        "scmp_gt" => Opcode::ScmpGt,
        "scmp_ge" => Opcode::ScmpGe,
        "ucmp_lt" => Opcode::UcmpLt,
        "ucmp_le" => Opcode::UcmpLe,
        "ucmp_gt" => Opcode::UcmpGt,
        "ucmp_ge" => Opcode::UcmpGe,
        "fcmp_eq" => Opcode::FcmpEq,
        "fcmp_lt" => Opcode::FcmpLt,
        "fcmp_le" => Opcode::FcmpLe,
        "fcmp_gt" => Opcode::FcmpGt,
        "fcmp_ge" => Opcode::FcmpGe,
        "sitofp" => Opcode::Sitofp,
        "fptosi" => Opcode::Fptosi,
        "trunc1" => Opcode::Trunc1,
        "zext1" => Opcode::Zext1,
        "sext" => Opcode::Sext,
        "zext" => Opcode::Zext,
        "alloca" => Opcode::Alloca,
        "load" => Opcode::Load,
        "store" => Opcode::Store,
        "const_str" => Opcode::ConstStr,
        "const_int" => Opcode::ConstInt,
        "global_addr" => Opcode::GlobalAddr,
        "br" => Opcode::Br,
        "cbr" => Opcode::Cbr,
        "switch.i32" => Opcode::SwitchI32,
        "ret" => Opcode::Ret,
        "call" => Opcode::Call,
        "call.indirect" => Opcode::CallIndirect,
        "eh.push" => Opcode::EhPush,
        "eh.pop" => Opcode::EhPop,
        "eh.entry" => Opcode::EhEntry,
        "trap" => Opcode::Trap,
        "trap.from_err" => Opcode::TrapFromErr,
        "resume.same" => Opcode::ResumeSame,
        "resume.next" => Opcode::ResumeNext,
        "resume.label" => Opcode::ResumeLabel,
        _ => return None,
    })
}

fn parse_version(text: &str) -> Option<Version> {
    let mut parts = text.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(p) => Some(p.parse().ok()?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

fn parse_loc(text: &str) -> Option<SourceLoc> {
    let mut parts = text.split(':');
    let file: u32 = parts.next()?.parse().ok()?;
    let line: u32 = parts.next()?.parse().ok()?;
    let column = match parts.next() {
        Some(c) => c.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(SourceLoc::new(file, line, column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::write_module;

    #[test]
    fn parses_minimal_module_header() {
        let m = parse_module("il 0.2.0\n").unwrap();
        assert_eq!(m.version.to_string(), "0.2.0");
    }

    #[test]
    fn round_trips_a_straight_line_function() {
        let src = "il 0.2.0\nfunc @add(i64, i64) -> i64 {\nentry(%0: i64, %1: i64):\n    %2 = add i64 %0, %1;\n    ret %2;\n}\n";
        let m = parse_module(src).unwrap();
        let f = m.function_by_name("add").unwrap();
        assert_eq!(f.param_tys, vec![Type::I64, Type::I64]);
        let text = write_module(&m);
        let m2 = parse_module(&text).unwrap();
        assert_eq!(write_module(&m2), text);
    }

    #[test]
    fn round_trips_forward_branch_with_args() {
        let src = "il 0.2.0\nfunc @pick(i1) -> i64 {\nentry(%0: i1):\n    cbr %0 ^t(1:i64) ^f(0:i64);\nt(%2: i64):\n    ret %2;\nf(%3: i64):\n    ret %3;\n}\n";
        let m = parse_module(src).unwrap();
        let text = write_module(&m);
        let m2 = parse_module(&text).unwrap();
        assert_eq!(write_module(&m2), text);
    }

    #[test]
    fn round_trips_switch_i32_with_default() {
        let src = "il 0.2.0\nfunc @classify(i32) -> i64 {\nentry(%0: i32):\n    switch.i32 %0 [1 -> ^a, 2 -> ^b] default ^c;\na:\n    ret 10:i64;\nb:\n    ret 20:i64;\nc:\n    ret 0:i64;\n}\n";
        let m = parse_module(src).unwrap();
        let text = write_module(&m);
        let m2 = parse_module(&text).unwrap();
        assert_eq!(write_module(&m2), text);
    }

    #[test]
    fn round_trips_named_and_computed_call_indirect() {
        let src = "il 0.2.0\nextern @puts(str) -> void\nfunc @go(ptr) -> void {\nentry(%0: ptr):\n    call.indirect @puts;\n    call.indirect %0;\n    ret;\n}\n";
        let m = parse_module(src).unwrap();
        let text = write_module(&m);
        let m2 = parse_module(&text).unwrap();
        assert_eq!(write_module(&m2), text);
    }

    #[test]
    fn round_trips_const_str_and_global_addr() {
        let src = "il 0.2.0\nglobal const str @.L0 = \"hi\"\nfunc @f() -> ptr {\nentry:\n    %0 = const_str str @.L0;\n    %1 = global_addr ptr @.L0;\n    ret %1;\n}\n";
        let m = parse_module(src).unwrap();
        let text = write_module(&m);
        assert!(text.contains("const_str str @.L0"), "{text}");
        assert!(text.contains("global_addr ptr @.L0"), "{text}");
        let m2 = parse_module(&text).unwrap();
        assert_eq!(write_module(&m2), text);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    frobnicate;\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.contains_code("parse.unknown_opcode"));
    }

    #[test]
    fn rejects_duplicate_block_label() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    ret;\nentry:\n    ret;\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.contains_code("parse.duplicate_block_label"));
    }

    #[test]
    fn rejects_unknown_branch_target_label() {
        let src = "il 0.2.0\nfunc @f() -> void {\nentry:\n    br ^nope;\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.contains_code("parse.unknown_block_label"));
    }

    #[test]
    fn parses_embedded_loc_directive() {
        let src = "il 0.2.0\nfunc @f() -> i64 {\nentry:\n    .loc 3:10:2\n    ret 1:i64;\n}\n";
        let m = parse_module(src).unwrap();
        let f = m.function_by_name("f").unwrap();
        let entry = f.entry().unwrap();
        let loc = f.block(entry).insts[0].loc;
        assert_eq!(loc.line, 10);
        assert_eq!(loc.column, 2);
    }
}
