//! Expression compiler: source text to [`Program`].
//!
//! A recursive-descent parser over the raw bytes, one function per
//! precedence level (lowest first):
//!
//!   comma  →  assignment  →  conditional  →  or  →  and  →  relational  →
//!   additive  →  multiplicative  →  unary  →  primary
//!
//! Code is emitted while parsing.  `|`, `&` and `?:` use forward jumps that
//! are patched once the end of the right operand is known.  With
//! `optimize` set, an operator whose operands are all literal constants is
//! evaluated on the spot and replaced by its result.
//!
//! Substitutions (`{name}`, `%name`, `{1}`, `$[...]`, `$(...)`, `$name`) are
//! compiled into the same instruction stream.

use std::ops::Range;
use std::rc::Rc;

use tracing::debug;

use crate::pattern::RegMatch;
use crate::tfstr::TfStr;

use super::builtins;
use super::context::{ArgFrame, Command, EvalContext, MacroHandle, VarCell};
use super::error::{CompileError, EvalError};
use super::number::parse_number;
use super::program::{Op, Operator, ParamSel, Program, ProgramBuilder};
use super::reduce::reduce;
use super::value::{hash_string, Ident, Value, ValueKind, ValueRef};
use super::vm::Engine;

type CResult = Result<(), CompileError>;

/// Keywords of the macro language, for the `/NAME` warning.
const KEYWORDS: &[&str] = &[
    "BREAK", "DO", "DONE", "ELSE", "ELSEIF", "ENDIF", "EXIT", "IF", "LET", "RESULT", "RETURN",
    "SET", "SETENV", "TEST", "THEN", "WHILE",
];

pub(super) fn compile(
    engine: &Engine,
    src: &str,
    ctx: &mut dyn EvalContext,
) -> Result<Program, CompileError> {
    let mut c = Compiler {
        engine,
        ctx,
        src,
        bytes: src.as_bytes(),
        pos: 0,
        code: ProgramBuilder::new(),
    };
    c.comma()?;
    if c.pos < c.bytes.len() {
        return Err(c.syntax_error("end of expression"));
    }
    let prog = c.code.finish(src);
    debug!(source = src, len = prog.len(), "compiled expression");
    Ok(prog)
}

struct Compiler<'a> {
    engine: &'a Engine,
    ctx: &'a mut dyn EvalContext,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    code: ProgramBuilder,
}

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_quote(c: u8) -> bool {
    matches!(c, b'"' | b'\'' | b'`')
}

impl<'a> Compiler<'a> {
    // ── Scanning ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, k: usize) -> Option<u8> {
        self.bytes.get(self.pos + k).copied()
    }

    fn at(&self, c: u8) -> bool {
        self.peek() == Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.at(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip whitespace; `true` if there was any.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn digits(&mut self) -> usize {
        let mut n: usize = 0;
        while let Some(c) = self.peek().filter(u8::is_ascii_digit) {
            n = n.saturating_mul(10).saturating_add((c - b'0') as usize);
            self.pos += 1;
        }
        n
    }

    // ── Diagnostics ──────────────────────────────────────────────────────────

    /// The offending text at the current position, quoted, and where it ends.
    fn error_text(&self) -> (String, usize) {
        let Some(first) = self.src[self.pos..].chars().next() else {
            return ("end of body".to_owned(), self.pos);
        };
        let mut end = self.pos + first.len_utf8();
        if first.is_ascii_alphanumeric() || (first.is_ascii() && is_quote(first as u8)) || first == '/' {
            while self.bytes.get(end).is_some_and(u8::is_ascii_alphanumeric) {
                end += 1;
            }
        }
        (format!("'{}'", &self.src[self.pos..end]), end)
    }

    fn syntax_error(&self, expected: &str) -> CompileError {
        let (found, end) = self.error_text();
        CompileError::new(
            format!("expression syntax error: expected {expected}, found {found}."),
            self.pos..end,
        )
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.pos..self.pos)
    }

    fn warn(&mut self, message: &str) {
        self.ctx.report_warning(message);
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    fn emit(&mut self, op: Op, span: Range<usize>) {
        self.code.emit(op, span);
    }

    fn push(&mut self, v: ValueRef, span: Range<usize>) {
        self.emit(Op::Push(v), span);
    }

    /// Emit `op` over the top `n` values, folding it into a constant when
    /// every operand is a literal and the result is clean.
    fn emit_reduce(&mut self, op: Operator, n: usize, span: Range<usize>) {
        if self.engine.config().optimize {
            if let Some(start) = self.foldable(op, n) {
                let args: Vec<ValueRef> = (start..self.code.here())
                    .filter_map(|i| match self.code.get(i).map(|inst| &inst.op) {
                        Some(Op::Push(v)) => Some(v.clone()),
                        _ => None,
                    })
                    .collect();
                let mut fold = FoldContext::default();
                if let Ok(v) = reduce(op, &args, &mut fold) {
                    if !fold.dirty {
                        let whole = (start..self.code.here())
                            .filter_map(|i| self.code.get(i))
                            .fold(span.clone(), |acc, inst| {
                                acc.start.min(inst.span.start)..acc.end.max(inst.span.end)
                            });
                        self.code.truncate(start);
                        self.push(v, whole);
                        return;
                    }
                }
            }
        }
        self.emit(Op::Reduce(op, n), span);
    }

    /// Index of the first operand if `op` can be folded at compile time.
    fn foldable(&self, op: Operator, n: usize) -> Option<usize> {
        if op.has_side_effects() || self.code.here() < n {
            return None;
        }
        let start = self.code.here() - n;
        let string_op = matches!(
            op,
            Operator::StrEq | Operator::StrNe | Operator::Match | Operator::NoMatch
        );
        for i in start..self.code.here() {
            let Op::Push(v) = &self.code.get(i)?.op else {
                return None;
            };
            match v.kind() {
                ValueKind::Id(_) | ValueKind::Func(_) | ValueKind::Cmd(_) => return None,
                // Float renderings depend on the live sigfigs setting.
                ValueKind::Float(_) if string_op => return None,
                _ => {}
            }
        }
        if self.code.is_jump_target_within(start..self.code.here() + 1) {
            return None;
        }
        Some(start)
    }

    // ── Grammar ──────────────────────────────────────────────────────────────

    fn comma(&mut self) -> CResult {
        self.assignment()?;
        while self.at(b',') {
            let at = self.pos;
            self.pos += 1;
            self.emit(Op::Pop(1), at..at + 1);
            self.assignment()?;
        }
        Ok(())
    }

    fn assignment(&mut self) -> CResult {
        self.conditional()?;
        let at = self.pos;
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(b':'), Some(b'=')) => Some((Operator::Assign, 2)),
            (Some(b'+'), Some(b'=')) => Some((Operator::AddAssign, 2)),
            (Some(b'-'), Some(b'=')) => Some((Operator::SubAssign, 2)),
            (Some(b'*'), Some(b'=')) => Some((Operator::MulAssign, 2)),
            (Some(b'/'), Some(b'=')) => Some((Operator::DivAssign, 2)),
            (Some(b'='), _) => Some((Operator::Assign, 1)),
            _ => None,
        };
        if let Some((op, len)) = op {
            self.pos += len;
            self.assignment()?;
            self.emit_reduce(op, 2, at..at + len);
        }
        Ok(())
    }

    fn conditional(&mut self) -> CResult {
        self.or()?;
        if !self.at(b'?') {
            return Ok(());
        }
        let at = self.pos;
        self.pos += 1;
        self.skip_ws();
        let end = if self.eat(b':') {
            // `a ?: c` keeps `a` when it is true.
            let j = self.code.emit_jump(Op::JumpIfTrue, at..at + 1);
            self.emit(Op::Pop(1), at..at + 1);
            self.conditional()?;
            j
        } else {
            let to_else = self.code.emit_jump(Op::JumpIfFalse, at..at + 1);
            self.emit(Op::Pop(1), at..at + 1);
            self.comma()?;
            if !self.at(b':') {
                return Err(self.syntax_error("':' after '?...'"));
            }
            let colon = self.pos;
            self.pos += 1;
            let to_end = self.code.emit_jump(Op::Jump, colon..colon + 1);
            self.code.patch(to_else, self.code.here());
            self.emit(Op::Pop(1), colon..colon + 1);
            self.conditional()?;
            to_end
        };
        self.code.patch(end, self.code.here());
        Ok(())
    }

    fn or(&mut self) -> CResult {
        self.and()?;
        while self.at(b'|') {
            let at = self.pos;
            self.pos += 1;
            let j = self.code.emit_jump(Op::JumpIfTrue, at..at + 1);
            self.emit(Op::Pop(1), at..at + 1);
            self.and()?;
            self.code.patch(j, self.code.here());
        }
        Ok(())
    }

    fn and(&mut self) -> CResult {
        self.relational()?;
        while self.at(b'&') {
            let at = self.pos;
            self.pos += 1;
            let j = self.code.emit_jump(Op::JumpIfFalse, at..at + 1);
            self.emit(Op::Pop(1), at..at + 1);
            self.relational()?;
            self.code.patch(j, self.code.here());
        }
        Ok(())
    }

    fn relational(&mut self) -> CResult {
        self.additive()?;
        loop {
            let (op, len) = match (self.peek(), self.peek_at(1)) {
                (Some(b'='), Some(b'=')) => (Operator::Eq, 2),
                (Some(b'='), Some(b'~')) => (Operator::StrEq, 2),
                (Some(b'='), Some(b'/')) => (Operator::Match, 2),
                (Some(b'!'), Some(b'=')) => (Operator::Ne, 2),
                (Some(b'!'), Some(b'~')) => (Operator::StrNe, 2),
                (Some(b'!'), Some(b'/')) => (Operator::NoMatch, 2),
                (Some(b'<'), Some(b'=')) => (Operator::Le, 2),
                (Some(b'>'), Some(b'=')) => (Operator::Ge, 2),
                (Some(b'<'), _) => (Operator::Lt, 1),
                (Some(b'>'), _) => (Operator::Gt, 1),
                _ => break,
            };
            let at = self.pos;
            self.pos += len;
            self.additive()?;
            self.emit_reduce(op, 2, at..at + len);
        }
        Ok(())
    }

    fn additive(&mut self) -> CResult {
        self.multiplicative()?;
        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Some(b'+'), next) if next != Some(b'=') => Operator::Add,
                (Some(b'-'), next) if next != Some(b'=') => Operator::Sub,
                _ => break,
            };
            let at = self.pos;
            self.pos += 1;
            self.multiplicative()?;
            self.emit_reduce(op, 2, at..at + 1);
        }
        Ok(())
    }

    fn multiplicative(&mut self) -> CResult {
        self.unary(false)?;
        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Some(b'*'), next) if next != Some(b'=') => Operator::Mul,
                (Some(b'/'), next) if next != Some(b'=') => Operator::Div,
                _ => break,
            };
            let at = self.pos;
            self.pos += 1;
            self.unary(op == Operator::Div)?;
            self.emit_reduce(op, 2, at..at + 1);
        }
        Ok(())
    }

    /// `after_slash`: the operand follows `/` directly, so an identifier
    /// here may really be a `/command` the user forgot to separate.
    fn unary(&mut self, after_slash: bool) -> CResult {
        let after_slash = !self.skip_ws() && after_slash;
        let at = self.pos;
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(b'!'), _) => Some((Operator::Not, 1)),
            (Some(b'+'), Some(b'+')) => Some((Operator::PreInc, 2)),
            (Some(b'-'), Some(b'-')) => Some((Operator::PreDec, 2)),
            (Some(b'+'), _) => Some((Operator::Add, 1)),
            (Some(b'-'), _) => Some((Operator::Sub, 1)),
            _ => None,
        };
        if let Some((op, len)) = op {
            self.pos += len;
            self.unary(false)?;
            self.emit_reduce(op, 1, at..at + len);
            return Ok(());
        }

        self.primary(after_slash)?;
        if self.at(b'(') {
            self.call()?;
        }
        Ok(())
    }

    /// Argument list of a call; the callee constant is the last instruction.
    fn call(&mut self) -> CResult {
        let open = self.pos;
        let callee = match self.code.last() {
            Some(inst) => match &inst.op {
                Op::Push(v) => v.ident().map(|id| id.name().to_owned()),
                _ => None,
            },
            None => None,
        };
        let Some(name) = callee else {
            return Err(self.error_here("function name must be an identifier."));
        };

        let mut func = None;
        let mut cmd = None;
        if let Some(def) = builtins::lookup(&name) {
            func = Some(def);
            self.replace_callee(Value::func(def));
        } else if let Some(c) = self.ctx.find_command(&name) {
            if !c.callable {
                return Err(self.error_here(format!("{}: not a function", c.name)));
            }
            self.replace_callee(Value::command(c.clone()));
            cmd = Some(c);
        }

        self.pos += 1;
        self.skip_ws();
        let mut n = 1;
        if !self.at(b')') {
            loop {
                self.assignment()?;
                n += 1;
                if self.at(b')') {
                    break;
                }
                if !self.at(b',') {
                    return Err(self.syntax_error("',' or ')' after function argument"));
                }
                self.pos += 1;
            }
        }
        if let Some(msg) = func.and_then(|def| def.arity_error(n - 1)) {
            return Err(CompileError::new(msg, open..self.pos));
        }
        if let Some(c) = cmd {
            if n > 2 {
                return Err(CompileError::new(
                    format!("{}: command called as function must have 0 or 1 argument", c.name),
                    open..self.pos,
                ));
            }
        }
        self.pos += 1;
        self.skip_ws();
        self.emit(Op::Call(n), open..self.pos);
        Ok(())
    }

    /// Swap the pushed callee identifier for its resolved callable.
    fn replace_callee(&mut self, v: ValueRef) {
        if let Some(inst) = self.code.last_mut() {
            inst.op = Op::Push(v);
        }
    }

    fn primary(&mut self, after_slash: bool) -> CResult {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c)
                if c.is_ascii_digit()
                    || (c == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let (n, used) = parse_number(&self.src[start..])
                    .map_err(|msg| CompileError::new(msg, start..start + 1))?;
                self.pos += used;
                self.push(Value::from_number(n), start..self.pos);
            }
            Some(c) if is_quote(c) => {
                let text = self.string_literal()?;
                self.push(Value::shared_string(text), start..self.pos);
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                while self.peek().is_some_and(is_word) {
                    self.pos += 1;
                }
                let name = &self.src[start..self.pos];
                self.push(Value::identifier(name), start..self.pos);
                if after_slash && self.names_command(name) {
                    self.warn(&format!("possibly missing '%;' or ')' before /{name}"));
                }
            }
            Some(b'$') => {
                self.pos += 1;
                self.dollar_sub()?;
            }
            Some(b'{') => self.var_sub(false)?,
            Some(b'%') => {
                self.pos += 1;
                self.var_sub(true)?;
            }
            Some(b'(') => {
                self.pos += 1;
                self.comma()?;
                if !self.eat(b')') {
                    return Err(self.syntax_error("')' after '(...'"));
                }
            }
            _ => return Err(self.syntax_error("operand")),
        }
        self.skip_ws();
        Ok(())
    }

    fn names_command(&self, name: &str) -> bool {
        KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name))
            || self.ctx.find_command(name).is_some()
            || self.ctx.find_macro(name, hash_string(name)).is_some()
    }

    /// A quoted literal.  Only `\\` and a backslashed quote are escapes;
    /// any other backslash is kept.
    fn string_literal(&mut self) -> Result<TfStr, CompileError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut out = String::new();
        let mut run = self.pos;
        loop {
            match self.peek() {
                None => {
                    return Err(CompileError::new(
                        format!("unmatched {} in string literal", quote as char),
                        start..self.pos,
                    ));
                }
                Some(c) if c == quote => break,
                Some(b'\\') => match self.peek_at(1) {
                    Some(e) if e == quote || e == b'\\' => {
                        out.push_str(&self.src[run..self.pos]);
                        self.pos += 1;
                        run = self.pos;
                        self.pos += 1;
                    }
                    Some(e) => {
                        if self.engine.config().pedantic {
                            let e = e as char;
                            let q = quote as char;
                            self.warn(&format!(
                                "the only legal escapes within this quoted string are \\\\ and \\{q}.  \\\\{e} is the correct way to write a literal \\{e} inside a quoted string."
                            ));
                        }
                        self.pos += 1;
                    }
                    None => self.pos += 1,
                },
                Some(_) => self.pos += 1,
            }
        }
        out.push_str(&self.src[run..self.pos]);
        self.pos += 1;
        Ok(TfStr::from(out))
    }

    // ── Substitutions ────────────────────────────────────────────────────────

    /// After `$`: `$[expr]`, `$(command)`, `$name` or `${name}`.
    fn dollar_sub(&mut self) -> CResult {
        let start = self.pos - 1;
        match self.peek() {
            Some(b'[') => {
                if !self.engine.warned_exprsub.get() || self.engine.config().pedantic {
                    self.engine.warned_exprsub.set(true);
                    self.warn(
                        "$[...] substitution in expression is legal, but redundant.  Try using (...) instead.",
                    );
                }
                self.pos += 1;
                self.skip_ws();
                self.comma()?;
                if self.pos >= self.bytes.len() {
                    return Err(CompileError::new("unmatched $[", start..self.pos));
                }
                if !self.eat(b']') {
                    return Err(self.syntax_error("operator or ']'"));
                }
            }
            Some(b'(') => {
                self.pos += 1;
                let body = self.pos;
                let mut depth = 0usize;
                loop {
                    match self.peek() {
                        None => return Err(CompileError::new("unmatched (", start..self.pos)),
                        Some(b'(') => depth += 1,
                        Some(b')') if depth == 0 => break,
                        Some(b')') => depth -= 1,
                        _ => {}
                    }
                    self.pos += 1;
                }
                let text = TfStr::new(&self.src[body..self.pos]);
                self.pos += 1;
                self.emit(Op::PushCmdSub(text), start..self.pos);
            }
            _ => {
                let bracket = self.eat(b'{');
                let name_start = self.pos;
                while let Some(c) = self.peek() {
                    if c == b'}' || c == b'$' || (!bracket && c.is_ascii_whitespace()) {
                        break;
                    }
                    self.pos += 1;
                }
                let name = TfStr::new(&self.src[name_start..self.pos]);
                if bracket {
                    if !self.eat(b'}') {
                        return Err(CompileError::new("unmatched ${", start..self.pos));
                    }
                } else {
                    self.eat(b'$');
                }
                self.emit(Op::PushMacroBody(name), start..self.pos);
            }
        }
        Ok(())
    }

    /// `{...}` substitution, or `%...` when `percent` (the `%` is already
    /// consumed).
    fn var_sub(&mut self, percent: bool) -> CResult {
        let contents = self.pos;
        let bracket = self.eat(b'{');

        let simple = |c: &Self, sym: u8| c.at(sym) && (!bracket || c.peek_at(1) == Some(b'}'));
        if simple(self, b'#') {
            self.pos += 1;
            self.emit(Op::PushParam(ParamSel::Count), contents..self.pos);
        } else if simple(self, b'?') {
            self.pos += 1;
            self.emit(Op::PushParam(ParamSel::Result), contents..self.pos);
        } else {
            self.selector(contents, bracket)?;
        }

        if self.eat(b'-') {
            let j = self.code.emit_jump(Op::JumpIfNonEmpty, contents..self.pos);
            self.emit(Op::Pop(1), contents..self.pos);
            let def_start = self.pos;
            while let Some(c) = self.peek() {
                if (bracket && c == b'}') || (!bracket && c.is_ascii_whitespace()) {
                    break;
                }
                self.pos += 1;
            }
            let text = &self.src[def_start..self.pos];
            self.push(Value::string(text), def_start..self.pos);
            self.code.patch(j, self.code.here());
        }

        if bracket && !self.eat(b'}') {
            let msg = match self.src[self.pos..].chars().next() {
                None => "unmatched { or bad substitution".to_owned(),
                Some(c) => format!("unmatched {{ or illegal character '{c}'"),
            };
            return Err(CompileError::new(msg, contents..self.pos));
        }

        if percent && (!self.engine.warned_percent.get() || self.engine.config().pedantic) {
            self.engine.warned_percent.set(true);
            let whole = &self.src[contents..self.pos];
            let inner = if bracket {
                &self.src[contents + 1..self.pos - 1]
            } else {
                whole
            };
            self.warn(&format!(
                "\"%{whole}\" substitution in expression is legal, but can be confusing.  Try using \"{{{inner}}}\" instead."
            ));
        }
        Ok(())
    }

    /// Positional parameter, capture, or variable name inside a
    /// substitution.
    ///
    /// `{L1x}` and `%Lx` name variables while `{L1}` and `%L1` select a
    /// parameter: a letter selector only stands alone when no word
    /// character follows it.
    fn selector(&mut self, contents: usize, bracket: bool) -> CResult {
        let mut except = false;
        let (mut ell, mut pee, mut star) = (false, false, false);
        let mut n: Option<usize> = None;
        let start;
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            start = self.pos;
            n = Some(self.digits());
        } else {
            except = self.eat(b'-');
            start = self.pos;
            match self.peek() {
                Some(b'L') => ell = true,
                Some(b'P') => pee = true,
                Some(b'*') => star = true,
                _ => {}
            }
            if ell || pee || star {
                self.pos += 1;
            }
            if !star && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                n = Some(self.digits());
            }
        }

        let mut name = "";
        if (n.is_none() && !star) || (bracket && (ell || pee)) {
            if self.peek().is_some_and(is_word) {
                ell = false;
                pee = false;
                n = None;
                while self.peek().is_some_and(is_word) {
                    self.pos += 1;
                }
                name = &self.src[start..self.pos];
            }
        }

        let span = contents..self.pos;
        let sel = if star {
            Some(ParamSel::All)
        } else if pee {
            Some(ParamSel::Capture(n.unwrap_or(1)))
        } else if ell {
            let k = n.unwrap_or(1);
            Some(if std::mem::take(&mut except) {
                ParamSel::AllButLast(k)
            } else {
                ParamSel::FromLast(k)
            })
        } else if let Some(k) = n.filter(|&k| k > 0) {
            Some(if std::mem::take(&mut except) {
                ParamSel::AllButFirst(k)
            } else {
                ParamSel::Nth(k)
            })
        } else if n == Some(0) {
            Some(ParamSel::CmdName)
        } else {
            match name {
                "R" => Some(ParamSel::Random),
                "PL" => Some(ParamSel::CaptureLeft),
                "PR" => Some(ParamSel::CaptureRight),
                _ => None,
            }
        };

        match sel {
            Some(sel) => self.emit(Op::PushParam(sel), span),
            None if self.at(b'-') => {
                self.emit(Op::PushVar(Ident::new(name)), span);
            }
            None => self.push(Value::identifier(name), span),
        }

        if except {
            return Err(CompileError::new(
                "illegal character '-' in substitution",
                contents..self.pos,
            ));
        }
        Ok(())
    }
}

// ── Constant folding ──────────────────────────────────────────────────────────

/// Host used while folding constants.  It has no variables, callables or
/// parameters; anything that would touch them, or any diagnostic, marks
/// the fold as unusable so the operator is left for run time.
#[derive(Default)]
struct FoldContext {
    dirty: bool,
}

impl EvalContext for FoldContext {
    fn lookup_var(&self, _name: &str, _hash: u32) -> Option<VarCell> {
        None
    }

    fn create_global(&mut self, _name: &str) -> VarCell {
        self.dirty = true;
        VarCell { scope: 0, slot: 0 }
    }

    fn read_var(&self, _cell: VarCell) -> ValueRef {
        Value::blank()
    }

    fn write_var(&mut self, _cell: VarCell, _value: ValueRef) {
        self.dirty = true;
    }

    fn find_command(&self, _name: &str) -> Option<Rc<Command>> {
        None
    }

    fn run_command(&mut self, _: &Engine, _: &Command, _: &str) -> Result<ValueRef, String> {
        self.dirty = true;
        Err("not available while folding".into())
    }

    fn find_macro(&self, _name: &str, _hash: u32) -> Option<MacroHandle> {
        None
    }

    fn run_macro(&mut self, _: &Engine, _: MacroHandle) -> Result<(), EvalError> {
        self.dirty = true;
        Err(EvalError::Aborted)
    }

    fn push_frame(&mut self, _frame: ArgFrame) {
        self.dirty = true;
    }

    fn pop_frame(&mut self) -> Option<ArgFrame> {
        None
    }

    fn positional_params(&self) -> &[ValueRef] {
        &[]
    }

    fn current_cmd_name(&self) -> TfStr {
        TfStr::blank()
    }

    fn user_result(&self) -> Option<ValueRef> {
        None
    }

    fn replace_user_result(&mut self, _value: Option<ValueRef>) -> Option<ValueRef> {
        None
    }

    fn last_match(&self) -> Option<&RegMatch> {
        None
    }

    fn set_last_match(&mut self, _m: Option<RegMatch>) {
        self.dirty = true;
    }

    fn macro_body(&self, _name: &str) -> Option<TfStr> {
        None
    }

    fn report_error(&mut self, _message: &str) {
        self.dirty = true;
    }

    fn report_warning(&mut self, _message: &str) {
        self.dirty = true;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
