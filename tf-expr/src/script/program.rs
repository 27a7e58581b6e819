//! Bytecode: instructions, the append-only builder, and the frozen
//! [`Program`].
//!
//! Forward jumps are emitted with a placeholder target and filled in with
//! [`ProgramBuilder::patch`] once the target is known.  The builder also
//! records every instruction index some jump lands on, which the constant
//! folder needs to avoid collapsing code across a jump target.

use std::fmt;
use std::ops::Range;

use crate::tfstr::TfStr;

use super::value::{Ident, ValueRef};

/// Operators reduced by the VM over the top `n` stack values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrEq,
    StrNe,
    Match,
    NoMatch,
    Not,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    PreInc,
    PreDec,
}

impl Operator {
    /// Source spelling, used in diagnostics and disassembly.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::StrEq => "=~",
            Operator::StrNe => "!~",
            Operator::Match => "=/",
            Operator::NoMatch => "!/",
            Operator::Not => "!",
            Operator::Assign => ":=",
            Operator::AddAssign => "+=",
            Operator::SubAssign => "-=",
            Operator::MulAssign => "*=",
            Operator::DivAssign => "/=",
            Operator::PreInc => "++",
            Operator::PreDec => "--",
        }
    }

    /// Whether reducing this operator can change host state.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Operator::Assign
                | Operator::AddAssign
                | Operator::SubAssign
                | Operator::MulAssign
                | Operator::DivAssign
                | Operator::PreInc
                | Operator::PreDec
        )
    }
}

/// Positional-parameter and capture selectors for `{…}` substitutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSel {
    /// `{#}`
    Count,
    /// `{?}`
    Result,
    /// `{n}`, 1-based
    Nth(usize),
    /// `{-n}`: everything after the first n
    AllButFirst(usize),
    /// `{Ln}`: nth from the end
    FromLast(usize),
    /// `{-Ln}`: everything but the last n
    AllButLast(usize),
    /// `{*}`
    All,
    /// `{0}`
    CmdName,
    /// `{R}`
    Random,
    /// `{Pn}`
    Capture(usize),
    /// `{PL}`
    CaptureLeft,
    /// `{PR}`
    CaptureRight,
}

impl fmt::Display for ParamSel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSel::Count => write!(f, "#"),
            ParamSel::Result => write!(f, "?"),
            ParamSel::Nth(n) => write!(f, "{n}"),
            ParamSel::AllButFirst(n) => write!(f, "-{n}"),
            ParamSel::FromLast(n) => write!(f, "L{n}"),
            ParamSel::AllButLast(n) => write!(f, "-L{n}"),
            ParamSel::All => write!(f, "*"),
            ParamSel::CmdName => write!(f, "0"),
            ParamSel::Random => write!(f, "R"),
            ParamSel::Capture(n) => write!(f, "P{n}"),
            ParamSel::CaptureLeft => write!(f, "PL"),
            ParamSel::CaptureRight => write!(f, "PR"),
        }
    }
}

/// One VM instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Push(ValueRef),
    Pop(usize),
    Dup,
    Jump(usize),
    /// Jump when the top is false; the top stays on the stack.
    JumpIfFalse(usize),
    /// Jump when the top is true; the top stays on the stack.
    JumpIfTrue(usize),
    /// Jump unless the top is an empty string; the top stays.
    JumpIfNonEmpty(usize),
    /// Push a resolved copy of a variable.
    PushVar(Ident),
    PushParam(ParamSel),
    PushMacroBody(TfStr),
    PushCmdSub(TfStr),
    /// Callee plus `n - 1` arguments.
    Call(usize),
    Reduce(Operator, usize),
}

impl Op {
    pub fn jump_target(&self) -> Option<usize> {
        match *self {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) | Op::JumpIfNonEmpty(t) => {
                Some(t)
            }
            _ => None,
        }
    }

    fn jump_target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) | Op::JumpIfNonEmpty(t) => {
                Some(t)
            }
            _ => None,
        }
    }
}

/// An instruction and the source bytes it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub span: Range<usize>,
}

/// Placeholder target of a jump not yet patched.
const UNPATCHED: usize = usize::MAX;

/// Index of an emitted jump, handed back to [`ProgramBuilder::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an emitted jump must be patched"]
pub struct JumpSlot(usize);

/// Append-only instruction buffer used by the compiler.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<Instruction>,
    /// Instruction indices some jump lands on.
    targets: Vec<usize>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next instruction will get.
    pub fn here(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Op, span: Range<usize>) {
        debug_assert!(op.jump_target().is_none(), "jumps go through emit_jump");
        self.code.push(Instruction { op, span });
    }

    /// Emit a jump with an unknown target; `make` builds the opcode.
    pub fn emit_jump(&mut self, make: fn(usize) -> Op, span: Range<usize>) -> JumpSlot {
        let slot = JumpSlot(self.code.len());
        self.code.push(Instruction {
            op: make(UNPATCHED),
            span,
        });
        slot
    }

    /// Point the jump at `slot` to `target`.
    pub fn patch(&mut self, slot: JumpSlot, target: usize) {
        let op = &mut self.code[slot.0].op;
        match op.jump_target_mut() {
            Some(t) => *t = target,
            None => panic!("patch of non-jump instruction {}", slot.0),
        }
        self.targets.push(target);
    }

    /// Whether any patched jump lands strictly inside `range`, excluding
    /// its first instruction.
    pub fn is_jump_target_within(&self, range: Range<usize>) -> bool {
        self.targets
            .iter()
            .any(|&t| t > range.start && t < range.end)
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.code.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Instruction> {
        self.code.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.code.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.code.get_mut(index)
    }

    /// Drop everything from `start` on; used when the folder replaces an
    /// operator and its operands with one constant.
    pub fn truncate(&mut self, start: usize) {
        debug_assert!(!self.is_jump_target_within(start..usize::MAX));
        self.code.truncate(start);
    }

    pub fn finish(self, source: &str) -> Program {
        for (i, inst) in self.code.iter().enumerate() {
            if let Some(t) = inst.op.jump_target() {
                assert!(t != UNPATCHED, "unpatched jump at {i}");
                assert!(t <= self.code.len(), "jump at {i} out of range");
            }
        }
        Program {
            source: TfStr::new(source),
            code: self.code,
        }
    }
}

/// Compiled, immutable bytecode for one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: TfStr,
    code: Vec<Instruction>,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use super::value::ValueKind;
        match self {
            Op::Push(v) => match v.kind() {
                ValueKind::Str(s) => write!(f, "PUSH    {:?}", s.as_str()),
                ValueKind::Id(id) => write!(f, "PUSH    id:{id}"),
                ValueKind::Func(def) => write!(f, "PUSH    func:{}", def.name),
                ValueKind::Cmd(cmd) => write!(f, "PUSH    cmd:{}", cmd.name),
                _ => write!(f, "PUSH    {v} ({})", v.type_name()),
            },
            Op::Pop(n) => write!(f, "POP     {n}"),
            Op::Dup => write!(f, "DUP"),
            Op::Jump(t) => write!(f, "JUMP    {t}"),
            Op::JumpIfFalse(t) => write!(f, "JZ      {t}"),
            Op::JumpIfTrue(t) => write!(f, "JNZ     {t}"),
            Op::JumpIfNonEmpty(t) => write!(f, "JNEMPTY {t}"),
            Op::PushVar(id) => write!(f, "PVAR    {id}"),
            Op::PushParam(sel) => write!(f, "PPARM   {{{sel}}}"),
            Op::PushMacroBody(name) => write!(f, "PMAC    {name}"),
            Op::PushCmdSub(text) => write!(f, "PCMDSUB {:?}", text.as_str()),
            Op::Call(n) => write!(f, "CALL    {n}"),
            Op::Reduce(op, n) => write!(f, "{:<7} {n}", op.symbol()),
        }
    }
}

/// Disassembly, one instruction per line with its source text.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, inst) in self.code.iter().enumerate() {
            let text = self.source.get(inst.span.clone()).unwrap_or("");
            writeln!(f, "{i:4}: {:<28} ; {text}", inst.op.to_string())?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
