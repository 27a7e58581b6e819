//! Error types for compiling and evaluating expressions.

use std::ops::Range;

use thiserror::Error;

/// A compile-time failure.  No [`Program`](super::program::Program) is
/// produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    /// Byte range of the offending source text.
    pub span: Range<usize>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// A run-time failure that aborts the current evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("illegal object of assignment")]
    IllegalAssignment,
    #[error("{0}: no such function")]
    NoSuchFunction(String),
    #[error("argument outside of domain")]
    Domain,
    #[error("result outside of range")]
    Range,
    #[error("expression stack overflow")]
    StackOverflow,
    #[error("too many recursions")]
    TooManyRecursions,
    #[error("instruction count exceeded %max_instr ({0}).")]
    InstructionLimit(u64),
    #[error("{0} operator: arithmetic overflow")]
    ArithmeticOverflow(&'static str),
    /// A built-in function failed with its own message.
    #[error("{0}")]
    Function(String),
    /// A command invoked as a function failed.
    #[error("{0}")]
    Command(String),
    /// A nested evaluation failed and has already reported why.
    #[error("evaluation aborted")]
    Aborted,
}

impl EvalError {
    /// Whether the failure still needs to go to the diagnostic sink.
    pub fn is_reported(&self) -> bool {
        matches!(self, EvalError::Aborted)
    }
}

/// Either kind of failure, as returned by
/// [`Engine::evaluate_source`](super::vm::Engine::evaluate_source).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
