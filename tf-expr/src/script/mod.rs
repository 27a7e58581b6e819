//! TF expression engine.
//!
//! Source text is compiled into a flat bytecode [`Program`] and run on a
//! stack machine owned by an [`Engine`]:
//!
//! - [`compile`](Engine::compile): nine precedence layers, compile-time
//!   call resolution, constant folding, `{…}` / `%…` / `$…` substitutions
//! - [`execute`](Engine::execute): the dispatcher, re-entrant for macros
//!   called from inside an expression
//! - `reduce`: arithmetic, comparison, matching and assignment over the
//!   INT / DECIMAL / DTIME / ATIME / FLOAT / STR value types
//! - [`builtins`]: the static function table
//!
//! Everything outside the engine (variables, macros, commands, captures,
//! diagnostics) is reached through [`EvalContext`].
//!
//! # Quick start
//!
//! ```rust
//! use tfexpr::script::Engine;
//! use tfexpr::session::Session;
//!
//! let engine = Engine::default();
//! let mut session = Session::new();
//! let v = engine.evaluate_source("x := 6, x * 7", &mut session).unwrap();
//! assert_eq!(v.as_string(&mut session).as_str(), "42");
//! ```

pub mod builtins;
mod call;
mod compile;
pub mod context;
pub mod error;
pub mod number;
pub mod program;
mod reduce;
pub mod timeval;
pub mod value;
mod vm;

// Re-exports for convenience.
pub use context::{ArgFrame, Command, EvalContext, MacroHandle, VarCell};
pub use error::{CompileError, Error, EvalError};
pub use program::{Instruction, Op, Operator, ParamSel, Program, ProgramBuilder};
pub use reduce::reduce;
pub use value::{format_float, Value, ValueKind, ValueRef, DEFAULT_SIGFIGS};
pub use vm::Engine;
