//! Host services the engine calls back into.
//!
//! The engine owns no variables, macros or commands.  Everything it needs
//! from the surrounding client goes through [`EvalContext`]: the scope chain,
//! the command and macro registries, the argument frame of the running
//! macro, regexp captures, and the diagnostic sink.

use std::rc::Rc;

use crate::pattern::RegMatch;
use crate::tfstr::TfStr;

use super::error::EvalError;
use super::value::{Ident, ValueRef};
use super::vm::Engine;

/// Handle to a variable's storage, issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarCell {
    pub scope: usize,
    pub slot: usize,
}

/// Handle to a macro, issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroHandle(pub usize);

/// A built-in command as seen from expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: TfStr,
    /// `false` for commands like `/exit` that may not be called as `exit()`.
    pub callable: bool,
}

/// Positional parameters of a running macro.
#[derive(Debug, Clone, Default)]
pub struct ArgFrame {
    pub name: TfStr,
    pub params: Vec<ValueRef>,
}

/// Dependency-injection interface used by the compiler and the VM.
pub trait EvalContext {
    // -- variables ------------------------------------------------------------

    /// Resolve `name` through the scope chain (innermost first).
    fn lookup_var(&self, name: &str, hash: u32) -> Option<VarCell>;

    /// Create an unset global named `name`.
    fn create_global(&mut self, name: &str) -> VarCell;

    fn read_var(&self, cell: VarCell) -> ValueRef;

    fn write_var(&mut self, cell: VarCell, value: ValueRef);

    /// Current value of the variable an identifier names, if bound.
    fn var_value(&self, id: &Ident) -> Option<ValueRef> {
        let cell = self.lookup_var(id.name(), id.hash())?;
        Some(self.read_var(cell))
    }

    // -- callables ------------------------------------------------------------

    fn find_command(&self, name: &str) -> Option<Rc<Command>>;

    /// Run `cmd` with its single argument string; the return value becomes
    /// the call's result.
    fn run_command(
        &mut self,
        engine: &Engine,
        cmd: &Command,
        arg: &str,
    ) -> Result<ValueRef, String>;

    fn find_macro(&self, name: &str, hash: u32) -> Option<MacroHandle>;

    /// Run a macro in the frame most recently pushed with
    /// [`push_frame`](Self::push_frame).  The macro leaves its result in
    /// the user-result slot.
    ///
    /// A failure the host has already reported must come back as
    /// [`EvalError::Aborted`]; any other error is reported by the engine.
    fn run_macro(&mut self, engine: &Engine, handle: MacroHandle) -> Result<(), EvalError>;

    // -- argument frames ------------------------------------------------------

    fn push_frame(&mut self, frame: ArgFrame);

    fn pop_frame(&mut self) -> Option<ArgFrame>;

    /// Parameters of the innermost frame; empty at top level.
    fn positional_params(&self) -> &[ValueRef];

    /// Name of the running macro or command (`{0}`); blank at top level.
    fn current_cmd_name(&self) -> TfStr;

    /// The last result set by a command or macro (`{?}`).
    fn user_result(&self) -> Option<ValueRef>;

    /// Swap the user-result slot, returning the previous occupant.
    fn replace_user_result(&mut self, value: Option<ValueRef>) -> Option<ValueRef>;

    // -- regexp captures ------------------------------------------------------

    fn last_match(&self) -> Option<&RegMatch>;

    fn set_last_match(&mut self, m: Option<RegMatch>);

    // -- substitutions --------------------------------------------------------

    /// Body text of a macro, for `$name`.
    fn macro_body(&self, name: &str) -> Option<TfStr>;

    /// Output of `$(command)`, lines joined with spaces.
    fn command_output(&mut self, _engine: &Engine, _command: &str) -> Result<TfStr, String> {
        Err("command substitution is not available".into())
    }

    // -- diagnostics and settings ---------------------------------------------

    fn report_error(&mut self, message: &str) {
        tracing::error!("{message}");
    }

    fn report_warning(&mut self, message: &str) {
        tracing::warn!("{message}");
    }

    /// Significant digits used when rendering floats (`%sigfigs`).
    fn sigfigs(&self) -> usize {
        super::value::DEFAULT_SIGFIGS
    }
}
