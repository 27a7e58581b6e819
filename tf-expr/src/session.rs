//! In-memory host for the expression engine.
//!
//! [`Session`] implements [`EvalContext`] with plain tables: a global
//! scope plus one local scope per running macro, a macro table whose
//! bodies are expressions, a handful of built-in commands, argument
//! frames, the `{?}` result slot, and a diagnostic log.  It backs the
//! `tfexpr` binary and every test in this crate.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::config::{parse_def, parse_set_line, Config, MAX_SIGFIGS, MIN_SIGFIGS};
use crate::pattern::RegMatch;
use crate::script::{
    ArgFrame, Command, Engine, Error, EvalContext, EvalError, MacroHandle, Value, ValueRef,
    VarCell, DEFAULT_SIGFIGS,
};
use crate::tfstr::TfStr;

/// Macro nesting depth at which calls are refused.
pub const MAX_RECURSION: usize = 100;

#[derive(Debug, Default)]
struct Scope {
    index: HashMap<String, usize>,
    values: Vec<ValueRef>,
}

impl Scope {
    fn cell(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn insert(&mut self, name: &str, value: ValueRef) -> usize {
        if let Some(slot) = self.cell(name) {
            self.values[slot] = value;
            return slot;
        }
        let slot = self.values.len();
        self.values.push(value);
        self.index.insert(name.to_owned(), slot);
        slot
    }
}

#[derive(Debug)]
struct Macro {
    name: TfStr,
    body: TfStr,
}

/// Failure of one input line.
#[derive(Debug, Error)]
pub enum LineError {
    /// A malformed `/set`, `/let` or `/def` line.
    #[error("{0}")]
    Directive(String),
    /// The expression failed; the reason is already in the diagnostics.
    #[error(transparent)]
    Eval(#[from] Error),
}

#[derive(Debug)]
pub struct Session {
    /// `scopes[0]` holds the globals; each argument frame adds one.
    scopes: Vec<Scope>,
    frames: Vec<ArgFrame>,
    macros: Vec<Macro>,
    macro_index: HashMap<String, usize>,
    commands: HashMap<String, Rc<Command>>,
    user_result: Option<ValueRef>,
    last_match: Option<RegMatch>,
    sigfigs: usize,
    diagnostics: Vec<String>,
    output: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let mut s = Session {
            scopes: vec![Scope::default()],
            frames: Vec::new(),
            macros: Vec::new(),
            macro_index: HashMap::new(),
            commands: HashMap::new(),
            user_result: None,
            last_match: None,
            sigfigs: DEFAULT_SIGFIGS,
            diagnostics: Vec::new(),
            output: Vec::new(),
        };
        s.add_command("echo", true);
        s.add_command("exit", false);
        s.add_command("quit", false);
        s
    }

    /// A session seeded with the variables and macros of an rc file.
    pub fn from_config(config: &Config) -> Self {
        let mut s = Session::new();
        s.set_sigfigs(config.engine.sigfigs);
        for (name, value) in &config.vars {
            s.set_global(name, Value::string(value));
        }
        for (name, body) in &config.macros {
            s.define_macro(name, body);
        }
        s
    }

    fn add_command(&mut self, name: &str, callable: bool) {
        let cmd = Rc::new(Command {
            name: TfStr::new(name),
            callable,
        });
        self.commands.insert(name.to_owned(), cmd);
    }

    pub fn set_sigfigs(&mut self, n: usize) {
        self.sigfigs = n.clamp(MIN_SIGFIGS, MAX_SIGFIGS);
    }

    pub fn set_global(&mut self, name: &str, value: ValueRef) {
        self.scopes[0].insert(name, value);
    }

    /// Set a variable in the innermost scope (`/let`).
    pub fn set_local(&mut self, name: &str, value: ValueRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    /// Current value of `name`, innermost scope first.
    pub fn get(&self, name: &str) -> Option<ValueRef> {
        let cell = self.lookup_var(name, 0)?;
        Some(self.read_var(cell))
    }

    /// Define or replace a macro.  The body is an expression.
    pub fn define_macro(&mut self, name: &str, body: &str) {
        debug!(name, body, "define macro");
        match self.macro_index.get(name) {
            Some(&i) => self.macros[i].body = TfStr::new(body),
            None => {
                self.macro_index.insert(name.to_owned(), self.macros.len());
                self.macros.push(Macro {
                    name: TfStr::new(name),
                    body: TfStr::new(body),
                });
            }
        }
    }

    /// Enter an argument frame as if macro `name` had been called.
    pub fn push_params(&mut self, name: &str, params: &[&str]) {
        self.push_frame(ArgFrame {
            name: TfStr::new(name),
            params: params.iter().map(|p| Value::string(p)).collect(),
        });
    }

    pub fn params(&self) -> &[ValueRef] {
        self.positional_params()
    }

    /// Drain collected diagnostics, each as `error: …` or `warning: …`.
    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Drain text written by `echo`.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Handle one line of input: a `/set`, `/let` or `/def` directive, or an
    /// expression to evaluate.  Directives yield `None`.
    pub fn run_line(
        &mut self,
        engine: &Engine,
        line: &str,
    ) -> Result<Option<ValueRef>, LineError> {
        let line = line.trim();
        if let Some(args) = line.strip_prefix("/def ") {
            let (name, body) = parse_def(args).map_err(LineError::Directive)?;
            self.define_macro(&name, &body);
            return Ok(None);
        }
        if let Some(args) = line.strip_prefix("/set ") {
            let (name, value) = parse_set_line(args).map_err(LineError::Directive)?;
            if name == "sigfigs" {
                let n = value
                    .trim()
                    .parse()
                    .map_err(|_| LineError::Directive(format!("sigfigs: invalid number '{value}'")))?;
                self.set_sigfigs(n);
            }
            self.set_global(&name, Value::string(&value));
            return Ok(None);
        }
        if let Some(args) = line.strip_prefix("/let ") {
            let (name, value) = parse_set_line(args).map_err(LineError::Directive)?;
            self.set_local(&name, Value::string(&value));
            return Ok(None);
        }
        Ok(Some(engine.evaluate_source(line, self)?))
    }

    fn split_command(line: &str) -> (&str, &str) {
        let line = line.trim_start().trim_start_matches('/');
        line.split_once(|c: char| c.is_ascii_whitespace())
            .map_or((line, ""), |(name, arg)| (name, arg.trim_start()))
    }
}

impl EvalContext for Session {
    fn lookup_var(&self, name: &str, _hash: u32) -> Option<VarCell> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(scope, s)| s.cell(name).map(|slot| VarCell { scope, slot }))
    }

    fn create_global(&mut self, name: &str) -> VarCell {
        let slot = self.scopes[0].insert(name, Value::blank());
        VarCell { scope: 0, slot }
    }

    fn read_var(&self, cell: VarCell) -> ValueRef {
        self.scopes
            .get(cell.scope)
            .and_then(|s| s.values.get(cell.slot))
            .cloned()
            .unwrap_or_else(Value::blank)
    }

    fn write_var(&mut self, cell: VarCell, value: ValueRef) {
        if let Some(v) = self
            .scopes
            .get_mut(cell.scope)
            .and_then(|s| s.values.get_mut(cell.slot))
        {
            *v = value;
        }
    }

    fn find_command(&self, name: &str) -> Option<Rc<Command>> {
        self.commands.get(name).cloned()
    }

    fn run_command(&mut self, _engine: &Engine, cmd: &Command, arg: &str) -> Result<ValueRef, String> {
        match cmd.name.as_str() {
            "echo" => {
                self.output.push(arg.to_owned());
                Ok(Value::int(1))
            }
            other => Err(format!("{other}: command not available")),
        }
    }

    fn find_macro(&self, name: &str, _hash: u32) -> Option<MacroHandle> {
        self.macro_index.get(name).copied().map(MacroHandle)
    }

    fn run_macro(&mut self, engine: &Engine, handle: MacroHandle) -> Result<(), EvalError> {
        if self.frames.len() > MAX_RECURSION {
            return Err(EvalError::TooManyRecursions);
        }
        let Some(body) = self.macros.get(handle.0).map(|m| m.body.clone()) else {
            return Err(EvalError::Aborted);
        };
        match engine.evaluate_source(&body, self) {
            Ok(v) => {
                self.user_result = Some(Value::resolve(v, self));
                Ok(())
            }
            Err(_) => Err(EvalError::Aborted),
        }
    }

    fn push_frame(&mut self, frame: ArgFrame) {
        self.frames.push(frame);
        self.scopes.push(Scope::default());
    }

    fn pop_frame(&mut self) -> Option<ArgFrame> {
        let frame = self.frames.pop()?;
        self.scopes.pop();
        Some(frame)
    }

    fn positional_params(&self) -> &[ValueRef] {
        match self.frames.last() {
            Some(f) => &f.params,
            None => &[],
        }
    }

    fn current_cmd_name(&self) -> TfStr {
        self.frames
            .last()
            .map_or_else(TfStr::blank, |f| f.name.clone())
    }

    fn user_result(&self) -> Option<ValueRef> {
        self.user_result.clone()
    }

    fn replace_user_result(&mut self, value: Option<ValueRef>) -> Option<ValueRef> {
        std::mem::replace(&mut self.user_result, value)
    }

    fn last_match(&self) -> Option<&RegMatch> {
        self.last_match.as_ref()
    }

    fn set_last_match(&mut self, m: Option<RegMatch>) {
        self.last_match = m;
    }

    fn macro_body(&self, name: &str) -> Option<TfStr> {
        let &i = self.macro_index.get(name)?;
        self.macros.get(i).map(|m| m.body.clone())
    }

    /// Only `echo` produces output; anything else is an error.
    fn command_output(&mut self, _engine: &Engine, command: &str) -> Result<TfStr, String> {
        match Self::split_command(command) {
            ("echo", arg) => Ok(TfStr::new(arg)),
            (name, _) => Err(format!("{name}: command not available")),
        }
    }

    fn report_error(&mut self, message: &str) {
        debug!(message, "error");
        self.diagnostics.push(format!("error: {message}"));
    }

    fn report_warning(&mut self, message: &str) {
        debug!(message, "warning");
        self.diagnostics.push(format!("warning: {message}"));
    }

    fn sigfigs(&self) -> usize {
        self.sigfigs
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn show(s: &mut Session, v: &ValueRef) -> String {
        v.as_string(s).to_string()
    }

    #[test]
    fn locals_shadow_globals() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.set_global("x", Value::string("global"));
        s.push_params("m", &[]);
        s.set_local("x", Value::string("local"));
        let v = engine.evaluate_source("x", &mut s).unwrap();
        assert_eq!(show(&mut s, &v), "local");
        s.pop_frame();
        let v = engine.evaluate_source("x", &mut s).unwrap();
        assert_eq!(show(&mut s, &v), "global");
    }

    #[test]
    fn assignment_creates_globals_from_inside_macros() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.define_macro("setter", "made := 7");
        engine.evaluate_source("setter()", &mut s).unwrap();
        let v = s.get("made").unwrap();
        assert_eq!(show(&mut s, &v), "7");
    }

    #[test]
    fn redefining_a_macro_replaces_its_body() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.define_macro("m", "1");
        s.define_macro("m", "2");
        let v = engine.evaluate_source("m()", &mut s).unwrap();
        assert_eq!(show(&mut s, &v), "2");
        assert_eq!(s.macro_body("m").as_deref(), Some("2"));
    }

    #[test]
    fn runaway_recursion_is_refused() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.define_macro("loop", "loop()");
        assert!(engine.evaluate_source("loop()", &mut s).is_err());
        assert_eq!(s.take_diagnostics(), ["error: too many recursions"]);
        assert_eq!(engine.stack_depth(), 0);
        assert!(s.params().is_empty());
    }

    #[test]
    fn lines_and_directives() {
        let engine = Engine::default();
        let mut s = Session::new();
        assert!(s.run_line(&engine, "/set name=world").unwrap().is_none());
        assert!(s.run_line(&engine, "/def greet = strcat(\"hello \", {1})").unwrap().is_none());
        let v = s.run_line(&engine, "greet(name)").unwrap().unwrap();
        assert_eq!(show(&mut s, &v), "hello world");

        assert!(s.run_line(&engine, "/set sigfigs=3").unwrap().is_none());
        let v = s.run_line(&engine, "1.0 / 3").unwrap().unwrap();
        assert_eq!(show(&mut s, &v), "0.333");

        assert!(matches!(
            s.run_line(&engine, "/def =x"),
            Err(LineError::Directive(_))
        ));
        assert!(matches!(s.run_line(&engine, "1 +"), Err(LineError::Eval(_))));
    }

    #[test]
    fn command_substitution_runs_echo() {
        let engine = Engine::default();
        let mut s = Session::new();
        let v = engine.evaluate_source("strcat(\"<\", $(/echo hi there), \">\")", &mut s).unwrap();
        assert_eq!(show(&mut s, &v), "<hi there>");
        assert!(engine.evaluate_source("$(/frob)", &mut s).is_err());
        assert_eq!(s.take_diagnostics(), ["error: frob: command not available"]);
    }

    #[test]
    fn from_config_loads_everything() {
        let (cfg, _) = Config::load_str("/set sigfigs=4\n/set who=me\n/def twice={1}*2");
        let engine = Engine::new(cfg.engine.clone());
        let mut s = Session::from_config(&cfg);
        assert_eq!(s.sigfigs(), 4);
        let v = engine.evaluate_source("strcat(who, twice(2))", &mut s).unwrap();
        assert_eq!(show(&mut s, &v), "me4");
    }
}
