//! The expression engine: evaluation stack and bytecode dispatcher.
//!
//! One [`Engine`] owns one value stack.  Macros called from an expression
//! may compile and run further expressions on the same engine; each
//! [`Engine::execute`] works above the stack height it found on entry and
//! cuts the stack back to it before returning.

use std::cell::{Cell, RefCell};

use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::tfstr::TfStr;

use super::call;
use super::compile;
use super::context::EvalContext;
use super::error::{CompileError, Error, EvalError};
use super::program::{Op, ParamSel, Program};
use super::reduce::reduce;
use super::value::{Value, ValueRef};

pub struct Engine {
    config: EngineConfig,
    stack: RefCell<Vec<ValueRef>>,
    /// One-time warnings already given.
    pub(super) warned_exprsub: Cell<bool>,
    pub(super) warned_percent: Cell<bool>,
    rng: Cell<u64>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("depth", &self.stack_depth())
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            stack: RefCell::new(Vec::with_capacity(config.stack_size)),
            config,
            warned_exprsub: Cell::new(false),
            warned_percent: Cell::new(false),
            rng: Cell::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of values currently on the stack; zero between evaluations.
    pub fn stack_depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Compile `src` without running it.  Errors are returned, not reported.
    pub fn compile(&self, src: &str, ctx: &mut dyn EvalContext) -> Result<Program, CompileError> {
        compile::compile(self, src, ctx)
    }

    /// Compile and run `src`, reporting any failure through `ctx`.
    pub fn evaluate_source(&self, src: &str, ctx: &mut dyn EvalContext) -> Result<ValueRef, Error> {
        let prog = self.compile(src, ctx).map_err(|e| {
            ctx.report_error(&e.message);
            e
        })?;
        Ok(self.execute(&prog, ctx)?)
    }

    /// Run `prog` and return its value.  A failure is reported through `ctx`
    /// once, and every value this run pushed is released.
    pub fn execute(&self, prog: &Program, ctx: &mut dyn EvalContext) -> Result<ValueRef, EvalError> {
        let base = self.stack_depth();
        trace!(source = prog.source(), base, "execute");
        let result = self.run(prog, base, ctx);
        let mut stack = self.stack.borrow_mut();
        match result {
            Ok(()) => {
                assert!(stack.len() <= base + 1, "expression left {} values", stack.len() - base);
                let value = if stack.len() > base {
                    stack.pop()
                } else {
                    None
                };
                Ok(value.unwrap_or_else(Value::blank))
            }
            Err(e) => {
                stack.truncate(base);
                drop(stack);
                debug!(source = prog.source(), error = %e, "evaluation aborted");
                if !e.is_reported() {
                    ctx.report_error(&e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run(&self, prog: &Program, base: usize, ctx: &mut dyn EvalContext) -> Result<(), EvalError> {
        let code = prog.instructions();
        let max_instr = self.config.max_instr;
        let mut count: u64 = 0;
        let mut pc = 0;

        while pc < code.len() {
            count += 1;
            if max_instr > 0 && count > max_instr {
                return Err(EvalError::InstructionLimit(max_instr));
            }
            let inst = &code[pc].op;
            trace!(pc, op = %inst, "step");
            pc += 1;

            match inst {
                Op::Push(v) => self.push(v.clone())?,
                Op::Pop(n) => {
                    self.pop_n(*n, base);
                }
                Op::Dup => {
                    let top = self.top(base);
                    self.push(top)?;
                }
                Op::Jump(t) => pc = *t,
                Op::JumpIfFalse(t) => {
                    if !self.top(base).as_bool(ctx) {
                        pc = *t;
                    }
                }
                Op::JumpIfTrue(t) => {
                    if self.top(base).as_bool(ctx) {
                        pc = *t;
                    }
                }
                Op::JumpIfNonEmpty(t) => {
                    if !self.top(base).is_empty_str() {
                        pc = *t;
                    }
                }
                Op::PushVar(id) => self.push(Value::resolve_ident(id, ctx))?,
                Op::PushParam(sel) => {
                    let v = self.param(*sel, ctx);
                    self.push(v)?;
                }
                Op::PushMacroBody(name) => {
                    let v = match ctx.macro_body(name) {
                        Some(body) => Value::shared_string(body),
                        None => {
                            ctx.report_error(&format!("macro not defined: {name}"));
                            Value::blank()
                        }
                    };
                    self.push(v)?;
                }
                Op::PushCmdSub(text) => {
                    let out = ctx
                        .command_output(self, text)
                        .map_err(EvalError::Command)?;
                    self.push(Value::shared_string(out))?;
                }
                Op::Call(n) => {
                    let args = self.pop_n(*n, base);
                    let v = call::call(self, &args, ctx)?;
                    self.push(v)?;
                }
                Op::Reduce(op, n) => {
                    let args = self.pop_n(*n, base);
                    let v = reduce(*op, &args, ctx)?;
                    self.push(v)?;
                }
            }
        }
        Ok(())
    }

    fn push(&self, v: ValueRef) -> Result<(), EvalError> {
        let mut stack = self.stack.borrow_mut();
        if stack.len() >= self.config.stack_size {
            return Err(EvalError::StackOverflow);
        }
        stack.push(v);
        Ok(())
    }

    /// Remove the top `n` values, deepest first.
    fn pop_n(&self, n: usize, base: usize) -> Vec<ValueRef> {
        let mut stack = self.stack.borrow_mut();
        let len = stack.len();
        assert!(len >= base + n, "stack underflow: need {n}, have {}", len - base);
        stack.split_off(len - n)
    }

    fn top(&self, base: usize) -> ValueRef {
        let stack = self.stack.borrow();
        assert!(stack.len() > base, "stack underflow");
        stack[stack.len() - 1].clone()
    }

    fn param(&self, sel: ParamSel, ctx: &mut dyn EvalContext) -> ValueRef {
        let params = ctx.positional_params().to_vec();
        let len = params.len();
        match sel {
            ParamSel::Count => Value::int(len as i64),
            ParamSel::Result => ctx.user_result().unwrap_or_else(Value::blank),
            ParamSel::Nth(n) => n
                .checked_sub(1)
                .and_then(|i| params.get(i))
                .cloned()
                .unwrap_or_else(Value::blank),
            ParamSel::AllButFirst(n) => join(&params[n.min(len)..], ctx),
            ParamSel::FromLast(n) => {
                if n == 0 || n > len {
                    Value::blank()
                } else {
                    params[len - n].clone()
                }
            }
            ParamSel::AllButLast(n) => join(&params[..len.saturating_sub(n)], ctx),
            ParamSel::All => join(&params, ctx),
            ParamSel::CmdName => Value::shared_string(ctx.current_cmd_name()),
            ParamSel::Random => {
                if len == 0 {
                    Value::blank()
                } else {
                    params[(self.next_random() % len as u64) as usize].clone()
                }
            }
            ParamSel::Capture(n) => capture(ctx, |m| m.group(n).map(TfStr::new)),
            ParamSel::CaptureLeft => capture(ctx, |m| Some(TfStr::new(m.left()))),
            ParamSel::CaptureRight => capture(ctx, |m| Some(TfStr::new(m.right()))),
        }
    }

    /// Seed the generator behind `rand()` and `{R}`.
    pub fn seed(&self, seed: u64) {
        self.rng.set(if seed == 0 { FALLBACK_SEED } else { seed });
    }

    /// Next value of the xorshift64 generator, seeded from the OS on first
    /// use.
    pub(super) fn next_random(&self) -> u64 {
        let mut x = self.rng.get();
        if x == 0 {
            x = os_rand_seed();
        }
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng.set(x);
        x
    }
}

/// A single parameter is pushed as itself; a range is joined with spaces.
fn join(params: &[ValueRef], ctx: &mut dyn EvalContext) -> ValueRef {
    match params {
        [] => Value::blank(),
        [one] => one.clone(),
        many => {
            let parts: Vec<TfStr> = many.iter().map(|p| p.as_string(ctx)).collect();
            let text = parts.iter().map(TfStr::as_str).collect::<Vec<_>>().join(" ");
            Value::shared_string(TfStr::from(text))
        }
    }
}

fn capture(
    ctx: &mut dyn EvalContext,
    pick: impl FnOnce(&crate::pattern::RegMatch) -> Option<TfStr>,
) -> ValueRef {
    ctx.last_match()
        .and_then(pick)
        .map_or_else(Value::blank, Value::shared_string)
}

const FALLBACK_SEED: u64 = 0x517c_c1b7_2722_0a95;

fn os_rand_seed() -> u64 {
    use std::io::Read;
    let mut buf = [0u8; 8];
    if std::fs::File::open("/dev/urandom")
        .and_then(|mut f| f.read_exact(&mut buf))
        .is_err()
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        buf = ns.to_ne_bytes();
    }
    match u64::from_ne_bytes(buf) {
        0 => FALLBACK_SEED,
        seed => seed,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::program::{Operator, ProgramBuilder};
    use crate::script::value::ValueKind;
    use crate::session::Session;

    fn engine_with(f: impl FnOnce(&mut EngineConfig)) -> Engine {
        let mut config = EngineConfig::default();
        f(&mut config);
        Engine::new(config)
    }

    #[test]
    fn empty_program_yields_blank() {
        let engine = Engine::default();
        let mut s = Session::new();
        let prog = ProgramBuilder::new().finish("");
        assert!(engine.execute(&prog, &mut s).unwrap().is_empty_str());
    }

    #[test]
    fn dup_and_pop() {
        let engine = Engine::default();
        let mut s = Session::new();
        let mut b = ProgramBuilder::new();
        b.emit(Op::Push(Value::int(4)), 0..0);
        b.emit(Op::Dup, 0..0);
        b.emit(Op::Reduce(Operator::Mul, 2), 0..0);
        b.emit(Op::Push(Value::int(9)), 0..0);
        b.emit(Op::Pop(1), 0..0);
        let v = engine.execute(&b.finish(""), &mut s).unwrap();
        assert_eq!(v.kind(), &ValueKind::Int(16));
        assert_eq!(engine.stack_depth(), 0);
    }

    #[test]
    fn conditional_jumps_keep_the_top() {
        let engine = Engine::default();
        let mut s = Session::new();
        let mut b = ProgramBuilder::new();
        b.emit(Op::Push(Value::int(0)), 0..0);
        let j = b.emit_jump(Op::JumpIfFalse, 0..0);
        b.emit(Op::Pop(1), 0..0);
        b.emit(Op::Push(Value::int(5)), 0..0);
        b.patch(j, b.here());
        let v = engine.execute(&b.finish(""), &mut s).unwrap();
        assert_eq!(v.kind(), &ValueKind::Int(0));
    }

    #[test]
    fn stack_overflow_is_an_error() {
        let engine = engine_with(|c| c.stack_size = 4);
        let mut s = Session::new();
        let mut b = ProgramBuilder::new();
        for _ in 0..5 {
            b.emit(Op::Push(Value::int(1)), 0..0);
        }
        let err = engine.execute(&b.finish(""), &mut s).unwrap_err();
        assert_eq!(err, EvalError::StackOverflow);
        assert_eq!(engine.stack_depth(), 0);
        assert_eq!(s.take_diagnostics(), ["error: expression stack overflow"]);
    }

    #[test]
    fn instruction_budget() {
        let engine = engine_with(|c| c.max_instr = 3);
        let mut s = Session::new();
        let mut b = ProgramBuilder::new();
        let top = b.here();
        b.emit(Op::Push(Value::int(1)), 0..0);
        b.emit(Op::Pop(1), 0..0);
        let j = b.emit_jump(Op::Jump, 0..0);
        b.patch(j, top);
        let err = engine.execute(&b.finish(""), &mut s).unwrap_err();
        assert_eq!(err, EvalError::InstructionLimit(3));
        assert_eq!(
            s.take_diagnostics(),
            ["error: instruction count exceeded %max_instr (3)."]
        );
    }

    #[test]
    fn errors_release_pushed_values() {
        let engine = Engine::default();
        let mut s = Session::new();
        let prog = engine.compile("x := \"kept\", 1 + (2 / 0)", &mut s).unwrap();
        let konst = match &prog.instructions()[1].op {
            Op::Push(v) => v.clone(),
            other => panic!("unexpected {other:?}"),
        };
        let before = std::rc::Rc::strong_count(&konst);
        assert!(engine.execute(&prog, &mut s).is_err());
        assert_eq!(engine.stack_depth(), 0);
        assert_eq!(std::rc::Rc::strong_count(&konst), before);
    }

    #[test]
    fn params_and_results() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.push_params("mac", &["a", "b", "c"]);
        let eval = |src: &str, s: &mut Session| {
            let v = engine.evaluate_source(src, s).unwrap();
            v.as_string(s).to_string()
        };
        assert_eq!(eval("{#}", &mut s), "3");
        assert_eq!(eval("{1}", &mut s), "a");
        assert_eq!(eval("{4}", &mut s), "");
        assert_eq!(eval("{-1}", &mut s), "b c");
        assert_eq!(eval("{L}", &mut s), "c");
        assert_eq!(eval("{L2}", &mut s), "b");
        assert_eq!(eval("{L9}", &mut s), "");
        assert_eq!(eval("{-L}", &mut s), "a b");
        assert_eq!(eval("{*}", &mut s), "a b c");
        assert_eq!(eval("{0}", &mut s), "mac");
        assert_eq!(eval("{?}", &mut s), "");
        let r = eval("{R}", &mut s);
        assert!(["a", "b", "c"].contains(&r.as_str()));
    }

    #[test]
    fn single_param_is_shared() {
        let engine = Engine::default();
        let mut s = Session::new();
        s.push_params("m", &["only"]);
        let v = engine.evaluate_source("{*}", &mut s).unwrap();
        assert!(std::rc::Rc::ptr_eq(&v, &s.params()[0]));
    }

    #[test]
    fn undefined_macro_body_reports() {
        let engine = Engine::default();
        let mut s = Session::new();
        let v = engine.evaluate_source("$nomac", &mut s).unwrap();
        assert!(v.is_empty_str());
        assert_eq!(s.take_diagnostics(), ["error: macro not defined: nomac"]);
    }

    #[test]
    fn seeded_generator_is_deterministic() {
        let a = Engine::default();
        let b = Engine::default();
        a.seed(42);
        b.seed(42);
        let xs: Vec<u64> = (0..4).map(|_| a.next_random()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.next_random()).collect();
        assert_eq!(xs, ys);
        assert_ne!(xs[0], xs[1]);
    }
}
