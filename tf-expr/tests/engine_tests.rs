//! End-to-end behaviour of the engine through the public API, driven by the
//! in-memory session.

use std::rc::Rc;

use tfexpr::script::timeval::TimeVal;
use tfexpr::script::value::TimeKind;
use tfexpr::script::{Engine, Error, EvalError, Op, Value, ValueKind, ValueRef};
use tfexpr::session::Session;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn eval(engine: &Engine, s: &mut Session, src: &str) -> ValueRef {
    engine
        .evaluate_source(src, s)
        .unwrap_or_else(|e| panic!("{src}: {e}"))
}

fn text(engine: &Engine, s: &mut Session, src: &str) -> String {
    let v = eval(engine, s, src);
    v.as_string(s).to_string()
}

fn eval_err(engine: &Engine, s: &mut Session, src: &str) -> Error {
    match engine.evaluate_source(src, s) {
        Ok(v) => panic!("{src}: expected an error, got {v:?}"),
        Err(e) => e,
    }
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

#[test]
fn integer_arithmetic_stays_exact() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(eval(&engine, &mut s, "3 * 2").kind(), &ValueKind::Int(6));
    assert_eq!(eval(&engine, &mut s, "7 / 2").kind(), &ValueKind::Int(3));
    assert_eq!(
        eval(&engine, &mut s, "9223372036854775806 + 1").kind(),
        &ValueKind::Int(i64::MAX)
    );
}

#[test]
fn overflow_promotes_to_float() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(
        eval(&engine, &mut s, "9223372036854775807 + 1").kind(),
        &ValueKind::Float(9223372036854775808.0)
    );
    assert_eq!(
        eval(&engine, &mut s, "-9223372036854775807 - 2").kind(),
        &ValueKind::Float(-9223372036854775809.0)
    );
    assert_eq!(
        eval(&engine, &mut s, "4611686018427387904 * 2").kind(),
        &ValueKind::Float(9223372036854775808.0)
    );
    assert!(s.take_diagnostics().is_empty());
}

#[test]
fn strings_coerce_to_numbers() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(eval(&engine, &mut s, "\"5\" + 3").kind(), &ValueKind::Int(8));
    assert_eq!(eval(&engine, &mut s, "\"abc\" + 3").kind(), &ValueKind::Int(3));
    assert!(s.take_diagnostics().is_empty());
}

#[test]
fn division_by_zero_has_no_result() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(
        eval_err(&engine, &mut s, "1 / 0"),
        Error::Eval(EvalError::DivisionByZero)
    );
    assert_eq!(s.take_diagnostics(), ["error: division by zero"]);
    assert_eq!(engine.stack_depth(), 0);
}

#[test]
fn math_domain_and_range() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(
        eval_err(&engine, &mut s, "sqrt(-1)"),
        Error::Eval(EvalError::Domain)
    );
    assert_eq!(
        eval_err(&engine, &mut s, "exp(1000)"),
        Error::Eval(EvalError::Range)
    );
    assert_eq!(
        s.take_diagnostics(),
        [
            "error: argument outside of domain",
            "error: result outside of range"
        ]
    );
}

#[test]
fn absolute_times_subtract_to_durations() {
    let engine = Engine::default();
    let mut s = Session::new();
    let set = |s: &mut Session, name: &str, sec, usec| {
        s.set_global(name, Value::time(TimeVal::new(sec, usec), TimeKind::ATime));
    };
    set(&mut s, "a", 11, 100_000);
    set(&mut s, "b", 10, 900_000);
    assert_eq!(
        eval(&engine, &mut s, "a - b").kind(),
        &ValueKind::Time(TimeVal::new(0, 200_000), TimeKind::DTime)
    );
    assert_eq!(
        eval(&engine, &mut s, "b - a").kind(),
        &ValueKind::Time(TimeVal::new(0, -200_000), TimeKind::DTime)
    );
    set(&mut s, "c", 12, 950_000);
    assert_eq!(
        eval(&engine, &mut s, "b - c").kind(),
        &ValueKind::Time(TimeVal::new(-2, -50_000), TimeKind::DTime)
    );
}

// ── Control flow ──────────────────────────────────────────────────────────────

#[test]
fn short_circuit_skips_assignment() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(eval(&engine, &mut s, "0 & (x := 5)").kind(), &ValueKind::Int(0));
    assert_eq!(eval(&engine, &mut s, "1 | (x := 5)").kind(), &ValueKind::Int(1));
    assert!(s.get("x").is_none());
    assert_eq!(eval(&engine, &mut s, "1 & (x := 5)").kind(), &ValueKind::Int(5));
    assert!(s.get("x").is_some());
}

#[test]
fn conditionals() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(text(&engine, &mut s, "5 ?: 7"), "5");
    assert_eq!(text(&engine, &mut s, "0 ?: 7"), "7");
    assert_eq!(text(&engine, &mut s, "1 ? 2 : 3"), "2");
    assert_eq!(text(&engine, &mut s, "0 ? 2 : 0 ? 3 : 4"), "4");
    assert_eq!(text(&engine, &mut s, "\"\" ? \"yes\" : \"no\""), "no");
}

// ── Assignment ────────────────────────────────────────────────────────────────

#[test]
fn assigning_to_a_constant_fails_at_run_time() {
    let engine = Engine::default();
    let mut s = Session::new();
    let prog = engine.compile("\"s\" := 1", &mut s).unwrap();
    assert_eq!(prog.len(), 3);
    assert_eq!(
        engine.execute(&prog, &mut s),
        Err(EvalError::IllegalAssignment)
    );
    assert_eq!(s.take_diagnostics(), ["error: illegal object of assignment"]);
}

#[test]
fn assignment_copies_values() {
    let engine = Engine::default();
    let mut s = Session::new();
    eval(&engine, &mut s, "x := \"hi\"");
    eval(&engine, &mut s, "y := x");
    eval(&engine, &mut s, "x := \"bye\"");
    assert_eq!(text(&engine, &mut s, "y"), "hi");
    assert_eq!(text(&engine, &mut s, "x = \"again\", x"), "again");
}

#[test]
fn compound_assignment_and_increment() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(text(&engine, &mut s, "n := 10, n += 5, n *= 2, n"), "30");
    assert_eq!(text(&engine, &mut s, "++n"), "31");
    assert_eq!(text(&engine, &mut s, "--n, --n"), "29");
}

// ── Programs ──────────────────────────────────────────────────────────────────

#[test]
fn programs_are_reusable() {
    let engine = Engine::default();
    let mut s = Session::new();
    let prog = engine.compile("strcat(\"ab\", \"cd\")", &mut s).unwrap();
    let konst = match &prog.instructions()[1].op {
        Op::Push(v) => v.clone(),
        other => panic!("unexpected {other:?}"),
    };
    let baseline = Rc::strong_count(&konst);

    let first = engine.execute(&prog, &mut s).unwrap();
    let second = engine.execute(&prog, &mut s).unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(first.as_string(&mut s).as_str(), "abcd");
    assert_eq!(second.as_string(&mut s).as_str(), "abcd");
    drop((first, second));
    assert_eq!(Rc::strong_count(&konst), baseline);
}

#[test]
fn constant_folding() {
    let engine = Engine::default();
    let mut s = Session::new();
    let prog = engine.compile("2 + 3 * 4", &mut s).unwrap();
    assert_eq!(prog.instructions().len(), 1);
    assert_eq!(prog.instructions()[0].op, Op::Push(Value::int(14)));
    assert!(engine.compile("1/0", &mut s).unwrap().len() > 1);
}

#[test]
fn arity_errors_are_compile_errors() {
    let engine = Engine::default();
    let mut s = Session::new();
    match eval_err(&engine, &mut s, "strlen(1, 2)") {
        Error::Compile(e) => assert_eq!(e.message, "strlen: found 2 arguments, expected 1"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        s.take_diagnostics(),
        ["error: strlen: found 2 arguments, expected 1"]
    );
}

// ── Macros ────────────────────────────────────────────────────────────────────

#[test]
fn macro_arguments_are_values() {
    let engine = Engine::default();
    let mut s = Session::new();
    s.define_macro("peek", "v := \"inside\", {1}");
    assert_eq!(text(&engine, &mut s, "v := \"outside\", peek(v)"), "outside");
}

#[test]
fn macro_results_do_not_track_later_assignments() {
    let engine = Engine::default();
    let mut s = Session::new();
    s.define_macro("m", "x");
    assert_eq!(
        text(&engine, &mut s, "(x := \"a\"), strcat(m(), (x := \"b\"))"),
        "ab"
    );
    let v = eval(&engine, &mut s, "m()");
    eval(&engine, &mut s, "x := \"c\"");
    assert_eq!(v.as_string(&mut s).as_str(), "b");
}

#[test]
fn nested_evaluation_preserves_operands() {
    let engine = Engine::default();
    let mut s = Session::new();
    s.define_macro("inc", "{1} + 1");
    s.define_macro("twice", "inc(inc({1}))");
    assert_eq!(text(&engine, &mut s, "1000 + twice(5) * 10"), "1070");
    assert_eq!(engine.stack_depth(), 0);
}

#[test]
fn regmatch_sets_captures() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(
        text(&engine, &mut s, "regmatch(\"(\\\\w+)@(\\\\w+)\", \"mail bob@host now\")"),
        "3"
    );
    assert_eq!(text(&engine, &mut s, "{P1}"), "bob");
    assert_eq!(text(&engine, &mut s, "{P2}"), "host");
    assert_eq!(text(&engine, &mut s, "{PL}"), "mail ");
    assert_eq!(text(&engine, &mut s, "{PR}"), " now");
}

#[test]
fn default_substitution() {
    let engine = Engine::default();
    let mut s = Session::new();
    assert_eq!(text(&engine, &mut s, "{missing-fallback}"), "fallback");
    s.set_global("present", Value::string("here"));
    assert_eq!(text(&engine, &mut s, "{present-fallback}"), "here");
    s.push_params("m", &["one"]);
    assert_eq!(text(&engine, &mut s, "{2-none}"), "none");
    assert_eq!(text(&engine, &mut s, "{1-none}"), "one");
}

// ── Builtins at integer extremes ──────────────────────────────────────────────

#[test]
fn builtins_survive_integer_extremes() {
    let engine = Engine::default();
    let mut s = Session::new();
    s.set_global("lo", Value::int(i64::MIN));
    s.set_global("hi", Value::int(i64::MAX));
    assert_eq!(text(&engine, &mut s, "rand(lo)"), "0");
    assert_eq!(text(&engine, &mut s, "abs(lo)"), i64::MIN.to_string());
    assert_eq!(text(&engine, &mut s, "mod(lo, -1)"), "0");
    assert_eq!(text(&engine, &mut s, "substr(\"abc\", lo, hi)"), "abc");
    assert_eq!(
        eval_err(&engine, &mut s, "pad(\"a\", lo)"),
        Error::Eval(EvalError::Function("pad: result too long".into()))
    );
    assert_eq!(
        eval_err(&engine, &mut s, "strrep(\"a\", hi)"),
        Error::Eval(EvalError::Function("strrep: result too long".into()))
    );
    assert_eq!(engine.stack_depth(), 0);
}
