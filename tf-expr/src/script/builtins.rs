//! Built-in functions callable from expressions.
//!
//! [`FUNCS`] is sorted by name so the compiler can resolve a call with a
//! binary search and check its arity before any code runs.  Each entry point
//! receives its arguments unresolved (identifiers included) and converts them
//! through the usual value views.
//!
//! String positions count characters, not bytes.  Negative positions count
//! back from the end of the string, as in TF.

use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pattern::{MatchMode, Pattern};
use crate::tfstr::TfStr;

use super::context::EvalContext;
use super::error::EvalError;
use super::timeval::TimeVal;
use super::value::{Num, TimeKind, Value, ValueRef};
use super::vm::Engine;

pub type BuiltinFn = fn(&mut FnArgs<'_>) -> Result<ValueRef, EvalError>;

/// One row of the function table.
pub struct FuncDef {
    pub name: &'static str,
    pub min: usize,
    /// `None` for no upper bound.
    pub max: Option<usize>,
    func: BuiltinFn,
}

impl FuncDef {
    pub fn call(
        &self,
        engine: &Engine,
        ctx: &mut dyn EvalContext,
        args: &[ValueRef],
    ) -> Result<ValueRef, EvalError> {
        (self.func)(&mut FnArgs { engine, ctx, args })
    }

    /// The compile-time arity complaint for `found` arguments, if any.
    pub fn arity_error(&self, found: usize) -> Option<String> {
        let within = found >= self.min && self.max.map_or(true, |max| found <= max);
        if within {
            return None;
        }
        Some(match self.max {
            Some(max) if max == self.min => {
                format!("{}: found {found} arguments, expected {max}", self.name)
            }
            Some(max) => format!(
                "{}: found {found} arguments, expected between {} and {max}",
                self.name, self.min
            ),
            None => format!(
                "{}: found {found} arguments, expected at least {}",
                self.name, self.min
            ),
        })
    }
}

impl fmt::Debug for FuncDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncDef")
            .field("name", &self.name)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish()
    }
}

/// Arguments and services available to a built-in.
pub struct FnArgs<'a> {
    pub engine: &'a Engine,
    pub ctx: &'a mut dyn EvalContext,
    pub args: &'a [ValueRef],
}

impl FnArgs<'_> {
    fn len(&self) -> usize {
        self.args.len()
    }

    fn str(&mut self, i: usize) -> TfStr {
        self.args[i].as_string(self.ctx)
    }

    fn int(&mut self, i: usize) -> i64 {
        self.args[i].as_int(self.ctx)
    }

    fn float(&mut self, i: usize) -> f64 {
        self.args[i].as_float(self.ctx)
    }

    /// Optional position argument `i`, clamped into `0..=max`; `default`
    /// when absent.
    fn opt_pos(&mut self, i: usize, max: i64, default: i64) -> i64 {
        if i < self.len() {
            bound(self.int(i), max)
        } else {
            default
        }
    }
}

/// Clamp a position to `max`; negative positions count back from `max`.
fn bound(pos: i64, max: i64) -> i64 {
    if pos > max {
        max
    } else if pos < 0 {
        max.saturating_add(pos).max(0)
    } else {
        pos
    }
}

const fn entry(name: &'static str, min: usize, max: Option<usize>, func: BuiltinFn) -> FuncDef {
    FuncDef { name, min, max, func }
}

/// Sorted by name.
pub static FUNCS: &[FuncDef] = &[
    entry("abs", 1, Some(1), fn_abs),
    entry("acos", 1, Some(1), |a| math(a, f64::acos)),
    entry("ascii", 1, Some(1), fn_ascii),
    entry("asin", 1, Some(1), |a| math(a, f64::asin)),
    entry("atan", 1, Some(1), |a| math(a, f64::atan)),
    entry("char", 1, Some(1), fn_char),
    entry("cos", 1, Some(1), |a| math(a, f64::cos)),
    entry("exp", 1, Some(1), |a| math(a, f64::exp)),
    entry("getpid", 0, Some(0), |_| Ok(Value::int(std::process::id() as i64))),
    entry("isatty", 0, Some(0), fn_isatty),
    entry("ln", 1, Some(1), |a| math(a, f64::ln)),
    entry("log10", 1, Some(1), |a| math(a, f64::log10)),
    entry("mod", 2, Some(2), fn_mod),
    entry("pad", 1, None, fn_pad),
    entry("pow", 2, Some(2), fn_pow),
    entry("rand", 0, Some(2), fn_rand),
    entry("regmatch", 2, Some(2), fn_regmatch),
    entry("replace", 3, Some(3), fn_replace),
    entry("sin", 1, Some(1), |a| math(a, f64::sin)),
    entry("sqrt", 1, Some(1), |a| math(a, f64::sqrt)),
    entry("strcat", 1, None, fn_strcat),
    entry("strchr", 2, Some(3), fn_strchr),
    entry("strcmp", 2, Some(2), fn_strcmp),
    entry("strlen", 1, Some(1), fn_strlen),
    entry("strncmp", 3, Some(3), fn_strncmp),
    entry("strrchr", 2, Some(3), fn_strrchr),
    entry("strrep", 2, Some(2), fn_strrep),
    entry("strstr", 2, Some(3), fn_strstr),
    entry("substr", 2, Some(3), fn_substr),
    entry("systype", 0, Some(0), |_| Ok(Value::string("unix"))),
    entry("tan", 1, Some(1), |a| math(a, f64::tan)),
    entry("test", 1, Some(1), fn_test),
    entry("time", 0, Some(0), fn_time),
    entry("tolower", 1, Some(2), |a| change_case(a, char::to_ascii_lowercase)),
    entry("toupper", 1, Some(2), |a| change_case(a, char::to_ascii_uppercase)),
    entry("trunc", 1, Some(1), |a| Ok(Value::int(a.int(0)))),
    entry("whatis", 1, Some(1), fn_whatis),
];

/// Find a built-in by exact name.
pub fn lookup(name: &str) -> Option<&'static FuncDef> {
    FUNCS
        .binary_search_by(|f| f.name.cmp(name))
        .ok()
        .map(|i| &FUNCS[i])
}

// ── Math ──────────────────────────────────────────────────────────────────────

/// A NaN from ordinary input is a domain error; an infinity from finite
/// input is a range error.
fn checked_float(inputs: &[f64], r: f64) -> Result<ValueRef, EvalError> {
    if r.is_nan() && !inputs.iter().any(|x| x.is_nan()) {
        return Err(EvalError::Domain);
    }
    if r.is_infinite() && inputs.iter().all(|x| x.is_finite()) {
        return Err(EvalError::Range);
    }
    Ok(Value::float(r))
}

fn math(a: &mut FnArgs<'_>, f: fn(f64) -> f64) -> Result<ValueRef, EvalError> {
    let x = a.float(0);
    checked_float(&[x], f(x))
}

fn fn_pow(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (x, y) = (a.float(0), a.float(1));
    checked_float(&[x, y], x.powf(y))
}

fn fn_abs(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    Ok(match a.args[0].number(a.ctx) {
        None => Value::int(0),
        Some(Num::Int(i)) => Value::int(i.wrapping_abs()),
        Some(n) => Value::float(n.to_float().abs()),
    })
}

fn fn_mod(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let divisor = a.int(1);
    if divisor == 0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::int(a.int(0).wrapping_rem(divisor)))
}

fn fn_rand(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (lo, hi) = match a.len() {
        0 => return Ok(Value::int((a.engine.next_random() >> 33) as i64)),
        1 => (0, a.int(0).saturating_sub(1)),
        _ => (a.int(0).max(0), a.int(1)),
    };
    if hi <= lo {
        return Ok(Value::int(lo));
    }
    let span = (hi as i128 - lo as i128 + 1) as u128;
    let offset = (a.engine.next_random() as u128 % span) as i128;
    Ok(Value::int((lo as i128 + offset) as i64))
}

// ── Strings ───────────────────────────────────────────────────────────────────

fn fn_ascii(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let s = a.str(0);
    Ok(Value::int(s.chars().next().map_or(0, |c| c as i64)))
}

fn fn_char(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let code = a.int(0);
    let c = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or((code & 0xFF) as u8 as char);
    Ok(Value::string(c.encode_utf8(&mut [0; 4])))
}

/// Longest string `pad()` and `strrep()` will build, in characters.
pub const MAX_BUILT_LEN: u64 = 1 << 24;

fn too_long(name: &str) -> EvalError {
    EvalError::Function(format!("{name}: result too long"))
}

/// `pad(s1, w1, s2, w2, ...)`: right-justify in `w` columns when `w` is
/// positive, left-justify when negative.
fn fn_pad(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let mut out = String::new();
    let mut total: u64 = 0;
    let mut i = 0;
    while i < a.len() {
        let s = a.str(i);
        let width = if i + 1 < a.len() { a.int(i + 1) } else { 0 };
        let len = s.char_count() as u64;
        let fill = width.unsigned_abs().saturating_sub(len);
        total = total.saturating_add(len).saturating_add(fill);
        if total > MAX_BUILT_LEN {
            return Err(too_long("pad"));
        }
        let spaces = std::iter::repeat(' ').take(fill as usize);
        if width > 0 {
            out.extend(spaces);
            out.push_str(&s);
        } else {
            out.push_str(&s);
            out.extend(spaces);
        }
        i += 2;
    }
    Ok(Value::shared_string(TfStr::from(out)))
}

fn fn_regmatch(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let pattern = a.str(0);
    let subject = a.str(1).dup();
    let re = match Pattern::new(&pattern, MatchMode::Regexp) {
        Ok(re) => re,
        Err(e) => {
            a.ctx.report_error(&e.to_string());
            return Ok(Value::regmatch_count(0));
        }
    };
    match re.find(&subject) {
        Some(m) => {
            let n = m.count() as i64;
            a.ctx.set_last_match(Some(m));
            Ok(Value::regmatch_count(n))
        }
        None => Ok(Value::regmatch_count(0)),
    }
}

/// `replace(old, new, s)`
fn fn_replace(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (old, new, s) = (a.str(0), a.str(1), a.str(2));
    if old.is_empty() {
        return Ok(Value::shared_string(s));
    }
    Ok(Value::shared_string(TfStr::from(s.replace(&*old, &new))))
}

fn fn_strcat(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let mut out = String::new();
    for i in 0..a.len() {
        out.push_str(&a.str(i));
    }
    Ok(Value::shared_string(TfStr::from(out)))
}

/// Index of the first character of `s` at or after the start that appears in
/// the set, or -1.
fn fn_strchr(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (s, set) = (a.str(0), a.str(1));
    let start = a.opt_pos(2, s.char_count() as i64, 0) as usize;
    let found = s
        .chars()
        .enumerate()
        .skip(start)
        .find(|(_, c)| set.contains(*c))
        .map_or(-1, |(i, _)| i as i64);
    Ok(Value::int(found))
}

/// Index of the last character of `s` at or before the start that appears in
/// the set, or -1.
fn fn_strrchr(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (s, set) = (a.str(0), a.str(1));
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return Ok(Value::int(-1));
    }
    let last = chars.len() as i64 - 1;
    let start = a.opt_pos(2, last, last);
    let found = (0..=start)
        .rev()
        .find(|&i| set.contains(chars[i as usize]))
        .unwrap_or(-1);
    Ok(Value::int(found))
}

fn fn_strstr(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (s, needle) = (a.str(0), a.str(1));
    let start = a.opt_pos(2, s.char_count() as i64, 0) as usize;
    let offset = crate::tfstr::char_to_byte(&s, start);
    let found = s[offset..]
        .find(&*needle)
        .map_or(-1, |b| (start + s[offset..offset + b].chars().count()) as i64);
    Ok(Value::int(found))
}

fn ordering_int(o: Ordering) -> ValueRef {
    Value::int(match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

fn fn_strcmp(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (x, y) = (a.str(0), a.str(1));
    Ok(ordering_int(x.as_str().cmp(y.as_str())))
}

fn fn_strncmp(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let (x, y) = (a.str(0), a.str(1));
    let n = a.int(2);
    if n < 0 {
        return Ok(ordering_int(x.as_str().cmp(y.as_str())));
    }
    let n = n as usize;
    Ok(ordering_int(x.chars().take(n).cmp(y.chars().take(n))))
}

fn fn_strlen(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    Ok(Value::int(a.str(0).char_count() as i64))
}

fn fn_strrep(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let s = a.str(0);
    let n = a.int(1).max(0) as u64;
    match (s.char_count() as u64).checked_mul(n) {
        Some(len) if len <= MAX_BUILT_LEN => {}
        _ => return Err(too_long("strrep")),
    }
    Ok(Value::shared_string(TfStr::from(s.repeat(n as usize))))
}

/// `substr(s, start[, len])`
fn fn_substr(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let s = a.str(0);
    let len = s.char_count() as i64;
    let start = bound(a.int(1), len);
    let count = a.opt_pos(2, len - start, len - start);
    Ok(Value::shared_string(s.slice(start as usize, count as usize)))
}

fn change_case(a: &mut FnArgs<'_>, f: fn(&char) -> char) -> Result<ValueRef, EvalError> {
    let s = a.str(0);
    let len = s.char_count() as i64;
    let n = a.opt_pos(1, len, len) as usize;
    let out: String = s
        .chars()
        .enumerate()
        .map(|(i, c)| if i < n { f(&c) } else { c })
        .collect();
    Ok(Value::shared_string(TfStr::from(out)))
}

// ── Environment and evaluation ────────────────────────────────────────────────

fn fn_isatty(_: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    // SAFETY: isatty only inspects the descriptor.
    let tty = unsafe { libc::isatty(libc::STDIN_FILENO) } != 0;
    Ok(Value::int(tty as i64))
}

fn fn_time(_: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let tv = TimeVal::new(now.as_secs() as i64, now.subsec_micros() as i64);
    Ok(Value::time(tv, TimeKind::ATime))
}

/// `test(s)`: evaluate `s` as an expression.
fn fn_test(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let src = a.str(0);
    match a.engine.evaluate_source(&src, a.ctx) {
        Ok(v) => Ok(Value::resolve(v, a.ctx)),
        Err(_) => Err(EvalError::Aborted),
    }
}

fn fn_whatis(a: &mut FnArgs<'_>) -> Result<ValueRef, EvalError> {
    let v = &a.args[0];
    let name = match v.ident() {
        Some(id) => match a.ctx.var_value(id) {
            Some(var) => format!("id:{}", var.type_name()),
            None => "id:".to_owned(),
        },
        None => v.type_name().to_owned(),
    };
    Ok(Value::shared_string(TfStr::from(name)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn eval(src: &str) -> String {
        let engine = Engine::default();
        let mut s = Session::new();
        let v = engine.evaluate_source(src, &mut s).expect(src);
        v.as_string(&mut s).to_string()
    }

    fn eval_err(src: &str) -> EvalError {
        let engine = Engine::default();
        let mut s = Session::new();
        match engine.evaluate_source(src, &mut s) {
            Err(crate::script::Error::Eval(e)) => e,
            other => panic!("{src}: expected an evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn table_is_sorted() {
        assert!(FUNCS.windows(2).all(|w| w[0].name < w[1].name));
        assert!(lookup("substr").is_some());
        assert!(lookup("SUBSTR").is_none());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn arity_messages() {
        let f = lookup("substr").unwrap();
        assert_eq!(f.arity_error(2), None);
        assert_eq!(
            f.arity_error(1).unwrap(),
            "substr: found 1 arguments, expected between 2 and 3"
        );
        assert_eq!(
            lookup("strlen").unwrap().arity_error(0).unwrap(),
            "strlen: found 0 arguments, expected 1"
        );
        assert_eq!(lookup("strcat").unwrap().arity_error(40), None);
    }

    #[test]
    fn substr_positions() {
        assert_eq!(eval(r#"substr("hello", 1, 3)"#), "ell");
        assert_eq!(eval(r#"substr("hello", -3)"#), "llo");
        assert_eq!(eval(r#"substr("hello", 2, -1)"#), "ll");
        assert_eq!(eval(r#"substr("hello", 9)"#), "");
    }

    #[test]
    fn searching() {
        assert_eq!(eval(r#"strstr("hello", "l")"#), "2");
        assert_eq!(eval(r#"strstr("hello", "l", 3)"#), "3");
        assert_eq!(eval(r#"strstr("hello", "z")"#), "-1");
        assert_eq!(eval(r#"strchr("hello", "ol")"#), "2");
        assert_eq!(eval(r#"strrchr("hello", "lh")"#), "3");
        assert_eq!(eval(r#"strrchr("hello", "h", 2)"#), "0");
        assert_eq!(eval(r#"strrchr("", "h")"#), "-1");
        assert_eq!(eval(r#"strrchr("", "h", -1)"#), "-1");
        assert_eq!(eval(r#"strrchr("hello", "h", -9223372036854775807 - 1)"#), "0");
        assert_eq!(eval(r#"strchr("hello", "o", -9223372036854775807 - 1)"#), "4");
    }

    #[test]
    fn string_builders() {
        assert_eq!(eval(r#"strcat("a", 1, "b")"#), "a1b");
        assert_eq!(eval(r#"strrep("ab", 3)"#), "ababab");
        assert_eq!(eval(r#"replace("o", "0", "foo boo")"#), "f00 b00");
        assert_eq!(eval(r#"pad("ab", 4, "c", -3, "d")"#), "  abc  d");
        assert_eq!(eval(r#"toupper("hello", 2)"#), "HEllo");
        assert_eq!(eval(r#"tolower("ABC")"#), "abc");
        assert_eq!(eval(r#"strcat(char(65), ascii("A"))"#), "A65");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval(r#"strcmp("a", "b")"#), "-1");
        assert_eq!(eval(r#"strncmp("abcd", "abce", 3)"#), "0");
        assert_eq!(eval(r#"strlen("héllo")"#), "5");
    }

    #[test]
    fn math_errors() {
        assert_eq!(eval_err("sqrt(-1)"), EvalError::Domain);
        assert_eq!(eval_err("exp(1000)"), EvalError::Range);
        assert_eq!(eval_err("ln(0)"), EvalError::Range);
        assert_eq!(eval_err("mod(5, 0)"), EvalError::DivisionByZero);
        assert_eq!(eval("sqrt(16)"), "4.");
        assert_eq!(eval("pow(2, 10)"), "1024.");
        assert_eq!(eval("mod(-7, 3)"), "-1");
    }

    #[test]
    fn abs_keeps_integer_type() {
        assert_eq!(eval("abs(-4)"), "4");
        assert_eq!(eval("abs(-2.5)"), "2.5");
        assert_eq!(eval("trunc(3.9)"), "3");
    }

    #[test]
    fn rand_bounds() {
        let engine = Engine::default();
        let mut s = Session::new();
        for _ in 0..50 {
            let v = engine.evaluate_source("rand(3, 5)", &mut s).unwrap();
            assert!((3..=5).contains(&v.as_int(&mut s)));
            let v = engine.evaluate_source("rand(4)", &mut s).unwrap();
            assert!((0..4).contains(&v.as_int(&mut s)));
        }
        assert_eq!(eval("rand(7, 2)"), "7");
        assert_eq!(eval("rand(-5, -9)"), "0");
        assert_eq!(eval("rand(-9223372036854775807 - 1)"), "0");
    }

    #[test]
    fn extreme_widths_and_counts() {
        let too_long = |name: &str| EvalError::Function(format!("{name}: result too long"));
        assert_eq!(eval_err("pad(\"a\", -9223372036854775807 - 1)"), too_long("pad"));
        assert_eq!(eval_err("pad(\"a\", 9223372036854775807)"), too_long("pad"));
        assert_eq!(eval_err("strrep(\"ab\", 9223372036854775807)"), too_long("strrep"));
        assert_eq!(eval("strrep(\"\", 9223372036854775807)"), "");
        assert_eq!(eval("pad(\"a\", -3, \"b\", 0)"), "a  b");
    }

    #[test]
    fn regmatch_sets_captures() {
        let engine = Engine::default();
        let mut s = Session::new();
        let v = engine
            .evaluate_source(r#"regmatch("(\\w+) (\\w+)", "say hello world")"#, &mut s)
            .unwrap();
        assert!(v.is_regmatch());
        assert_eq!(v.as_int(&mut s), 3);
        let v = engine.evaluate_source("strcat({P2}, {PR}, {PL})", &mut s).unwrap();
        assert_eq!(v.as_string(&mut s), "hello world");
    }

    #[test]
    fn whatis_names_types() {
        assert_eq!(eval("whatis(1)"), "int");
        assert_eq!(eval("whatis(1.5)"), "decimal");
        assert_eq!(eval("whatis(1e5)"), "float");
        assert_eq!(eval(r#"whatis("x")"#), "string");
        assert_eq!(eval("whatis(time())"), "atime");
        assert_eq!(eval("whatis(nope)"), "id:");
        assert_eq!(eval("(x := 2), whatis(x)"), "id:int");
    }

    #[test]
    fn test_evaluates_its_argument() {
        assert_eq!(eval(r#"test("2 * 21")"#), "42");
        assert_eq!(eval_err(r#"test("1/0")"#), EvalError::Aborted);
    }

    #[test]
    fn systype_is_unix() {
        assert_eq!(eval("systype()"), "unix");
    }
}
