//! Runtime values and the coercion rules between them.
//!
//! A [`Value`] is immutable once it is shared; the VM, variables and
//! constants all hold it through [`ValueRef`].  The only interior state is
//! the memoised string rendering, which never changes what a value means.
//!
//! Every view (`as_bool`, `as_int`, …) looks an identifier up through the
//! host first, so an `ID` constant behaves like the variable it names.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::tfstr::TfStr;

use super::builtins::FuncDef;
use super::context::{Command, EvalContext};
use super::number::{parse_float_prefix, parse_number, Number};
use super::timeval::TimeVal;

pub type ValueRef = Rc<Value>;

/// Which of the three time-pair types a value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeKind {
    /// A plain number with a fraction (`1.5`).
    Decimal,
    /// A point in time (seconds since the epoch).
    ATime,
    /// A duration, rendered as `h:mm:ss` from one minute up.
    DTime,
}

/// An identifier with its lookup hash cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    name: TfStr,
    hash: u32,
}

impl Ident {
    pub fn new(name: &str) -> Self {
        Self {
            name: TfStr::new(name),
            hash: hash_string(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Case-insensitive string hash used for every name table.
pub fn hash_string(s: &str) -> u32 {
    s.bytes().fold(0u32, |h, c| {
        (h << 5)
            .wrapping_add(h)
            .wrapping_add(c.to_ascii_lowercase() as u32)
    })
}

/// Payload of a [`Value`].
#[derive(Debug, Clone)]
pub enum ValueKind {
    Int(i64),
    /// A non-negative integer setting.
    Pos(i64),
    /// An enumerated setting: ordinal plus its symbolic name.
    Enum { ord: i64, name: TfStr },
    Time(TimeVal, TimeKind),
    Float(f64),
    Str(TfStr),
    /// A deferred reference to a variable.
    Id(Ident),
    Func(&'static FuncDef),
    Cmd(Rc<Command>),
}

impl PartialEq for ValueKind {
    fn eq(&self, other: &Self) -> bool {
        use ValueKind::*;
        match (self, other) {
            (Int(a), Int(b)) | (Pos(a), Pos(b)) => a == b,
            (Enum { ord: a, .. }, Enum { ord: b, .. }) => a == b,
            (Time(a, ka), Time(b, kb)) => a == b && ka == kb,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Id(a), Id(b)) => a == b,
            (Func(a), Func(b)) => a.name == b.name,
            (Cmd(a), Cmd(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// The universal runtime datum.
#[derive(Debug)]
pub struct Value {
    kind: ValueKind,
    /// Set on the result of `regmatch()` and on variables assigned from it.
    regmatch: bool,
    sval: OnceCell<TfStr>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.regmatch == other.regmatch
    }
}

/// Numeric view of a value, after identifier lookup and string parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Time(TimeVal, TimeKind),
    Float(f64),
}

impl Num {
    /// Integer view; a float out of range reports and saturates.
    pub fn to_int(self, ctx: &mut dyn EvalContext) -> i64 {
        match self {
            Num::Int(i) => i,
            Num::Time(tv, _) => tv.sec,
            Num::Float(f) => {
                let t = f.trunc();
                if !(-9.223_372_036_854_776e18..9.223_372_036_854_776e18).contains(&t) {
                    ctx.report_error("real value too large to convert to integer");
                }
                f as i64
            }
        }
    }

    /// Time view; a float out of range reports and yields zero.
    pub fn to_time(self, ctx: &mut dyn EvalContext) -> TimeVal {
        match self {
            Num::Int(i) => TimeVal::new(i, 0),
            Num::Time(tv, _) => tv,
            Num::Float(f) => TimeVal::from_f64(f).unwrap_or_else(|| {
                ctx.report_error("real value too large to convert to time");
                TimeVal::ZERO
            }),
        }
    }

    pub fn to_float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Time(tv, _) => tv.as_f64(),
            Num::Float(f) => f,
        }
    }

    pub fn is_true(self) -> bool {
        match self {
            Num::Int(i) => i != 0,
            Num::Time(tv, _) => !tv.is_zero(),
            Num::Float(f) => f != 0.0,
        }
    }
}

impl From<Number> for Num {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Num::Int(i),
            Number::Decimal(tv) => Num::Time(tv, TimeKind::Decimal),
            Number::Float(f) => Num::Float(f),
        }
    }
}

impl Value {
    fn wrap(kind: ValueKind) -> ValueRef {
        Rc::new(Value {
            kind,
            regmatch: false,
            sval: OnceCell::new(),
        })
    }

    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn int(i: i64) -> ValueRef {
        Self::wrap(ValueKind::Int(i))
    }

    pub fn pos(i: i64) -> ValueRef {
        Self::wrap(ValueKind::Pos(i))
    }

    pub fn enumerated(ord: i64, name: &str) -> ValueRef {
        Self::wrap(ValueKind::Enum {
            ord,
            name: TfStr::new(name),
        })
    }

    pub fn float(f: f64) -> ValueRef {
        Self::wrap(ValueKind::Float(f))
    }

    /// A parsed numeric literal.
    pub fn from_number(n: Number) -> ValueRef {
        match n {
            Number::Int(i) => Self::int(i),
            Number::Decimal(tv) => Self::time(tv, TimeKind::Decimal),
            Number::Float(f) => Self::float(f),
        }
    }

    pub fn time(tv: TimeVal, kind: TimeKind) -> ValueRef {
        Self::wrap(ValueKind::Time(tv, kind))
    }

    /// A string holding a private copy of `s`.
    pub fn string(s: &str) -> ValueRef {
        Self::wrap(ValueKind::Str(TfStr::new(s)))
    }

    /// A string sharing an existing buffer.
    pub fn shared_string(s: TfStr) -> ValueRef {
        Self::wrap(ValueKind::Str(s))
    }

    pub fn blank() -> ValueRef {
        Self::shared_string(TfStr::blank())
    }

    pub fn identifier(name: &str) -> ValueRef {
        Self::wrap(ValueKind::Id(Ident::new(name)))
    }

    pub fn func(def: &'static FuncDef) -> ValueRef {
        Self::wrap(ValueKind::Func(def))
    }

    pub fn command(cmd: Rc<Command>) -> ValueRef {
        Self::wrap(ValueKind::Cmd(cmd))
    }

    /// An INT match count tagged as coming from `regmatch()`.
    pub fn regmatch_count(n: i64) -> ValueRef {
        Rc::new(Value {
            kind: ValueKind::Int(n),
            regmatch: true,
            sval: OnceCell::new(),
        })
    }

    /// A fresh copy of `v` for storing in a variable: strings are
    /// duplicated, the REGMATCH tag is kept.
    pub fn stored_copy(v: &Value) -> ValueRef {
        let kind = match &v.kind {
            ValueKind::Str(s) => ValueKind::Str(s.dup()),
            other => other.clone(),
        };
        Rc::new(Value {
            kind,
            regmatch: v.regmatch,
            sval: OnceCell::new(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_regmatch(&self) -> bool {
        self.regmatch
    }

    pub fn ident(&self) -> Option<&Ident> {
        match &self.kind {
            ValueKind::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self.kind, ValueKind::Id(_))
    }

    /// True for an empty STR payload (not for an identifier naming one).
    pub fn is_empty_str(&self) -> bool {
        matches!(&self.kind, ValueKind::Str(s) if s.is_empty())
    }

    /// `whatis()` name of the payload type.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Int(_) => "int",
            ValueKind::Pos(_) => "pos",
            ValueKind::Enum { .. } => "enum",
            ValueKind::Time(_, TimeKind::Decimal) => "decimal",
            ValueKind::Time(_, TimeKind::ATime) => "atime",
            ValueKind::Time(_, TimeKind::DTime) => "dtime",
            ValueKind::Float(_) => "float",
            ValueKind::Str(_) => "string",
            ValueKind::Id(_) => "id",
            ValueKind::Func(_) => "func",
            ValueKind::Cmd(_) => "cmd",
        }
    }

    // ── Views ────────────────────────────────────────────────────────────────

    /// Numeric view: identifiers are looked up, strings parsed.  `None` for
    /// an unbound identifier, an unparsable number, or a callable.
    pub fn number(&self, ctx: &mut dyn EvalContext) -> Option<Num> {
        match &self.kind {
            ValueKind::Int(i) | ValueKind::Pos(i) | ValueKind::Enum { ord: i, .. } => {
                Some(Num::Int(*i))
            }
            ValueKind::Time(tv, kind) => Some(Num::Time(*tv, *kind)),
            ValueKind::Float(f) => Some(Num::Float(*f)),
            ValueKind::Str(s) => match parse_number(s) {
                Ok((n, _)) => Some(n.into()),
                Err(msg) => {
                    ctx.report_error(&msg);
                    None
                }
            },
            ValueKind::Id(id) => ctx.var_value(id)?.number(ctx),
            ValueKind::Func(_) | ValueKind::Cmd(_) => None,
        }
    }

    pub fn as_bool(&self, ctx: &mut dyn EvalContext) -> bool {
        self.number(ctx).is_some_and(Num::is_true)
    }

    pub fn as_int(&self, ctx: &mut dyn EvalContext) -> i64 {
        match self.number(ctx) {
            Some(n) => n.to_int(ctx),
            None => 0,
        }
    }

    pub fn as_time(&self, ctx: &mut dyn EvalContext) -> TimeVal {
        match self.number(ctx) {
            Some(n) => n.to_time(ctx),
            None => TimeVal::ZERO,
        }
    }

    /// Float view.  Strings use the longest float prefix, so `"1:30"` is 1.0.
    pub fn as_float(&self, ctx: &mut dyn EvalContext) -> f64 {
        match &self.kind {
            ValueKind::Str(s) => parse_float_prefix(s),
            ValueKind::Id(id) => ctx.var_value(id).map_or(0.0, |v| v.as_float(ctx)),
            _ => self.number(ctx).map_or(0.0, Num::to_float),
        }
    }

    /// String view.  Renderings are memoised, except for floats whose
    /// precision follows the live `sigfigs` setting.
    pub fn as_string(&self, ctx: &mut dyn EvalContext) -> TfStr {
        match &self.kind {
            ValueKind::Str(s) => s.clone(),
            ValueKind::Float(f) => TfStr::from(format_float(*f, ctx.sigfigs())),
            ValueKind::Id(id) => match ctx.var_value(id) {
                Some(v) => v.as_string(ctx),
                None => TfStr::blank(),
            },
            _ => self.sval.get_or_init(|| self.render()).clone(),
        }
    }

    fn render(&self) -> TfStr {
        match &self.kind {
            ValueKind::Int(i) | ValueKind::Pos(i) => TfStr::from(i.to_string()),
            ValueKind::Enum { name, .. } => name.clone(),
            ValueKind::Time(tv, TimeKind::DTime) => TfStr::from(tv.fmt_duration()),
            ValueKind::Time(tv, _) => TfStr::from(tv.fmt_decimal()),
            ValueKind::Float(f) => TfStr::from(format_float(*f, DEFAULT_SIGFIGS)),
            ValueKind::Str(s) => s.clone(),
            ValueKind::Id(id) => id.name.clone(),
            ValueKind::Func(def) => TfStr::new(def.name),
            ValueKind::Cmd(cmd) => cmd.name.clone(),
        }
    }

    /// Replace an identifier by a copy of its variable's current value.
    ///
    /// INT-like values become INT, time kinds and floats keep their type,
    /// anything else becomes a string.  Unbound names give a blank string.
    /// Non-identifiers are returned as they are.
    pub fn resolve(v: ValueRef, ctx: &mut dyn EvalContext) -> ValueRef {
        if let Some(id) = v.ident() {
            return Value::resolve_ident(id, ctx);
        }
        v
    }

    /// [`Value::resolve`] for a bare identifier.
    pub fn resolve_ident(id: &Ident, ctx: &mut dyn EvalContext) -> ValueRef {
        let Some(var) = ctx.var_value(id) else {
            return Value::blank();
        };
        match &var.kind {
            ValueKind::Int(i) | ValueKind::Pos(i) | ValueKind::Enum { ord: i, .. } => Value::int(*i),
            ValueKind::Time(tv, kind) => Value::time(*tv, *kind),
            ValueKind::Float(f) => Value::float(*f),
            _ => Value::shared_string(var.as_string(ctx)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Float(x) => f.write_str(&format_float(*x, DEFAULT_SIGFIGS)),
            _ => f.write_str(&self.sval.get_or_init(|| self.render())),
        }
    }
}

pub const DEFAULT_SIGFIGS: usize = 15;

/// `%.*g` with a `.` appended when the result is all digits, so a float
/// never reads back as an integer.
pub fn format_float(f: f64, sigfigs: usize) -> String {
    let mut out = format_g(f, sigfigs.max(1));
    if !out.is_empty() && out.bytes().all(|b| b.is_ascii_digit()) {
        out.push('.');
    }
    out
}

fn format_g(f: f64, prec: usize) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.into();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.into();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.into();
    }
    let sci = format!("{:.*e}", prec - 1, f);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= prec as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn hash_ignores_case() {
        assert_eq!(hash_string("Foo"), hash_string("fOO"));
        assert_ne!(hash_string("foo"), hash_string("bar"));
        assert_eq!(hash_string(""), 0);
    }

    #[test]
    fn string_rendering() {
        let mut s = Session::new();
        assert_eq!(Value::int(-42).as_string(&mut s), "-42");
        assert_eq!(Value::enumerated(2, "on").as_string(&mut s), "on");
        let dec = Value::time(TimeVal::new(5, 0), TimeKind::Decimal);
        assert_eq!(dec.as_string(&mut s), "5.0");
        let dur = Value::time(TimeVal::new(90, 0), TimeKind::DTime);
        assert_eq!(dur.as_string(&mut s), "0:01:30");
        let at = Value::time(TimeVal::new(90, 0), TimeKind::ATime);
        assert_eq!(at.as_string(&mut s), "90.0");
    }

    #[test]
    fn float_rendering() {
        assert_eq!(format_float(5.0, 15), "5.");
        assert_eq!(format_float(-5.0, 15), "-5");
        assert_eq!(format_float(2.5, 15), "2.5");
        assert_eq!(format_float(1.0 / 3.0, 4), "0.3333");
        assert_eq!(format_float(9223372036854775808.0, 15), "9.22337203685478e+18");
        assert_eq!(format_float(0.0001, 15), "0.0001");
        assert_eq!(format_float(0.00001, 15), "1e-05");
        assert_eq!(format_float(123456.0, 3), "1.23e+05");
    }

    #[test]
    fn float_rendering_follows_sigfigs() {
        let mut s = Session::new();
        let v = Value::float(3.14159);
        assert_eq!(v.as_string(&mut s), "3.14159");
        s.set_sigfigs(3);
        assert_eq!(v.as_string(&mut s), "3.14");
    }

    #[test]
    fn numeric_views_of_strings() {
        let mut s = Session::new();
        assert_eq!(Value::string("5abc").as_int(&mut s), 5);
        assert_eq!(Value::string("abc").as_int(&mut s), 0);
        assert!(!Value::string("abc").as_bool(&mut s));
        assert!(Value::string("0.5").as_bool(&mut s));
        assert_eq!(Value::string("1:30").as_float(&mut s), 1.0);
        assert_eq!(Value::string("1:30").as_time(&mut s), TimeVal::new(5400, 0));
        assert!(s.take_diagnostics().is_empty());
    }

    #[test]
    fn float_to_int_overflow_reports() {
        let mut s = Session::new();
        assert_eq!(Value::float(1e300).as_int(&mut s), i64::MAX);
        assert_eq!(
            s.take_diagnostics(),
            ["error: real value too large to convert to integer"]
        );
        assert_eq!(Value::float(1e300).as_time(&mut s), TimeVal::ZERO);
        assert_eq!(
            s.take_diagnostics(),
            ["error: real value too large to convert to time"]
        );
    }

    #[test]
    fn identifiers_read_through_variables() {
        let mut s = Session::new();
        let id = Value::identifier("x");
        assert_eq!(id.as_int(&mut s), 0);
        assert_eq!(id.as_string(&mut s), "");
        s.set_global("x", Value::string("12"));
        assert_eq!(id.as_int(&mut s), 12);
        assert_eq!(id.as_string(&mut s), "12");
    }

    #[test]
    fn resolve_copies_by_type() {
        let mut s = Session::new();
        assert!(Value::resolve(Value::identifier("nope"), &mut s).is_empty_str());

        s.set_global("p", Value::pos(3));
        let r = Value::resolve(Value::identifier("p"), &mut s);
        assert_eq!(r.kind(), &ValueKind::Int(3));

        let tv = TimeVal::new(61, 0);
        s.set_global("t", Value::time(tv, TimeKind::DTime));
        let r = Value::resolve(Value::identifier("t"), &mut s);
        assert_eq!(r.kind(), &ValueKind::Time(tv, TimeKind::DTime));

        let text = TfStr::new("hi");
        s.set_global("str", Value::shared_string(text.clone()));
        let r = Value::resolve(Value::identifier("str"), &mut s);
        assert_eq!(r.kind(), &ValueKind::Str(text));

        let lit = Value::int(7);
        assert!(Rc::ptr_eq(&Value::resolve(lit.clone(), &mut s), &lit));
    }

    #[test]
    fn stored_copy_dups_strings_and_keeps_tag() {
        let text = TfStr::new("abc");
        let v = Value::shared_string(text.clone());
        let copy = Value::stored_copy(&v);
        match copy.kind() {
            ValueKind::Str(s) => assert!(!s.ptr_eq(&text)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Value::stored_copy(&Value::regmatch_count(2)).is_regmatch());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::int(1).type_name(), "int");
        assert_eq!(Value::float(1.0).type_name(), "float");
        assert_eq!(
            Value::time(TimeVal::ZERO, TimeKind::ATime).type_name(),
            "atime"
        );
        assert_eq!(Value::blank().type_name(), "string");
    }
}
