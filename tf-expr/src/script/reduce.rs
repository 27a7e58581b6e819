//! Operator reduction: typed results for arithmetic, comparison,
//! assignment and match operators.
//!
//! Arithmetic operands are promoted to the highest rank present,
//! INT < DECIMAL < DTIME < ATIME < FLOAT.  Additive overflow in the integer
//! and time ranks quietly moves the computation to FLOAT.

use crate::pattern::{MatchMode, Pattern};

use super::context::EvalContext;
use super::error::EvalError;
use super::program::Operator;
use super::timeval::TimeVal;
use super::value::{Ident, Num, TimeKind, Value, ValueRef};

/// Apply `op` to `args` (deepest operand first).
pub fn reduce(
    op: Operator,
    args: &[ValueRef],
    ctx: &mut dyn EvalContext,
) -> Result<ValueRef, EvalError> {
    use Operator::*;
    match op {
        Add | Sub | Mul | Div | Lt | Gt | Le | Ge | Eq | Ne => {
            let vals: Vec<Operand> = args.iter().map(|v| Operand::of(v, ctx)).collect();
            let r = arithmetic(op, &vals, ctx)?;
            num_value(op, r)
        }
        AddAssign | SubAssign | MulAssign | DivAssign => {
            let id = target(args)?;
            let current = Operand::of_var(ctx.var_value(id), ctx);
            let rhs = Operand::of(&args[1], ctx);
            let r = arithmetic(op, &[current, rhs], ctx)?;
            let v = num_value(op, r)?;
            Ok(assign(ctx, id, Some(v)))
        }
        Assign => {
            let id = target(args)?;
            let v = match args[1].ident() {
                Some(src) => ctx.var_value(src),
                None => Some(args[1].clone()),
            };
            Ok(assign(ctx, id, v))
        }
        PreInc | PreDec => {
            let id = target(args)?;
            let current = ctx.var_value(id).map_or(0, |v| v.as_int(ctx));
            let (i, overflow) = if op == PreInc {
                current.overflowing_add(1)
            } else {
                current.overflowing_sub(1)
            };
            if overflow {
                ctx.report_error(&format!("integer overflow in {}{}", op.symbol(), id));
            }
            Ok(assign(ctx, id, Some(Value::int(i))))
        }
        StrEq | StrNe => {
            let a = args[0].as_string(ctx);
            let b = args[1].as_string(ctx);
            Ok(Value::int(((a == b) == (op == StrEq)) as i64))
        }
        Match | NoMatch => {
            let subject = args[0].as_string(ctx);
            let pat = args[1].as_string(ctx);
            let hit = match Pattern::new(&pat, MatchMode::Glob) {
                Ok(p) => p.matches(&subject) == (op == Match),
                Err(e) => {
                    ctx.report_error(&e.to_string());
                    false
                }
            };
            Ok(Value::int(hit as i64))
        }
        Not => Ok(Value::int(!args[0].as_bool(ctx) as i64)),
    }
}

fn target(args: &[ValueRef]) -> Result<&Ident, EvalError> {
    args[0].ident().ok_or(EvalError::IllegalAssignment)
}

/// Store `value` (blank when absent) in the variable `id` names, creating a
/// global if it is unbound.  Returns a copy of what was stored.
fn assign(ctx: &mut dyn EvalContext, id: &Ident, value: Option<ValueRef>) -> ValueRef {
    let cell = match ctx.lookup_var(id.name(), id.hash()) {
        Some(cell) => cell,
        None => ctx.create_global(id.name()),
    };
    let stored = match value {
        Some(v) => Value::stored_copy(&v),
        None => Value::blank(),
    };
    ctx.write_var(cell, stored);
    Value::stored_copy(&ctx.read_var(cell))
}

fn num_value(op: Operator, n: Num) -> Result<ValueRef, EvalError> {
    Ok(match n {
        Num::Int(i) => Value::int(i),
        Num::Time(tv, kind) => Value::time(tv, kind),
        Num::Float(f) if f.is_infinite() => {
            return Err(EvalError::ArithmeticOverflow(op.symbol()));
        }
        Num::Float(f) => Value::float(f),
    })
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

/// A resolved arithmetic operand.
#[derive(Debug, Clone, Copy)]
struct Operand {
    num: Num,
    regmatch: bool,
}

impl Operand {
    fn of(v: &ValueRef, ctx: &mut dyn EvalContext) -> Operand {
        match v.ident() {
            Some(id) => {
                let var = ctx.var_value(id);
                Operand::of_var(var, ctx)
            }
            None => Operand::of_var(Some(v.clone()), ctx),
        }
    }

    /// Unbound and unparsable values count as INT 0.
    fn of_var(v: Option<ValueRef>, ctx: &mut dyn EvalContext) -> Operand {
        match v {
            Some(v) => Operand {
                num: v.number(ctx).unwrap_or(Num::Int(0)),
                regmatch: v.is_regmatch(),
            },
            None => Operand {
                num: Num::Int(0),
                regmatch: false,
            },
        }
    }

    fn is_atime(&self) -> bool {
        matches!(self.num, Num::Time(_, TimeKind::ATime))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Int,
    Decimal,
    DTime,
    ATime,
    Float,
}

impl Rank {
    fn of(n: Num) -> Rank {
        match n {
            Num::Int(_) => Rank::Int,
            Num::Time(_, TimeKind::Decimal) => Rank::Decimal,
            Num::Time(_, TimeKind::DTime) => Rank::DTime,
            Num::Time(_, TimeKind::ATime) => Rank::ATime,
            Num::Float(_) => Rank::Float,
        }
    }

    fn time_kind(self) -> TimeKind {
        match self {
            Rank::DTime => TimeKind::DTime,
            Rank::ATime => TimeKind::ATime,
            _ => TimeKind::Decimal,
        }
    }
}

/// Strip the assignment from compound operators.
fn base_op(op: Operator) -> Operator {
    match op {
        Operator::AddAssign => Operator::Add,
        Operator::SubAssign => Operator::Sub,
        Operator::MulAssign => Operator::Mul,
        Operator::DivAssign => Operator::Div,
        other => other,
    }
}

fn arithmetic(op: Operator, vals: &[Operand], ctx: &mut dyn EvalContext) -> Result<Num, EvalError> {
    use Operator::*;
    let base = base_op(op);
    let n = vals.len();
    let mut promoted = vals.iter().map(|v| Rank::of(v.num)).max().unwrap_or(Rank::Int);

    match vals {
        [a, b] if a.is_atime() && b.is_atime() => {
            if matches!(base, Add | Mul | Div) {
                ctx.report_warning(&format!(
                    "invalid operation {} on absolute time values.",
                    op.symbol()
                ));
            }
            if op == Sub {
                promoted = Rank::DTime;
            }
        }
        [a] if a.is_atime() && op == Sub => {
            ctx.report_warning("invalid operation - on absolute time value.");
        }
        _ => {}
    }

    if let (Eq | Ne, [a, b]) = (op, vals) {
        if a.regmatch || b.regmatch {
            let one_vs_match = (a.regmatch && b.num.to_int(ctx) == 1)
                || (b.regmatch && a.num.to_int(ctx) == 1);
            if one_vs_match || (a.regmatch && b.regmatch) {
                ctx.report_warning("regmatch() may return >= 1 for success.");
            }
        }
    }

    let mut sum = 0;
    if promoted < Rank::Float && matches!(base, Add | Sub) {
        let x = if n > 1 { vals[0].num.to_int(ctx) } else { 0 };
        let y = vals[n - 1].num.to_int(ctx);
        let checked = if base == Sub {
            x.checked_sub(y)
        } else {
            x.checked_add(y)
        };
        match checked {
            Some(s) => sum = s,
            None => promoted = Rank::Float,
        }
    }

    match promoted {
        Rank::Int => {
            let x = vals[0].num.to_int(ctx);
            let y = if n > 1 { vals[1].num.to_int(ctx) } else { 0 };
            Ok(match base {
                Add | Sub => Num::Int(sum),
                Mul => {
                    // Overflow is judged against the f64 product, so exact
                    // products above 2^53 still promote to FLOAT.
                    let wrapped = x.wrapping_mul(y);
                    let exact = x as f64 * y as f64;
                    if wrapped as f64 == exact {
                        Num::Int(wrapped)
                    } else {
                        Num::Float(exact)
                    }
                }
                Div => {
                    if y == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    Num::Int(x.wrapping_div(y))
                }
                cmp => Num::Int(compare(cmp, x.cmp(&y)) as i64),
            })
        }
        Rank::Decimal | Rank::DTime | Rank::ATime => {
            let kind = promoted.time_kind();
            let t1 = vals[n - 1].num.to_time(ctx);
            let t = if n == 1 {
                TimeVal::ZERO
            } else {
                vals[0].num.to_time(ctx)
            };
            Ok(match base {
                Add => Num::Time(t.add(t1), kind),
                Sub => Num::Time(t.sub(t1), kind),
                Mul => Num::Float(vals[0].num.to_float() * vals[1].num.to_float()),
                Div => Num::Float(vals[0].num.to_float() / vals[1].num.to_float()),
                cmp => Num::Int(compare(cmp, t.sub(t1).signum()) as i64),
            })
        }
        Rank::Float => {
            let f = vals[0].num.to_float();
            let g = if n > 1 { vals[1].num.to_float() } else { 0.0 };
            Ok(Num::Float(match base {
                Add if n == 1 => f,
                Sub if n == 1 => -f,
                Add => f + g,
                Sub => f - g,
                Mul => f * g,
                Div => f / g,
                Lt => return Ok(Num::Int((f < g) as i64)),
                Gt => return Ok(Num::Int((f > g) as i64)),
                Le => return Ok(Num::Int((f <= g) as i64)),
                Ge => return Ok(Num::Int((f >= g) as i64)),
                Eq => return Ok(Num::Int((f == g) as i64)),
                Ne => return Ok(Num::Int((f != g) as i64)),
                other => unreachable!("{} is not arithmetic", other.symbol()),
            }))
        }
    }
}

fn compare(op: Operator, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Operator::Lt => ord == Less,
        Operator::Gt => ord == Greater,
        Operator::Le => ord != Greater,
        Operator::Ge => ord != Less,
        Operator::Eq => ord == Equal,
        Operator::Ne => ord != Equal,
        other => unreachable!("{} is not a comparison", other.symbol()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
