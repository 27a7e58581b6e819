//! `CALL n`: built-in functions, commands and user macros behind one
//! instruction.

use tracing::debug;

use super::context::{ArgFrame, EvalContext};
use super::error::EvalError;
use super::value::{Value, ValueKind, ValueRef};
use super::vm::Engine;

/// Call `operands[0]` with the rest as arguments, in source order.
pub(super) fn call(
    engine: &Engine,
    operands: &[ValueRef],
    ctx: &mut dyn EvalContext,
) -> Result<ValueRef, EvalError> {
    let Some((callee, args)) = operands.split_first() else {
        panic!("CALL without a callee");
    };

    match callee.kind() {
        ValueKind::Func(def) => def.call(engine, ctx, args),
        ValueKind::Cmd(cmd) => {
            let arg = match args.first() {
                Some(a) => a.as_string(ctx),
                None => Default::default(),
            };
            ctx.run_command(engine, cmd, &arg)
                .map_err(EvalError::Command)
        }
        ValueKind::Id(id) => {
            let Some(handle) = ctx.find_macro(id.name(), id.hash()) else {
                return Err(EvalError::NoSuchFunction(id.name().to_owned()));
            };
            // Arguments go by value: a variable named as an argument is
            // read now, not when the macro looks at it.
            let params = args
                .iter()
                .map(|a| {
                    if a.is_id() {
                        Value::shared_string(a.as_string(ctx).dup())
                    } else {
                        a.clone()
                    }
                })
                .collect();
            debug!(name = id.name(), "calling macro");
            ctx.push_frame(ArgFrame {
                name: id.name().into(),
                params,
            });
            let saved = ctx.replace_user_result(None);
            let outcome = ctx.run_macro(engine, handle);
            // Read the result inside the macro's frame so an identifier sees
            // the macro's scope, and never escapes as a live reference.
            let result = ctx
                .replace_user_result(saved)
                .map(|v| Value::resolve(v, ctx));
            ctx.pop_frame();
            outcome?;
            Ok(result.unwrap_or_else(Value::blank))
        }
        _ => Err(EvalError::NoSuchFunction(callee.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
