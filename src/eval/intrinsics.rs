// Purpose: Builtin functions available to unit code without any use declaration.
// Inputs/Outputs: Dispatches by name over evaluated argument values.
// Invariants: Arity is checked before dispatch; names here shadow nothing (unit
//             bindings win over intrinsics at lookup time).
// Gotchas: overlay registers compositions and must stay reentrant for the mount
//          that is currently being composed on this thread.

use crate::error::EvalError;
use crate::eval::value::Value;
use crate::eval::{Interp, Scope};
use crate::frontend::ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Arity {
    Exactly(usize),
    Between(usize, usize),
}

impl Arity {
    fn matches(self, n: usize) -> bool {
        match self {
            Arity::Exactly(v) => n == v,
            Arity::Between(lo, hi) => n >= lo && n <= hi,
        }
    }
}

fn signature(name: &str) -> Option<(Arity, &'static str)> {
    match name {
        "len" => Some((Arity::Exactly(1), "len expects 1 argument")),
        "str" => Some((Arity::Exactly(1), "str expects 1 argument")),
        "append" => Some((Arity::Exactly(2), "append expects 2 arguments")),
        "lines" => Some((Arity::Exactly(1), "lines expects 1 argument")),
        "join" => Some((Arity::Exactly(2), "join expects 2 arguments")),
        "emit" => Some((Arity::Exactly(1), "emit expects 1 argument")),
        "overlay" => Some((
            Arity::Between(1, 2),
            "overlay expects a base unit name and an optional mount name",
        )),
        _ => None,
    }
}

pub fn is_intrinsic(name: &str) -> bool {
    signature(name).is_some()
}

pub(crate) fn call(
    interp: &Interp,
    scope: &Scope,
    name: &str,
    args: Vec<Value>,
    span: &Span,
) -> Result<Value, EvalError> {
    let (arity, arity_error) = signature(name)
        .unwrap_or_else(|| panic!("dispatch of unknown intrinsic {}", name));
    if !arity.matches(args.len()) {
        return Err(EvalError::at(arity_error, span));
    }
    match name {
        "len" => match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(EvalError::at(
                format!("len is not defined for {}", other.type_name()),
                span,
            )),
        },
        "str" => Ok(Value::Str(args[0].render())),
        "append" => match &args[0] {
            Value::List(items) => {
                let mut out = items.as_ref().clone();
                out.push(args[1].clone());
                Ok(Value::list(out))
            }
            other => Err(EvalError::at(
                format!("append expects a list, got {}", other.type_name()),
                span,
            )),
        },
        "lines" => match &args[0] {
            Value::Str(s) => Ok(Value::list(
                s.lines().map(|l| Value::Str(l.to_string())).collect(),
            )),
            other => Err(EvalError::at(
                format!("lines expects a string, got {}", other.type_name()),
                span,
            )),
        },
        "join" => {
            let Value::List(items) = &args[0] else {
                return Err(EvalError::at(
                    format!("join expects a list, got {}", args[0].type_name()),
                    span,
                ));
            };
            let Value::Str(sep) = &args[1] else {
                return Err(EvalError::at(
                    format!(
                        "join expects a string separator, got {}",
                        args[1].type_name()
                    ),
                    span,
                ));
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in items.iter() {
                let Value::Str(s) = item else {
                    return Err(EvalError::at(
                        format!("join expects string elements, got {}", item.type_name()),
                        span,
                    ));
                };
                parts.push(s.clone());
            }
            Ok(Value::Str(parts.join(sep)))
        }
        "emit" => {
            interp.engine.record_emit(args[0].render());
            Ok(Value::Nil)
        }
        "overlay" => overlay(interp, scope, args, span),
        _ => unreachable!("signature table covers every dispatched name"),
    }
}

/// `overlay(base)` / `overlay(base, mount)` — registers the calling unit as
/// the override of `base`. The upper name is the calling unit's own name;
/// the mount defaults to it, so a unit self-registers simply by being
/// loaded.
///
/// When the target mount is the very composition this thread is currently
/// executing (the self-registration case), the request is recorded for the
/// engine to fold into that composition instead of re-entering it; the call
/// then yields nil. Otherwise the composition runs immediately and the
/// merged unit is returned.
fn overlay(
    interp: &Interp,
    scope: &Scope,
    args: Vec<Value>,
    span: &Span,
) -> Result<Value, EvalError> {
    let Value::Str(base) = &args[0] else {
        return Err(EvalError::at(
            format!(
                "overlay expects a base unit name string, got {}",
                args[0].type_name()
            ),
            span,
        ));
    };
    let mount = match args.get(1) {
        Some(Value::Str(mount)) => mount.clone(),
        Some(other) => {
            return Err(EvalError::at(
                format!(
                    "overlay expects a mount name string, got {}",
                    other.type_name()
                ),
                span,
            ));
        }
        None => scope.unit.to_string(),
    };
    let upper = scope.unit.to_string();
    if interp.engine.thread_is_composing(&mount) {
        interp.engine.request_overlay(&mount, base);
        return Ok(Value::Nil);
    }
    let unit = interp
        .engine
        .compose(base, &upper, &mount)
        .map_err(|e| EvalError::at(e.to_string(), span))?;
    Ok(Value::Unit(unit))
}
