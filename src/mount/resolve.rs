// Purpose: Resolve dotted names under mounts, composing nested mounts on demand.
// Inputs/Outputs: Maps lookup paths to values, registering child mounts lazily.
// Invariants: Hierarchies merge depth-first on first reference; a nested name
//             with no override counterpart falls back to the base's unit.
// Gotchas: A prefix still being composed by this thread is reachable only
//          through its nested units, never through its half-built namespace.

use std::sync::Arc;
use std::thread;

use crate::engine::Engine;
use crate::error::{ComposeError, EvalError};
use crate::eval::value::Value;
use crate::frontend::ast::Span;
use crate::frontend::suggest::{best_name_match, help_did_you_mean};
use crate::mount::locate::{UnitKind, validate_unit_name};
use crate::mount::registry::{MergedUnit, MountSpec};

/// Builds the spec for `parent_mount.child` from the parent's own base and
/// override names. The override side is probed: when the override tree has
/// no such child the nested mount composes from the base alone.
fn child_spec(
    engine: &Engine,
    parent_mount: &str,
    parent_base: &str,
    parent_upper: Option<&str>,
    child: &str,
) -> Result<MountSpec, ComposeError> {
    let upper = match parent_upper {
        Some(upper) => {
            let candidate = format!("{}.{}", upper, child);
            match engine.locator().locate(&candidate) {
                Ok(_) => Some(candidate),
                Err(ComposeError::UnitNotFound { .. }) => None,
                Err(e) => return Err(e),
            }
        }
        None => None,
    };
    Ok(MountSpec {
        mount: format!("{}.{}", parent_mount, child),
        base: format!("{}.{}", parent_base, child),
        upper,
    })
}

/// Composes (or returns the already composed) nested mount for
/// `parent.child`.
pub(crate) fn child_mount(
    engine: &Engine,
    parent: &Arc<MergedUnit>,
    child: &str,
) -> Result<Arc<MergedUnit>, ComposeError> {
    let origin = parent.origin();
    let spec = child_spec(
        engine,
        parent.name(),
        &origin.base,
        origin.upper.as_deref(),
        child,
    )?;
    engine.compose_spec(spec, true)
}

/// Attribute of a merged unit: a namespace symbol first, then a lazily
/// composed nested mount. `Ok(None)` means the name does not exist.
pub(crate) fn attr(
    engine: &Engine,
    unit: &Arc<MergedUnit>,
    name: &str,
) -> Result<Option<Value>, ComposeError> {
    if let Some(v) = unit.get(name) {
        return Ok(Some(v));
    }
    if unit.kind() == UnitKind::Composite && unit.nested().iter().any(|n| n == name) {
        return child_mount(engine, unit, name).map(|u| Some(Value::Unit(u)));
    }
    Ok(None)
}

/// Evaluator-facing attribute access with member suggestions.
pub(crate) fn unit_attr(
    engine: &Engine,
    unit: &Arc<MergedUnit>,
    name: &str,
    span: &Span,
) -> Result<Value, EvalError> {
    match attr(engine, unit, name).map_err(|e| EvalError::at(e.to_string(), span))? {
        Some(v) => Ok(v),
        None => {
            let mut candidates = unit.namespace().names();
            candidates.extend(unit.nested().iter().cloned());
            let help = best_name_match(name, &candidates)
                .map(|best| format!("\n{}", help_did_you_mean(best)))
                .unwrap_or_default();
            Err(EvalError::at(
                format!("unit {} has no member {}{}", unit.name(), name, help),
                span,
            ))
        }
    }
}

/// Resolves a dotted path the way a consumer would: the longest registered
/// mount prefix wins; an unregistered head is loaded as a plain unit. The
/// remaining segments walk namespaces and nested mounts transparently, so
/// the result is indistinguishable from a normally located unit.
pub fn lookup(engine: &Engine, path: &str) -> Result<Value, ComposeError> {
    validate_unit_name(path)?;
    let segments: Vec<&str> = path.split('.').collect();

    if let Some(prefix) = engine.registry().longest_registered_prefix(&segments)
        && let Some(record) = engine.registry().record(&prefix)
    {
        let me = thread::current().id();
        if engine.registry().pending_owned_by(&record, me) {
            // Mid-composition self-reference: serve nested children through
            // the in-flight spec without touching the half-built namespace.
            return lookup_in_flight(engine, &prefix, &segments, path);
        }
        let unit = engine.registry().await_record(&record, me)?;
        let consumed = prefix.split('.').count();
        return walk(engine, Value::Unit(unit), &segments[consumed..], path);
    }

    let head = engine.load(segments[0])?;
    walk(engine, Value::Unit(head), &segments[1..], path)
}

fn lookup_in_flight(
    engine: &Engine,
    prefix: &str,
    segments: &[&str],
    path: &str,
) -> Result<Value, ComposeError> {
    let frame = engine
        .in_flight_frame(prefix)
        .ok_or_else(|| cycle_error(prefix))?;
    let consumed = prefix.split('.').count();
    let rest = &segments[consumed..];
    let Some((child, remaining)) = rest.split_first() else {
        return Err(cycle_error(prefix));
    };
    if frame.kind != Some(UnitKind::Composite) || !frame.nested.iter().any(|n| n == child) {
        return Err(ComposeError::execution(
            prefix.to_string(),
            EvalError::new(
                format!(
                    "cannot reach {} while {} is still being composed",
                    path, prefix
                ),
                None,
            ),
        ));
    }
    let spec = child_spec(engine, prefix, &frame.base, frame.upper.as_deref(), child)?;
    let unit = engine.compose_spec(spec, true)?;
    walk(engine, Value::Unit(unit), remaining, path)
}

fn cycle_error(mount: &str) -> ComposeError {
    ComposeError::execution(
        mount.to_string(),
        EvalError::new(
            format!("circular reference while composing {}", mount),
            None,
        ),
    )
}

fn walk(
    engine: &Engine,
    start: Value,
    segments: &[&str],
    path: &str,
) -> Result<Value, ComposeError> {
    let mut value = start;
    for seg in segments {
        let unit = match &value {
            Value::Unit(u) => u.clone(),
            other => {
                return Err(ComposeError::execution(
                    path.to_string(),
                    EvalError::new(
                        format!(
                            "{} is a {}, not a unit; cannot resolve {}",
                            path,
                            other.type_name(),
                            seg
                        ),
                        None,
                    ),
                ));
            }
        };
        match attr(engine, &unit, seg)? {
            Some(v) => value = v,
            None => {
                let mut candidates = unit.namespace().names();
                candidates.extend(unit.nested().iter().cloned());
                let help = best_name_match(seg, &candidates)
                    .map(|best| format!("\n{}", help_did_you_mean(best)));
                return Err(ComposeError::UnitNotFound {
                    name: format!("{}.{}", unit.name(), seg),
                    help,
                });
            }
        }
    }
    Ok(value)
}
