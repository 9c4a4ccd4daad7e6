// Purpose: Execute base-then-override sources into one shared namespace.
// Inputs/Outputs: Turns located units plus a mount spec into a published MergedUnit.
// Invariants: Execution order is base before upper and is not configurable; a
//             failure in either source publishes nothing.
// Gotchas: Both units execute under the mount's name, so their rewritten
//          self-references resolve through the mount, not the originals.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{ComposeError, EvalError};
use crate::eval::Interp;
use crate::eval::value::Namespace;
use crate::mount::locate::CodeUnit;
use crate::mount::registry::{MergedUnit, MountSpec};

/// The (from, to) prefix pair a unit is rewritten under. For a nested mount
/// the shared dotted suffix is stripped so the whole original tree redirects
/// to the whole mount tree: composing `base.sub` under `m.sub` rewrites any
/// `base.*` reference to `m.*`, which also covers siblings that have no
/// override counterpart (the resolver falls back to the base for those).
pub fn rewrite_roots(origin: &str, mount: &str) -> (String, String) {
    let o: Vec<&str> = origin.split('.').collect();
    let m: Vec<&str> = mount.split('.').collect();
    let mut oi = o.len();
    let mut mi = m.len();
    while oi > 1 && mi > 1 && o[oi - 1] == m[mi - 1] {
        oi -= 1;
        mi -= 1;
    }
    (o[..oi].join("."), m[..mi].join("."))
}

/// Executes `base` and then `upper` (when present) into one fresh shared
/// namespace and assembles the merged unit. Symbols the override redefines
/// shadow the base's at call time for every function already bound, which is
/// what makes overrides transitive without call-graph analysis.
pub fn merge_units(
    engine: &Engine,
    spec: &MountSpec,
    base: &CodeUnit,
    upper: Option<&CodeUnit>,
) -> Result<Arc<MergedUnit>, ComposeError> {
    let wrap = |e: EvalError| ComposeError::execution(spec.mount.clone(), e);

    let (base_from, base_to) = rewrite_roots(&base.name, &spec.mount);
    let base_ast = engine.transformed(base, &base_from, &base_to).map_err(wrap)?;
    let upper_ast = match upper {
        Some(u) => {
            let (upper_from, upper_to) = rewrite_roots(&u.name, &spec.mount);
            Some(engine.transformed(u, &upper_from, &upper_to).map_err(wrap)?)
        }
        None => None,
    };

    let ns = Arc::new(Namespace::new());
    let interp = Interp::new(engine);
    interp.exec_unit(&base_ast, &ns, &spec.mount).map_err(wrap)?;
    if let Some(ast) = &upper_ast {
        interp.exec_unit(ast, &ns, &spec.mount).map_err(wrap)?;
    }

    let mut nested: BTreeSet<String> = base.nested.iter().cloned().collect();
    if let Some(u) = upper {
        nested.extend(u.nested.iter().cloned());
    }

    Ok(Arc::new(MergedUnit::new(
        spec.mount.clone(),
        base.kind,
        nested.into_iter().collect(),
        ns,
        spec.clone(),
    )))
}
