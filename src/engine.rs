// Purpose: Public composition entry points wiring locator, registry, and merger together.
// Inputs/Outputs: Turns (base, upper, mount) requests into shared MergedUnit handles.
// Invariants: All composition goes through the registry's single-flight discipline;
//             the engine itself keeps no per-mount state outside it.
// Gotchas: The in-flight stack exists so a composition can resolve references to its
//          own nested units before its record is published.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{ComposeError, EvalError};
use crate::eval::Interp;
use crate::eval::value::Value;
use crate::frontend::ast::{Span, UnitAst};
use crate::frontend::diagnostic;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::mount::cache::ArtifactCache;
use crate::mount::locate::{CodeUnit, Locator, UnitKind};
use crate::mount::merge;
use crate::mount::registry::{MergedUnit, MountSpec, Registry};
use crate::mount::resolve;
use crate::mount::rewrite;

/// Where a composition currently running on this thread stands. Lets the
/// resolver reach nested units of a mount whose record is still pending.
#[derive(Clone)]
pub(crate) struct InFlightFrame {
    pub mount: String,
    pub base: String,
    pub upper: Option<String>,
    pub kind: Option<UnitKind>,
    pub nested: Vec<String>,
}

pub struct Engine {
    locator: Locator,
    registry: Registry,
    cache: Option<ArtifactCache>,
    events: Mutex<Vec<String>>,
    in_flight: Mutex<HashMap<ThreadId, Vec<InFlightFrame>>>,
    overlay_requests: Mutex<HashMap<String, String>>,
}

impl Engine {
    /// A fresh engine with an empty registry over the given search roots
    /// (plus `OVERMOUNT_PATH`). Engines are independent: tests instantiate
    /// isolated ones instead of sharing process globals.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            locator: Locator::new(roots),
            registry: Registry::new(),
            cache: None,
            events: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            overlay_requests: Mutex::new(HashMap::new()),
        }
    }

    /// Enables the compiled-artifact cache under `root`.
    pub fn with_artifact_cache(mut self, root: PathBuf) -> Self {
        self.cache = Some(ArtifactCache::new(root));
        self
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Primary API: composes `base` and `upper` under `mount`. Idempotent
    /// per mount; concurrent callers share a single composition.
    pub fn compose(
        &self,
        base: &str,
        upper: &str,
        mount: &str,
    ) -> Result<Arc<MergedUnit>, ComposeError> {
        self.compose_spec(MountSpec::new(base, upper, mount), false)
    }

    /// `compose` with the mount name defaulted to the upper name.
    pub fn overlay(&self, base: &str, upper: &str) -> Result<Arc<MergedUnit>, ComposeError> {
        self.compose(base, upper, upper)
    }

    /// Loads a unit under its own name with no override. Shares the
    /// registry's single-flight discipline, so a unit's top-level code runs
    /// at most once per engine.
    pub fn load(&self, name: &str) -> Result<Arc<MergedUnit>, ComposeError> {
        self.compose_spec(MountSpec::plain(name), true)
    }

    /// Resolves a dotted path, composing nested mounts on demand.
    pub fn lookup(&self, path: &str) -> Result<Value, ComposeError> {
        resolve::lookup(self, path)
    }

    /// Calls a function value obtained from a merged unit.
    pub fn call(&self, callee: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        let span = Span {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        };
        Interp::new(self).call_value(callee, args, &span, 0)
    }

    /// Everything unit code passed to `emit` so far, in order.
    pub fn emitted(&self) -> Vec<String> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub(crate) fn record_emit(&self, line: String) {
        self.events.lock().expect("event log poisoned").push(line);
    }

    pub(crate) fn compose_spec(
        &self,
        spec: MountSpec,
        relaxed: bool,
    ) -> Result<Arc<MergedUnit>, ComposeError> {
        let run_spec = spec.clone();
        self.registry
            .compose_with(spec, relaxed, || self.run_pipeline(run_spec))
    }

    /// The locate → rewrite → merge pipeline the registry runs under its
    /// single-flight guard. Returns the merged unit plus the spec it was
    /// actually built from (which changes when the unit self-registers an
    /// overlay while loading).
    fn run_pipeline(
        &self,
        spec: MountSpec,
    ) -> Result<(Arc<MergedUnit>, MountSpec), ComposeError> {
        let _guard = InFlightGuard::push(self, &spec);
        let base = self.locator.locate(&spec.base)?;
        let upper = match &spec.upper {
            Some(u) => Some(self.locator.locate(u)?),
            None => None,
        };
        if let Some(up) = &upper
            && up.kind != base.kind
        {
            return Err(kind_disagreement(&spec.mount, &base, up));
        }

        let mut nested: BTreeSet<String> = base.nested.iter().cloned().collect();
        if let Some(up) = &upper {
            nested.extend(up.nested.iter().cloned());
        }
        self.update_in_flight(&spec.mount, &spec, base.kind, nested.into_iter().collect());

        let merged = merge::merge_units(self, &spec, &base, upper.as_ref())?;

        // Always drain any overlay() request against this mount; it is only
        // honored for plain loads (an explicit compose already has an upper).
        let overlay_request = self.take_overlay_request(&spec.mount);
        if spec.upper.is_none()
            && let Some(overlay_base) = overlay_request
        {
            // The unit called overlay() against its own mount while loading:
            // fold the request into this composition instead of re-entering.
            debug!(mount = %spec.mount, base = %overlay_base, "folding self-registered overlay");
            let final_spec = MountSpec {
                mount: spec.mount.clone(),
                base: overlay_base,
                upper: Some(spec.base.clone()),
            };
            let over_base = self.locator.locate(&final_spec.base)?;
            if over_base.kind != base.kind {
                return Err(kind_disagreement(&spec.mount, &over_base, &base));
            }
            let mut nested: BTreeSet<String> = over_base.nested.iter().cloned().collect();
            nested.extend(base.nested.iter().cloned());
            self.update_in_flight(
                &spec.mount,
                &final_spec,
                over_base.kind,
                nested.into_iter().collect(),
            );
            let merged = merge::merge_units(self, &final_spec, &over_base, Some(&base))?;
            // The re-execution of the upper source repeats the overlay call;
            // that request is already satisfied.
            let _ = self.take_overlay_request(&spec.mount);
            return Ok((merged, final_spec));
        }

        Ok((merged, spec))
    }

    /// Cache-aware parse + self-reference rewrite of a located unit.
    pub(crate) fn transformed(
        &self,
        unit: &CodeUnit,
        from: &str,
        to: &str,
    ) -> Result<UnitAst, EvalError> {
        if let Some(cache) = &self.cache
            && let Some(ast) = cache.load(&unit.name, &unit.source, from, to)
        {
            return Ok(ast);
        }
        let ast = parse_unit_source(unit)?;
        let ast = rewrite::rewrite_unit(ast, &unit.name, unit.kind, from, to)?;
        if let Some(cache) = &self.cache {
            cache.store(&unit.name, &unit.source, from, to, &ast);
        }
        Ok(ast)
    }

    /// Resolves a `use` path; the result must be a unit.
    pub(crate) fn use_unit(&self, path: &str) -> Result<Value, ComposeError> {
        let value = resolve::lookup(self, path)?;
        match value {
            Value::Unit(_) => Ok(value),
            other => Err(ComposeError::execution(
                path.to_string(),
                EvalError::new(
                    format!("{} is not a unit (found {})", path, other.type_name()),
                    None,
                ),
            )),
        }
    }

    pub(crate) fn thread_is_composing(&self, mount: &str) -> bool {
        self.in_flight_frame(mount).is_some()
    }

    pub(crate) fn in_flight_frame(&self, mount: &str) -> Option<InFlightFrame> {
        let map = self.in_flight.lock().expect("in-flight lock poisoned");
        map.get(&thread::current().id())
            .and_then(|stack| stack.iter().rev().find(|f| f.mount == mount))
            .cloned()
    }

    fn update_in_flight(
        &self,
        mount: &str,
        spec: &MountSpec,
        kind: UnitKind,
        nested: Vec<String>,
    ) {
        let mut map = self.in_flight.lock().expect("in-flight lock poisoned");
        if let Some(stack) = map.get_mut(&thread::current().id())
            && let Some(frame) = stack.iter_mut().rev().find(|f| f.mount == mount)
        {
            frame.base = spec.base.clone();
            frame.upper = spec.upper.clone();
            frame.kind = Some(kind);
            frame.nested = nested;
        }
    }

    pub(crate) fn request_overlay(&self, mount: &str, base: &str) {
        self.overlay_requests
            .lock()
            .expect("overlay request lock poisoned")
            .insert(mount.to_string(), base.to_string());
    }

    fn take_overlay_request(&self, mount: &str) -> Option<String> {
        self.overlay_requests
            .lock()
            .expect("overlay request lock poisoned")
            .remove(mount)
    }
}

fn kind_disagreement(mount: &str, a: &CodeUnit, b: &CodeUnit) -> ComposeError {
    ComposeError::execution(
        mount.to_string(),
        EvalError::new(
            format!(
                "{} and {} disagree on unit kind ({:?} vs {:?})",
                a.name, b.name, a.kind, b.kind
            ),
            None,
        ),
    )
}

fn parse_unit_source(unit: &CodeUnit) -> Result<UnitAst, EvalError> {
    let tokens = Lexer::new(&unit.source).lex_all();
    let mut parser = Parser::new(tokens);
    match parser.parse_unit() {
        Some(ast) => Ok(ast),
        None => {
            let span = parser
                .diags
                .items
                .first()
                .and_then(|d| d.span.clone());
            Err(EvalError {
                message: diagnostic::render_all(&parser.diags, &unit.name, &unit.source),
                span,
            })
        }
    }
}

struct InFlightGuard<'a> {
    engine: &'a Engine,
}

impl<'a> InFlightGuard<'a> {
    fn push(engine: &'a Engine, spec: &MountSpec) -> Self {
        let frame = InFlightFrame {
            mount: spec.mount.clone(),
            base: spec.base.clone(),
            upper: spec.upper.clone(),
            kind: None,
            nested: Vec::new(),
        };
        engine
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .entry(thread::current().id())
            .or_default()
            .push(frame);
        Self { engine }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self
            .engine
            .in_flight
            .lock()
            .expect("in-flight lock poisoned");
        let tid = thread::current().id();
        if let Some(stack) = map.get_mut(&tid) {
            stack.pop();
            if stack.is_empty() {
                map.remove(&tid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "overmount-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ));
        fs::create_dir_all(&root).expect("mkdir");
        root
    }

    fn write_unit(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write unit");
    }

    fn wrap_fixture(root: &Path) {
        write_unit(
            root,
            "base.ov",
            "fn process(text) {\n  return text\n}\nfn wrap(text) {\n  return \"[\" + process(text) + \"]\"\n}\nlet SHARED = \"base\"\nlet KEPT = \"base\"\n",
        );
        write_unit(
            root,
            "upper.ov",
            "fn process(text) {\n  let out = []\n  for line in lines(text) {\n    out = append(out, \"> \" + line)\n  }\n  return join(out, \"\\n\")\n}\nlet SHARED = \"upper\"\n",
        );
    }

    #[test]
    fn override_wins_and_base_only_symbols_survive() {
        let root = temp_root("precedence");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);

        let merged = engine.compose("base", "upper", "m").expect("compose");
        assert_eq!(merged.get("SHARED").expect("SHARED").render(), "upper");
        assert_eq!(merged.get("KEPT").expect("KEPT").render(), "base");

        // The merged value matches what the override itself binds.
        let upper = engine.load("upper").expect("load upper");
        assert_eq!(merged.get("SHARED"), upper.get("SHARED"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn overlay_defaults_the_mount_to_the_upper_name() {
        let root = temp_root("overlay-default");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);

        let merged = engine.overlay("base", "upper").expect("overlay");
        assert_eq!(merged.name(), "upper");
        assert!(engine.registry().contains("upper"));

        // Lookups under the upper name now hit the mount, not the plain unit.
        assert_eq!(
            engine.lookup("upper.KEPT").expect("upper.KEPT").render(),
            "base"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn base_code_follows_overridden_symbols_transitively() {
        let root = temp_root("late-binding");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);
        engine.compose("base", "upper", "m").expect("compose");

        let wrap = engine.lookup("m.wrap").expect("m.wrap");
        let out = engine
            .call(&wrap, vec![Value::Str("hello\nworld".to_string())])
            .expect("call");
        assert_eq!(out.render(), "[> hello\n> world]");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn originals_are_never_mutated_by_composition() {
        let root = temp_root("non-mutation");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);

        let base = engine.load("base").expect("load base");
        let wrap_before = base.get("wrap").expect("wrap");
        let shared_before = base.get("SHARED").expect("SHARED");

        engine.compose("base", "upper", "m").expect("compose");

        // Identical bindings, same function object, unchanged behavior.
        assert_eq!(base.get("wrap"), Some(wrap_before.clone()));
        assert_eq!(base.get("SHARED"), Some(shared_before));
        let out = engine
            .call(&wrap_before, vec![Value::Str("hello".to_string())])
            .expect("call");
        assert_eq!(out.render(), "[hello]");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn fifty_concurrent_composition_requests_run_unit_code_once() {
        let root = temp_root("single-flight");
        write_unit(root.as_path(), "base.ov", "emit(\"base ran\")\nlet A = 1\n");
        write_unit(root.as_path(), "upper.ov", "emit(\"upper ran\")\nlet A = 2\n");
        let engine = Engine::new([root.clone()]);

        let results: Vec<Arc<MergedUnit>> = thread::scope(|scope| {
            let mut handles = Vec::new();
            for _ in 0..50 {
                handles.push(scope.spawn(|| engine.compose("base", "upper", "m")));
            }
            handles
                .into_iter()
                .map(|h| h.join().expect("worker panicked").expect("compose"))
                .collect()
        });

        assert_eq!(
            engine.emitted(),
            vec!["base ran".to_string(), "upper ran".to_string()],
            "base and upper top-level code must run exactly once"
        );
        for unit in &results {
            assert!(Arc::ptr_eq(unit, &results[0]));
        }
        assert_eq!(results[0].get("A"), Some(Value::Int(2)));

        let _ = fs::remove_dir_all(root);
    }

    fn nested_fixture(root: &Path) {
        write_unit(root, "base/unit.ov", "");
        write_unit(root, "base/sub.ov", "let VALUE = 1\n");
        write_unit(root, "base/extra.ov", "let NAME = \"extra\"\n");
        write_unit(root, "upper/unit.ov", "");
        write_unit(root, "upper/sub.ov", "let VALUE = 2\n");
    }

    #[test]
    fn nested_units_compose_lazily_and_depth_first() {
        let root = temp_root("nested");
        nested_fixture(&root);
        let engine = Engine::new([root.clone()]);

        engine.compose("base", "upper", "m").expect("compose");
        assert!(
            !engine.registry().contains("m.sub"),
            "children compose on first reference, not eagerly"
        );

        assert_eq!(
            engine.lookup("m.sub.VALUE").expect("m.sub.VALUE"),
            Value::Int(2)
        );
        assert!(engine.registry().contains("m.sub"));

        // A sibling present only in the base is reachable unmodified.
        assert_eq!(
            engine.lookup("m.extra.NAME").expect("m.extra.NAME").render(),
            "extra"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn self_references_follow_the_mount() {
        let root = temp_root("self-reference");
        nested_fixture(&root);
        write_unit(
            root.as_path(),
            "base/unit.ov",
            "use base.sub\nfn get() { return sub.VALUE }\n",
        );
        let engine = Engine::new([root.clone()]);

        engine.compose("base", "upper", "m").expect("compose");
        let get = engine.lookup("m.get").expect("m.get");
        assert_eq!(engine.call(&get, vec![]).expect("call"), Value::Int(2));

        // The plain base still sees its own child.
        let plain = Engine::new([root.clone()]);
        let base = plain.load("base").expect("load base");
        let get = base.get("get").expect("get");
        assert_eq!(plain.call(&get, vec![]).expect("call"), Value::Int(1));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_base_leaves_no_record_behind() {
        let root = temp_root("missing");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);

        let err = engine
            .compose("does_not_exist", "upper", "m")
            .expect_err("missing base");
        assert!(matches!(err, ComposeError::UnitNotFound { .. }));
        assert!(!engine.registry().contains("m"));

        // The same mount composes normally afterwards.
        let merged = engine.compose("base", "upper", "m").expect("retry");
        assert_eq!(merged.get("SHARED").expect("SHARED").render(), "upper");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn execution_failures_are_recorded_and_never_rerun() {
        let root = temp_root("failed");
        write_unit(
            root.as_path(),
            "bad.ov",
            "emit(\"bad ran\")\nlet X = 1 / 0\n",
        );
        write_unit(root.as_path(), "upper.ov", "let A = 1\n");
        let engine = Engine::new([root.clone()]);

        let err = engine.compose("bad", "upper", "m").expect_err("must fail");
        assert!(matches!(err, ComposeError::Execution { .. }));
        assert_eq!(engine.emitted().len(), 1);

        let err = engine.compose("bad", "upper", "m").expect_err("replayed");
        assert!(matches!(err, ComposeError::Execution { .. }));
        assert_eq!(
            engine.emitted().len(),
            1,
            "side-effecting unit code must not run twice"
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn remounting_with_a_different_spec_is_rejected() {
        let root = temp_root("conflict");
        wrap_fixture(&root);
        let engine = Engine::new([root.clone()]);
        engine.compose("base", "upper", "m").expect("compose");

        let err = engine
            .compose("base", "someone_else", "m")
            .expect_err("conflict");
        match err {
            ComposeError::MountConflict { mount, .. } => assert_eq!(mount, "m"),
            other => panic!("expected mount conflict, got {:?}", other),
        }

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn a_unit_can_self_register_as_an_overlay() {
        let root = temp_root("overlay-self");
        write_unit(
            root.as_path(),
            "jsonish.ov",
            "fn render(v) { return quote(str(v)) }\nfn quote(s) { return \"\\\"\" + s + \"\\\"\" }\n",
        );
        write_unit(
            root.as_path(),
            "patch.ov",
            "overlay(\"jsonish\")\nfn quote(s) { return \"'\" + s + \"'\" }\n",
        );
        let engine = Engine::new([root.clone()]);

        let merged = engine.load("patch").expect("load patch");
        assert_eq!(merged.origin().base, "jsonish");
        assert_eq!(merged.origin().upper.as_deref(), Some("patch"));

        let render = engine.lookup("patch.render").expect("patch.render");
        let out = engine.call(&render, vec![Value::Int(7)]).expect("call");
        assert_eq!(out.render(), "'7'");

        // The original stays untouched.
        let original = engine.load("jsonish").expect("load jsonish");
        let render = original.get("render").expect("render");
        let out = engine.call(&render, vec![Value::Int(7)]).expect("call");
        assert_eq!(out.render(), "\"7\"");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn overlay_with_an_explicit_mount_composes_eagerly() {
        let root = temp_root("overlay-mount");
        write_unit(
            root.as_path(),
            "jsonish.ov",
            "fn render(v) { return quote(str(v)) }\nfn quote(s) { return \"\\\"\" + s + \"\\\"\" }\n",
        );
        write_unit(
            root.as_path(),
            "patch.ov",
            "overlay(\"jsonish\", \"jsonish_patched\")\nfn quote(s) { return \"'\" + s + \"'\" }\n",
        );
        let engine = Engine::new([root.clone()]);

        engine.load("patch").expect("load patch");
        assert!(engine.registry().contains("jsonish_patched"));

        let render = engine
            .lookup("jsonish_patched.render")
            .expect("patched render");
        let out = engine.call(&render, vec![Value::Int(7)]).expect("call");
        assert_eq!(out.render(), "'7'");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn base_and_override_must_agree_on_unit_kind() {
        let root = temp_root("kind-mismatch");
        write_unit(root.as_path(), "basepkg/unit.ov", "");
        write_unit(root.as_path(), "basepkg/sub.ov", "let V = 1\n");
        write_unit(root.as_path(), "upperleaf.ov", "let V = 2\n");
        let engine = Engine::new([root.clone()]);

        let err = engine
            .compose("basepkg", "upperleaf", "m")
            .expect_err("kind mismatch");
        match err {
            ComposeError::Execution { source, .. } => {
                assert!(source.message.contains("disagree on unit kind"));
            }
            other => panic!("expected execution error, got {:?}", other),
        }

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn third_party_references_resolve_outside_the_mount() {
        let root = temp_root("third-party");
        write_unit(
            root.as_path(),
            "textlib.ov",
            "fn shout(s) { return s + \"!\" }\n",
        );
        write_unit(
            root.as_path(),
            "base.ov",
            "use textlib as t\nfn go(s) { return t.shout(s) }\n",
        );
        write_unit(root.as_path(), "upper.ov", "let MARK = 1\n");
        let engine = Engine::new([root.clone()]);

        engine.compose("base", "upper", "m").expect("compose");
        let go = engine.lookup("m.go").expect("m.go");
        let out = engine
            .call(&go, vec![Value::Str("hi".to_string())])
            .expect("call");
        assert_eq!(out.render(), "hi!");

        // textlib was loaded plainly under its own name, unrewritten.
        assert!(engine.registry().contains("textlib"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn artifact_cache_reproduces_identical_behavior() {
        let root = temp_root("cache-e2e");
        let cache_dir = temp_root("cache-e2e-store");
        wrap_fixture(&root);

        let cold = Engine::new([root.clone()]).with_artifact_cache(cache_dir.clone());
        cold.compose("base", "upper", "m").expect("cold compose");
        let wrap = cold.lookup("m.wrap").expect("m.wrap");
        let cold_out = cold
            .call(&wrap, vec![Value::Str("hello".to_string())])
            .expect("call");

        // A fresh engine over the same cache must behave bit-identically.
        let warm = Engine::new([root.clone()]).with_artifact_cache(cache_dir.clone());
        warm.compose("base", "upper", "m").expect("warm compose");
        let wrap = warm.lookup("m.wrap").expect("m.wrap");
        let warm_out = warm
            .call(&wrap, vec![Value::Str("hello".to_string())])
            .expect("call");
        assert_eq!(cold_out, warm_out);
        assert!(
            fs::read_dir(cache_dir.join("ast")).expect("cache dir").count() > 0,
            "compositions should have populated the cache"
        );

        let _ = fs::remove_dir_all(root);
        let _ = fs::remove_dir_all(cache_dir);
    }

    #[test]
    fn lookups_walk_plain_units_too() {
        let root = temp_root("plain-lookup");
        write_unit(root.as_path(), "pkg/unit.ov", "");
        write_unit(root.as_path(), "pkg/sub.ov", "let VALUE = 5\n");
        let engine = Engine::new([root.clone()]);

        assert_eq!(
            engine.lookup("pkg.sub.VALUE").expect("pkg.sub.VALUE"),
            Value::Int(5)
        );
        // Registered as the degenerate composition of the unit with itself.
        assert!(engine.registry().contains("pkg"));
        assert!(engine.registry().contains("pkg.sub"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn malformed_names_are_rejected_up_front() {
        let engine = Engine::new(Vec::<PathBuf>::new());
        assert!(matches!(
            engine.compose("", "u", "m"),
            Err(ComposeError::InvalidName { .. })
        ));
        assert!(matches!(
            engine.lookup("a..b"),
            Err(ComposeError::InvalidName { .. })
        ));
    }
}
