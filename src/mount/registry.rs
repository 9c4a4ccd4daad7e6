// Purpose: Process-wide mount table guaranteeing at-most-once composition per mount.
// Inputs/Outputs: Maps mount names to records that settle into a merged unit or an error.
// Invariants: Exactly one thread transitions a record out of Pending; specs never change
//             after publication; resolution failures leave no record behind.
// Gotchas: Waiters hold the record Arc, so a removed record still resolves for them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{ComposeError, EvalError};
use crate::eval::value::{Namespace, Value};
use crate::mount::locate::UnitKind;

/// What a mount is made of. Immutable once its record is published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountSpec {
    pub mount: String,
    pub base: String,
    pub upper: Option<String>,
}

impl MountSpec {
    pub fn new(
        base: impl Into<String>,
        upper: impl Into<String>,
        mount: impl Into<String>,
    ) -> Self {
        Self {
            mount: mount.into(),
            base: base.into(),
            upper: Some(upper.into()),
        }
    }

    /// A unit loaded under its own name with no override.
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            mount: name.clone(),
            base: name,
            upper: None,
        }
    }

    pub fn describe(&self) -> String {
        match &self.upper {
            Some(upper) => format!("base {} upper {}", self.base, upper),
            None => format!("base {}", self.base),
        }
    }
}

/// The externally visible artifact of a composition. Consumers read symbols
/// off its shared namespace; the engine stops mutating the namespace once
/// the unit is published.
pub struct MergedUnit {
    name: String,
    kind: UnitKind,
    nested: Vec<String>,
    namespace: Arc<Namespace>,
    origin: MountSpec,
}

impl MergedUnit {
    pub(crate) fn new(
        name: String,
        kind: UnitKind,
        nested: Vec<String>,
        namespace: Arc<Namespace>,
        origin: MountSpec,
    ) -> Self {
        Self {
            name,
            kind,
            nested,
            namespace,
            origin,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Nested unit names visible under this mount: the union of the base's
    /// and the override's children.
    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub fn origin(&self) -> &MountSpec {
        &self.origin
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.namespace.get(name)
    }
}

impl fmt::Debug for MergedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedUnit")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nested", &self.nested)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

enum MountState {
    Pending { owner: ThreadId },
    Ready(Arc<MergedUnit>),
    Failed(ComposeError),
}

struct RecordInner {
    spec: MountSpec,
    state: MountState,
}

pub struct MountRecord {
    inner: Mutex<RecordInner>,
    resolved: Condvar,
}

/// Injectable mount table. Empty at construction, append-only per mount,
/// no eviction; records live as long as the registry.
pub struct Registry {
    records: Mutex<HashMap<String, Arc<MountRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, mount: &str) -> bool {
        self.records
            .lock()
            .expect("registry lock poisoned")
            .contains_key(mount)
    }

    pub(crate) fn record(&self, mount: &str) -> Option<Arc<MountRecord>> {
        self.records
            .lock()
            .expect("registry lock poisoned")
            .get(mount)
            .cloned()
    }

    /// Longest registered dotted prefix of `segments`, if any.
    pub(crate) fn longest_registered_prefix(&self, segments: &[&str]) -> Option<String> {
        let map = self.records.lock().expect("registry lock poisoned");
        for take in (1..=segments.len()).rev() {
            let candidate = segments[..take].join(".");
            if map.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Single-flight composition. The first requester for a mount becomes
    /// the winner and runs `run`; everyone else blocks on the record until
    /// it settles, then shares the identical result or error.
    ///
    /// `relaxed` callers (plain loads, `use` resolution) accept whatever
    /// spec the mount was registered with; strict callers get a
    /// `MountConflict` when their spec differs from the existing record's.
    ///
    /// `run` returns the merged unit together with the final spec, which may
    /// differ from the requested one when the unit self-registered an
    /// overlay while executing.
    pub(crate) fn compose_with<F>(
        &self,
        spec: MountSpec,
        relaxed: bool,
        run: F,
    ) -> Result<Arc<MergedUnit>, ComposeError>
    where
        F: FnOnce() -> Result<(Arc<MergedUnit>, MountSpec), ComposeError>,
    {
        let me = thread::current().id();
        let (record, winner) = {
            let mut map = self.records.lock().expect("registry lock poisoned");
            if let Some(existing) = map.get(&spec.mount) {
                if !relaxed {
                    let inner = existing.inner.lock().expect("record lock poisoned");
                    if inner.spec != spec {
                        return Err(ComposeError::MountConflict {
                            mount: spec.mount.clone(),
                            existing: inner.spec.describe(),
                            requested: spec.describe(),
                        });
                    }
                }
                (existing.clone(), false)
            } else {
                let record = Arc::new(MountRecord {
                    inner: Mutex::new(RecordInner {
                        spec: spec.clone(),
                        state: MountState::Pending { owner: me },
                    }),
                    resolved: Condvar::new(),
                });
                map.insert(spec.mount.clone(), record.clone());
                (record, true)
            }
        };

        if !winner {
            debug!(mount = %spec.mount, "awaiting in-flight composition");
            return self.await_record(&record, me);
        }

        debug!(mount = %spec.mount, spec = %spec.describe(), "composing");
        match run() {
            Ok((unit, final_spec)) => {
                {
                    let mut inner = record.inner.lock().expect("record lock poisoned");
                    inner.spec = final_spec;
                    inner.state = MountState::Ready(unit.clone());
                }
                record.resolved.notify_all();
                Ok(unit)
            }
            Err(err) => {
                {
                    let mut inner = record.inner.lock().expect("record lock poisoned");
                    inner.state = MountState::Failed(err.clone());
                }
                record.resolved.notify_all();
                if err.is_resolution() {
                    // No record survives a resolution failure; a corrected
                    // request composes fresh.
                    self.records
                        .lock()
                        .expect("registry lock poisoned")
                        .remove(&spec.mount);
                }
                Err(err)
            }
        }
    }

    /// True when `record` is pending and owned by `me` — the caller has
    /// reached back into a composition it is itself running.
    pub(crate) fn pending_owned_by(&self, record: &Arc<MountRecord>, me: ThreadId) -> bool {
        let inner = record.inner.lock().expect("record lock poisoned");
        matches!(inner.state, MountState::Pending { owner } if owner == me)
    }

    /// Blocks until `record` settles. A thread finding its own pending
    /// record has followed a reference cycle back into itself.
    pub(crate) fn await_record(
        &self,
        record: &Arc<MountRecord>,
        me: ThreadId,
    ) -> Result<Arc<MergedUnit>, ComposeError> {
        let mut inner = record.inner.lock().expect("record lock poisoned");
        loop {
            match &inner.state {
                MountState::Pending { owner } if *owner == me => {
                    let mount = inner.spec.mount.clone();
                    return Err(ComposeError::execution(
                        mount.clone(),
                        EvalError::new(
                            format!("circular reference while composing {}", mount),
                            None,
                        ),
                    ));
                }
                MountState::Pending { .. } => {
                    inner = record
                        .resolved
                        .wait(inner)
                        .expect("record lock poisoned");
                }
                MountState::Ready(unit) => return Ok(unit.clone()),
                MountState::Failed(err) => return Err(err.clone()),
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
