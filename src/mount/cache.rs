// Purpose: Optional on-disk cache of rewritten unit ASTs keyed by content fingerprint.
// Inputs/Outputs: Persists and loads serialized transformed sources under a cache root.
// Invariants: Purely additive; a miss (or any cache failure) reproduces the exact
//             behavior of a hit by re-parsing and re-rewriting the source.
// Gotchas: Entries publish via temp-file rename so a torn write can never be read back.

use anyhow::Context;
use directories::ProjectDirs;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::frontend::ast::UnitAst;

/// Bumped whenever the AST serialization changes shape.
const FORMAT_VERSION: u32 = 1;

pub fn cache_root() -> anyhow::Result<PathBuf> {
    if let Ok(p) = std::env::var("OVERMOUNT_CACHE_DIR") {
        return Ok(PathBuf::from(p));
    }
    let pd = ProjectDirs::from("dev", "overmount", "overmount")
        .context("cannot determine OS cache directory")?;
    Ok(pd.cache_dir().to_path_buf())
}

pub fn ensure_dir(p: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(p)?;
    Ok(())
}

pub fn source_fingerprint(source: &str) -> String {
    let mut h = Sha256::new();
    h.update(source.as_bytes());
    hex::encode(h.finalize())
}

pub struct CacheLock {
    _file: File,
}

impl CacheLock {
    pub fn acquire(root: &Path) -> anyhow::Result<Self> {
        ensure_dir(root)?;
        let lock_path = root.join("cache.lock");
        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        f.lock_exclusive()?;
        Ok(Self { _file: f })
    }
}

pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn at_default_root() -> anyhow::Result<Self> {
        Ok(Self::new(cache_root()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, unit: &str, source: &str, from: &str, to: &str) -> PathBuf {
        let mut h = Sha256::new();
        h.update(FORMAT_VERSION.to_le_bytes());
        h.update(b"\0");
        h.update(unit.as_bytes());
        h.update(b"\0");
        h.update(source_fingerprint(source).as_bytes());
        h.update(b"\0");
        h.update(from.as_bytes());
        h.update(b"\0");
        h.update(to.as_bytes());
        let key = hex::encode(h.finalize());
        self.root.join("ast").join(format!("{}.json", key))
    }

    /// Returns the cached transformed AST for this exact (unit, source,
    /// rewrite pair), or None. Corrupt or unreadable entries are misses.
    pub fn load(&self, unit: &str, source: &str, from: &str, to: &str) -> Option<UnitAst> {
        let path = self.entry_path(unit, source, from, to);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                debug!(unit, "artifact cache miss");
                return None;
            }
        };
        match serde_json::from_str::<UnitAst>(&text) {
            Ok(ast) => {
                debug!(unit, "artifact cache hit");
                Some(ast)
            }
            Err(e) => {
                debug!(unit, error = %e, "discarding corrupt artifact cache entry");
                None
            }
        }
    }

    /// Best effort: a failed store only costs the next run a re-parse.
    pub fn store(&self, unit: &str, source: &str, from: &str, to: &str, ast: &UnitAst) {
        if let Err(e) = self.try_store(unit, source, from, to, ast) {
            debug!(unit, error = %e, "artifact cache store failed");
        }
    }

    fn try_store(
        &self,
        unit: &str,
        source: &str,
        from: &str,
        to: &str,
        ast: &UnitAst,
    ) -> anyhow::Result<()> {
        let _guard = CacheLock::acquire(&self.root)?;
        let path = self.entry_path(unit, source, from, to);
        let dir = path.parent().context("entry path has no parent")?;
        ensure_dir(dir)?;
        let payload = serde_json::to_string(ast)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename {}", path.display()))?;
        Ok(())
    }
}
