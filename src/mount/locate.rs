// Purpose: Resolve dotted unit names to on-disk sources across ordered search roots.
// Inputs/Outputs: Produces read-only CodeUnit descriptions with nested-name listings.
// Invariants: Resolution precedence (first root wins, directory over file) stays stable.
// Gotchas: Nested names are enumerated without locating them; children load lazily.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ComposeError;
use crate::frontend::suggest::{best_name_match, help_did_you_mean};

pub const UNIT_EXT: &str = "ov";
pub const UNIT_FILE: &str = "unit.ov";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitKind {
    Leaf,
    Composite,
}

/// Located source form of a unit. Read-only once produced.
#[derive(Clone, Debug)]
pub struct CodeUnit {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    pub kind: UnitKind,
    /// Directly nested unit names, sorted. Empty for leaves.
    pub nested: Vec<String>,
}

pub struct Locator {
    roots: Vec<PathBuf>,
}

impl Locator {
    /// Search roots are the given paths followed by any listed in the
    /// `OVERMOUNT_PATH` environment variable.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut all: Vec<PathBuf> = roots.into_iter().collect();
        if let Ok(extra) = std::env::var("OVERMOUNT_PATH") {
            for part in extra.split(':') {
                if !part.is_empty() {
                    all.push(PathBuf::from(part));
                }
            }
        }
        Self { roots: all }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn locate(&self, name: &str) -> Result<CodeUnit, ComposeError> {
        validate_unit_name(name)?;
        let segments: Vec<&str> = name.split('.').collect();
        for root in &self.roots {
            let mut dir = root.clone();
            for seg in &segments {
                dir.push(seg);
            }
            let unit_file = dir.join(UNIT_FILE);
            if unit_file.is_file() {
                let source = read_text(&unit_file)?;
                let nested = list_nested(&dir)?;
                return Ok(CodeUnit {
                    name: name.to_string(),
                    path: unit_file,
                    source,
                    kind: UnitKind::Composite,
                    nested,
                });
            }
            let leaf = dir.with_extension(UNIT_EXT);
            if leaf.is_file() {
                let source = read_text(&leaf)?;
                return Ok(CodeUnit {
                    name: name.to_string(),
                    path: leaf,
                    source,
                    kind: UnitKind::Leaf,
                    nested: Vec::new(),
                });
            }
        }
        Err(self.err_not_found(name, &segments))
    }

    fn err_not_found(&self, name: &str, segments: &[&str]) -> ComposeError {
        let leaf = segments.last().copied().unwrap_or(name);
        let mut candidates = BTreeSet::new();
        for root in &self.roots {
            let mut parent = root.clone();
            for seg in &segments[..segments.len().saturating_sub(1)] {
                parent.push(seg);
            }
            if let Ok(listed) = list_nested(&parent) {
                candidates.extend(listed);
            }
        }
        let candidates: Vec<String> = candidates.into_iter().collect();
        let help = best_name_match(leaf, &candidates).map(|best| {
            let suggested = match name.rfind('.') {
                Some(i) => format!("{}.{}", &name[..i], best),
                None => best.to_string(),
            };
            format!("\n{}", help_did_you_mean(&suggested))
        });
        ComposeError::UnitNotFound {
            name: name.to_string(),
            help,
        }
    }
}

pub(crate) fn validate_unit_name(name: &str) -> Result<(), ComposeError> {
    if name.is_empty() {
        return Err(ComposeError::InvalidName {
            name: name.to_string(),
        });
    }
    for seg in name.split('.') {
        let mut chars = seg.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ComposeError::InvalidName {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn read_text(p: &Path) -> Result<String, ComposeError> {
    fs::read_to_string(p).map_err(|e| ComposeError::Io {
        path: p.display().to_string(),
        message: e.to_string(),
    })
}

/// Directly nested unit names under a composite unit's directory:
/// `*.ov` files (except the unit body itself) and subdirectories carrying a
/// unit body. A directory takes precedence over a file of the same name.
fn list_nested(dir: &Path) -> Result<Vec<String>, ComposeError> {
    let mut out = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| ComposeError::Io {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    for ent in entries {
        let ent = ent.map_err(|e| ComposeError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let p = ent.path();
        if p.is_dir() {
            if p.join(UNIT_FILE).is_file()
                && let Some(name) = p.file_name().and_then(|s| s.to_str())
            {
                out.insert(name.to_string());
            }
            continue;
        }
        if p.extension().and_then(|s| s.to_str()) == Some(UNIT_EXT)
            && let Some(stem) = p.file_stem().and_then(|s| s.to_str())
            && stem != "unit"
        {
            out.insert(stem.to_string());
        }
    }
    Ok(out.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
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

    #[test]
    fn locates_leaf_and_composite_units() {
        let root = temp_root("locate-basic");
        fs::write(root.join("alpha.ov"), "let A = 1\n").expect("write leaf");
        fs::create_dir_all(root.join("pkg").join("inner")).expect("mkdir");
        fs::write(root.join("pkg").join("unit.ov"), "").expect("write body");
        fs::write(root.join("pkg").join("sub.ov"), "let V = 1\n").expect("write sub");
        fs::write(root.join("pkg").join("inner").join("unit.ov"), "").expect("write inner");

        let loc = Locator::new([root.clone()]);
        let leaf = loc.locate("alpha").expect("leaf");
        assert_eq!(leaf.kind, UnitKind::Leaf);
        assert!(leaf.nested.is_empty());

        let pkg = loc.locate("pkg").expect("composite");
        assert_eq!(pkg.kind, UnitKind::Composite);
        assert_eq!(pkg.nested, vec!["inner".to_string(), "sub".to_string()]);

        let sub = loc.locate("pkg.sub").expect("nested leaf");
        assert_eq!(sub.kind, UnitKind::Leaf);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn directory_units_take_precedence_over_files() {
        let root = temp_root("locate-precedence");
        fs::create_dir_all(root.join("dual")).expect("mkdir");
        fs::write(root.join("dual.ov"), "let FROM_FILE = 1\n").expect("write file");
        fs::write(root.join("dual").join("unit.ov"), "let FROM_DIR = 1\n").expect("write dir");

        let loc = Locator::new([root.clone()]);
        let unit = loc.locate("dual").expect("unit");
        assert_eq!(unit.kind, UnitKind::Composite);
        assert!(unit.source.contains("FROM_DIR"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn first_root_wins() {
        let first = temp_root("locate-first");
        let second = temp_root("locate-second");
        fs::write(first.join("same.ov"), "let WHICH = 1\n").expect("write first");
        fs::write(second.join("same.ov"), "let WHICH = 2\n").expect("write second");

        let loc = Locator::new([first.clone(), second.clone()]);
        let unit = loc.locate("same").expect("unit");
        assert!(unit.path.starts_with(&first));

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }

    #[test]
    fn missing_unit_suggests_a_near_name() {
        let root = temp_root("locate-suggest");
        fs::write(root.join("layout.ov"), "").expect("write");

        let loc = Locator::new([root.clone()]);
        let err = loc.locate("layuot").expect_err("should not resolve");
        let text = err.to_string();
        assert!(text.contains("unit not found: layuot"), "got: {}", text);
        assert!(text.contains("did you mean \"layout\""), "got: {}", text);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn rejects_malformed_names() {
        let loc = Locator::new(Vec::<PathBuf>::new());
        for bad in ["", ".", "a..b", "a/b", "1abc", "a.b-c"] {
            let err = loc.locate(bad).expect_err("should reject");
            assert!(
                matches!(err, ComposeError::InvalidName { .. }),
                "{:?} for {:?}",
                err,
                bad
            );
        }
    }
}
