// Purpose: Redirect a unit's self-references to the mount it is being composed under.
// Inputs/Outputs: Maps a parsed unit plus a (from, to) prefix pair to a transformed AST.
// Invariants: The pass is total and order-preserving; unrelated references are untouched.
// Gotchas: Relative paths must be absolutized first or the prefix match misses them.

use crate::error::EvalError;
use crate::frontend::ast::UnitAst;
use crate::mount::locate::UnitKind;

/// Rewrites every `use` path in `ast` so that references into the
/// `from` unit tree land in the `to` tree instead.
///
/// Relative paths (leading dots) are first made absolute against the unit's
/// package: the unit itself for a composite, its parent for a leaf. One dot
/// means the package, each further dot one level up, matching how the units
/// were authored on disk. Code authored against its own name then follows
/// the consumer's mount instead of reaching back to the unmerged original.
pub fn rewrite_unit(
    mut ast: UnitAst,
    unit_name: &str,
    kind: UnitKind,
    from: &str,
    to: &str,
) -> Result<UnitAst, EvalError> {
    let name_segs: Vec<&str> = unit_name.split('.').collect();
    let package: &[&str] = match kind {
        UnitKind::Composite => &name_segs,
        UnitKind::Leaf => &name_segs[..name_segs.len().saturating_sub(1)],
    };
    let from_segs: Vec<&str> = from.split('.').collect();
    let to_segs: Vec<&str> = to.split('.').collect();

    for spec in &mut ast.uses {
        if spec.leading_dots > 0 {
            let levels = spec.leading_dots - 1;
            if levels > package.len() {
                return Err(EvalError::at(
                    format!(
                        "relative reference escapes the unit tree of {}",
                        unit_name
                    ),
                    &spec.span,
                ));
            }
            let mut absolute: Vec<String> = package[..package.len() - levels]
                .iter()
                .map(|s| s.to_string())
                .collect();
            absolute.append(&mut spec.segments);
            if absolute.is_empty() {
                return Err(EvalError::at(
                    "relative reference names no unit",
                    &spec.span,
                ));
            }
            spec.segments = absolute;
            spec.leading_dots = 0;
        }

        let matches_prefix = spec.segments.len() >= from_segs.len()
            && spec
                .segments
                .iter()
                .zip(from_segs.iter())
                .all(|(seg, from_seg)| seg == from_seg);
        if matches_prefix {
            let mut rerooted: Vec<String> = to_segs.iter().map(|s| s.to_string()).collect();
            rerooted.extend(spec.segments.drain(from_segs.len()..));
            spec.segments = rerooted;
        }
    }
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn parse(src: &str) -> UnitAst {
        Parser::new(Lexer::new(src).lex_all())
            .parse_unit()
            .expect("fixture should parse")
    }

    fn paths(ast: &UnitAst) -> Vec<String> {
        ast.uses.iter().map(|u| u.path()).collect()
    }

    #[test]
    fn absolutizes_relative_paths_against_the_package() {
        // Leaf base.mod: `.x` is a sibling inside `base`.
        let ast = parse("use .helpers\n");
        let out = rewrite_unit(ast, "base.tools", UnitKind::Leaf, "base", "m").expect("rewrite");
        assert_eq!(paths(&out), vec!["m.helpers".to_string()]);

        // Composite base: `.x` is its own child, `..x` a sibling of base.
        let ast = parse("use .sub\nuse ..peer\n");
        let out = rewrite_unit(ast, "base", UnitKind::Composite, "base", "m").expect("rewrite");
        assert_eq!(paths(&out), vec!["m.sub".to_string(), "peer".to_string()]);
    }

    #[test]
    fn reroots_absolute_self_references_only() {
        let ast = parse("use base\nuse base.sub.deep\nuse basename\nuse third.party\n");
        let out = rewrite_unit(ast, "base", UnitKind::Composite, "base", "m").expect("rewrite");
        assert_eq!(
            paths(&out),
            vec![
                "m".to_string(),
                "m.sub.deep".to_string(),
                "basename".to_string(),
                "third.party".to_string(),
            ]
        );
    }

    #[test]
    fn identity_rewrite_still_absolutizes() {
        let ast = parse("use .sub\n");
        let out = rewrite_unit(ast, "pkg", UnitKind::Composite, "pkg", "pkg").expect("rewrite");
        assert_eq!(paths(&out), vec!["pkg.sub".to_string()]);
        assert_eq!(out.uses[0].leading_dots, 0);
    }

    #[test]
    fn dotted_prefixes_substitute_per_segment() {
        let ast = parse("use deep.base.sub\n");
        let out = rewrite_unit(
            ast,
            "deep.base",
            UnitKind::Composite,
            "deep.base",
            "mnt",
        )
        .expect("rewrite");
        assert_eq!(paths(&out), vec!["mnt.sub".to_string()]);
    }

    #[test]
    fn escaping_the_tree_is_an_error() {
        let ast = parse("use ...far\n");
        let err = rewrite_unit(ast, "pkg", UnitKind::Composite, "pkg", "m")
            .expect_err("three dots escape a one-level package");
        assert!(err.message.contains("escapes the unit tree"));
        assert!(err.span.is_some());
    }

    #[test]
    fn aliases_survive_rewriting() {
        let ast = parse("use base.sub as s\n");
        let out = rewrite_unit(ast, "base", UnitKind::Composite, "base", "m").expect("rewrite");
        assert_eq!(out.uses[0].binding_name(), "s");
        assert_eq!(out.uses[0].path(), "m.sub");
    }
}
