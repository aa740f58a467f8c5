use std::fmt;

use serde::{Deserialize, Serialize};

/// A fully-qualified, dotted Python module name (e.g. `sample_lib.nested.submod3`).
///
/// Equality and ordering are purely lexical. Relative names (leading dots) are
/// resolved into absolute names before they are allowed to enter the graph; see
/// [`ModuleName::resolve_relative`] and [`ModuleName::relative_anchor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Create a module name from an absolute dotted path.
    ///
    /// Returns `None` for the empty string, names with leading/trailing dots, or
    /// names with empty segments (`a..b`).
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// First dotted segment; for `a.b.c` this is `a`.
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// The enclosing package, or `None` for a top-level name.
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('.').map(|(head, _)| Self(head.to_owned()))
    }

    /// All strict ancestors, shortest first: for `a.b.c` yields `a`, `a.b`.
    pub fn ancestors(&self) -> Vec<Self> {
        let parts: Vec<&str> = self.parts().collect();
        (1..parts.len())
            .map(|i| Self(parts[..i].join(".")))
            .collect()
    }

    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    pub fn is_descendant_of(&self, other: &Self) -> bool {
        other.is_ancestor_of(self)
    }

    /// Append a dotted suffix: `a.b` joined with `c.d` is `a.b.c.d`.
    pub fn join(&self, suffix: &str) -> Self {
        Self(format!("{}.{}", self.0, suffix))
    }

    /// Compute the package a relative import anchors to.
    ///
    /// `dots` is the relative-import level (`from .. import x` has two dots).
    /// A module defined by a package initialiser file is itself the anchor for a
    /// single dot, so only `dots - 1` trailing segments are stripped; a plain
    /// module strips `dots` segments. Returns `None` when the dots escape past
    /// the top-level package.
    pub fn relative_anchor(&self, is_package: bool, dots: u32) -> Option<Self> {
        debug_assert!(dots >= 1);
        let strip = if is_package { dots - 1 } else { dots } as usize;
        let parts: Vec<&str> = self.parts().collect();
        if strip >= parts.len() {
            return None;
        }
        Some(Self(parts[..parts.len() - strip].join(".")))
    }

    /// Resolve a possibly-relative name against a parent package, mirroring the
    /// import system's resolution of `import_module(".sub", package="pkg")`.
    pub fn resolve_relative(name: &str, package: Option<&str>) -> Option<Self> {
        let dots = name.chars().take_while(|&c| c == '.').count();
        if dots == 0 {
            return Self::new(name);
        }
        let package = Self::new(package?)?;
        let anchor = package.relative_anchor(true, dots as u32)?;
        let rest = &name[dots..];
        if rest.is_empty() {
            Some(anchor)
        } else {
            Some(anchor.join(rest))
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_and_root() {
        let name = ModuleName::new("a.b.c").unwrap();
        assert_eq!(name.root(), "a");
        assert_eq!(name.parts().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!(ModuleName::new("").is_none());
        assert!(ModuleName::new(".relative").is_none());
        assert!(ModuleName::new("a..b").is_none());
        assert!(ModuleName::new("trailing.").is_none());
    }

    #[test]
    fn test_parent_and_ancestors() {
        let name = ModuleName::new("a.b.c").unwrap();
        assert_eq!(name.parent(), ModuleName::new("a.b"));
        assert_eq!(
            name.ancestors(),
            vec![ModuleName::new("a").unwrap(), ModuleName::new("a.b").unwrap()]
        );
        assert!(ModuleName::new("a").unwrap().ancestors().is_empty());
    }

    #[test]
    fn test_is_ancestor_of() {
        let pkg = ModuleName::new("pkg").unwrap();
        let sub = ModuleName::new("pkg.sub").unwrap();
        let other = ModuleName::new("pkg_other").unwrap();
        assert!(pkg.is_ancestor_of(&sub));
        assert!(!pkg.is_ancestor_of(&other));
        assert!(!pkg.is_ancestor_of(&pkg));
        assert!(sub.is_descendant_of(&pkg));
    }

    #[test]
    fn test_relative_anchor_package() {
        // A package initialiser anchors a single dot at itself.
        let pkg = ModuleName::new("inter_mod_deps.submod2").unwrap();
        assert_eq!(
            pkg.relative_anchor(true, 1),
            ModuleName::new("inter_mod_deps.submod2")
        );
        assert_eq!(pkg.relative_anchor(true, 2), ModuleName::new("inter_mod_deps"));
        assert_eq!(pkg.relative_anchor(true, 3), None);
    }

    #[test]
    fn test_relative_anchor_plain_module() {
        let module = ModuleName::new("optional_deps.opt").unwrap();
        assert_eq!(module.relative_anchor(false, 1), ModuleName::new("optional_deps"));
        assert_eq!(module.relative_anchor(false, 2), None);
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            ModuleName::resolve_relative(".submod1", Some("sample_lib")),
            ModuleName::new("sample_lib.submod1")
        );
        assert_eq!(
            ModuleName::resolve_relative("..other", Some("a.b")),
            ModuleName::new("a.other")
        );
        assert_eq!(
            ModuleName::resolve_relative("plain.name", None),
            ModuleName::new("plain.name")
        );
        assert_eq!(ModuleName::resolve_relative(".sub", None), None);
    }
}
