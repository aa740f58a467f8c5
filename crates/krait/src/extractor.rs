//! Static import extraction over a module's parsed form.
//!
//! The extractor recovers every import the *import* of a module triggers:
//! top-level statements plus any compound statement whose suite executes at
//! import time (`if`/`while`/`for`/`with`/`try`). Function and class bodies
//! compile to deferred code objects and are intentionally not entered.
//!
//! An import lexically enclosed by the body suite of a `try` statement is
//! marked *optional*: the enclosing handler would catch the failure at run
//! time. Handler, `else`, and `finally` suites sit outside the guarded
//! region.

use ruff_python_ast::{ExceptHandler, Stmt, StmtImport, StmtImportFrom};
use ruff_text_size::TextSize;
use serde::{Deserialize, Serialize};

use crate::error::TrackError;
use crate::loader::ModuleRecord;
use crate::module_name::ModuleName;
use crate::resolver::{ImportKind, ModuleResolver};
use crate::util::{line_number, line_text};

/// Source location of one import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSite {
    pub filename: String,
    pub lineno: usize,
    pub code_context: String,
}

/// One extracted import: an absolute target name, whether it sits inside a
/// guarded region, and where it was written.
#[derive(Debug, Clone)]
pub struct RawImport {
    pub target: ModuleName,
    pub optional: bool,
    pub site: ImportSite,
}

/// Extract the direct imports of a module in source order.
///
/// Relative targets are resolved to absolute names against the containing
/// module; `from X import name` probes `X.name` as a sub-module first and
/// falls back to `X` when the name is an attribute. Self-imports are dropped
/// (the graph forbids self-loops).
pub fn extract_imports(
    record: &ModuleRecord,
    resolver: &ModuleResolver,
    tracked_root: &str,
) -> Result<Vec<RawImport>, TrackError> {
    use crate::loader::ModuleSource;

    let mut walker = ImportWalker {
        record,
        resolver,
        tracked_root,
        guard_depth: 0,
        imports: Vec::new(),
    };
    walker.walk_suite(&record.ast()?.body)?;
    Ok(walker.imports)
}

struct ImportWalker<'a> {
    record: &'a ModuleRecord,
    resolver: &'a ModuleResolver,
    tracked_root: &'a str,
    /// Number of currently-open guarded regions
    guard_depth: usize,
    imports: Vec<RawImport>,
}

impl ImportWalker<'_> {
    fn walk_suite(&mut self, stmts: &[Stmt]) -> Result<(), TrackError> {
        for stmt in stmts {
            match stmt {
                Stmt::Import(import_stmt) => self.record_import(import_stmt)?,
                Stmt::ImportFrom(import_from) => self.record_import_from(import_from)?,
                Stmt::Try(try_stmt) => {
                    // Only the try suite is guarded; handlers and the
                    // else/finally suites run outside the region.
                    self.guard_depth += 1;
                    self.walk_suite(&try_stmt.body)?;
                    self.guard_depth -= 1;
                    for handler in &try_stmt.handlers {
                        let ExceptHandler::ExceptHandler(handler) = handler;
                        self.walk_suite(&handler.body)?;
                    }
                    self.walk_suite(&try_stmt.orelse)?;
                    self.walk_suite(&try_stmt.finalbody)?;
                }
                Stmt::If(if_stmt) => {
                    self.walk_suite(&if_stmt.body)?;
                    for clause in &if_stmt.elif_else_clauses {
                        self.walk_suite(&clause.body)?;
                    }
                }
                Stmt::While(while_stmt) => {
                    self.walk_suite(&while_stmt.body)?;
                    self.walk_suite(&while_stmt.orelse)?;
                }
                Stmt::For(for_stmt) => {
                    self.walk_suite(&for_stmt.body)?;
                    self.walk_suite(&for_stmt.orelse)?;
                }
                Stmt::With(with_stmt) => {
                    self.walk_suite(&with_stmt.body)?;
                }
                // Deferred code objects: imports inside them happen at call
                // time, not import time.
                Stmt::FunctionDef(_) | Stmt::ClassDef(_) => {}
                _ => {}
            }
        }
        Ok(())
    }

    fn record_import(&mut self, stmt: &StmtImport) -> Result<(), TrackError> {
        for alias in &stmt.names {
            let target = self.absolute_name(alias.name.as_str())?;
            self.emit(target, stmt.range.start());
        }
        Ok(())
    }

    fn record_import_from(&mut self, stmt: &StmtImportFrom) -> Result<(), TrackError> {
        let base = match self.import_from_base(stmt)? {
            Some(base) => base,
            None => return Ok(()),
        };

        for alias in &stmt.names {
            let name = alias.name.as_str();
            let target = if name == "*" {
                base.clone()
            } else {
                self.probe_submodule(&base, name)
            };
            self.emit(target, stmt.range.start());
        }
        Ok(())
    }

    /// The module a `from ... import` statement draws from, as an absolute
    /// name. `None` when the relative dots escape the top-level package.
    fn import_from_base(
        &self,
        stmt: &StmtImportFrom,
    ) -> Result<Option<ModuleName>, TrackError> {
        if stmt.level == 0 {
            let Some(module) = stmt.module.as_ref() else {
                return Err(self.failure("from-import without module or level"));
            };
            return Ok(Some(self.absolute_name(module.as_str())?));
        }

        let Some(anchor) = self
            .record
            .name
            .relative_anchor(self.record.is_package, stmt.level)
        else {
            log::warn!(
                "Relative import in {} escapes its top-level package (level {})",
                self.record.name,
                stmt.level
            );
            return Ok(None);
        };
        Ok(Some(match stmt.module.as_ref() {
            Some(module) => anchor.join(module.as_str()),
            None => anchor,
        }))
    }

    /// Probe whether `base.attr` names a sub-module; fall back to `base` when
    /// the attribute is not backed by a source file of its own.
    fn probe_submodule(&self, base: &ModuleName, attr: &str) -> ModuleName {
        let candidate = base.join(attr);
        let resolved = match self.resolver.classify(candidate.as_str(), self.tracked_root) {
            ImportKind::Internal => self.resolver.resolve_module_path(candidate.as_str()),
            ImportKind::ThirdParty => self.resolver.resolve_in_site_packages(candidate.as_str()),
            ImportKind::Standard => None,
        };
        if resolved.is_some() {
            candidate
        } else {
            base.clone()
        }
    }

    fn absolute_name(&self, name: &str) -> Result<ModuleName, TrackError> {
        ModuleName::new(name).ok_or_else(|| self.failure("malformed import target"))
    }

    fn failure(&self, reason: &str) -> TrackError {
        TrackError::ExtractorFailure {
            module: self.record.name.as_str().to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn emit(&mut self, target: ModuleName, offset: TextSize) {
        if target == self.record.name {
            // An attribute fallback can land on the importer itself
            return;
        }
        let offset = offset.to_usize();
        let site = ImportSite {
            filename: self.record.path.display().to_string(),
            lineno: line_number(&self.record.source, offset),
            code_context: line_text(&self.record.source, offset).to_owned(),
        };
        crate::debug3!(
            "Extracted import {} -> {} (optional: {})",
            self.record.name,
            target,
            self.guard_depth > 0
        );
        self.imports.push(RawImport {
            target,
            optional: self.guard_depth > 0,
            site,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::loader::ModuleRecord;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn empty_resolver() -> ModuleResolver {
        let temp = TempDir::new().unwrap();
        let config = Config {
            src: vec![temp.path().to_path_buf()],
            ..Config::default()
        };
        ModuleResolver::new_with_overrides(config, Some(""), Some("")).unwrap()
    }

    fn extract(name: &str, is_package: bool, source: &str) -> Vec<RawImport> {
        let resolver = empty_resolver();
        let module = ModuleName::new(name).unwrap();
        let root = module.root().to_owned();
        let record = ModuleRecord::parse(
            module,
            PathBuf::from("test_module.py"),
            is_package,
            source.to_owned(),
        )
        .unwrap();
        extract_imports(&record, &resolver, &root).unwrap()
    }

    fn targets(imports: &[RawImport]) -> Vec<&str> {
        imports.iter().map(|imp| imp.target.as_str()).collect()
    }

    #[test]
    fn test_plain_and_dotted_imports() {
        let imports = extract("mod", false, "import os\nimport alog\nimport a.b.c\n");
        assert_eq!(targets(&imports), vec!["os", "alog", "a.b.c"]);
        assert!(imports.iter().all(|imp| !imp.optional));
        assert_eq!(imports[1].site.lineno, 2);
        assert_eq!(imports[1].site.code_context, "import alog");
    }

    #[test]
    fn test_multi_alias_import() {
        let imports = extract("mod", false, "import alog as log, yaml\n");
        assert_eq!(targets(&imports), vec!["alog", "yaml"]);
    }

    #[test]
    fn test_from_import_attribute_fallback() {
        // `AlogFormatterBase` is not a sub-module of alog, so the import
        // resolves to the base package.
        let imports = extract("mod", false, "from alog import AlogFormatterBase, configure\n");
        assert_eq!(targets(&imports), vec!["alog", "alog"]);
    }

    #[test]
    fn test_star_import() {
        let imports = extract("mod", false, "from inter_mod_deps import *\n");
        assert_eq!(targets(&imports), vec!["inter_mod_deps"]);
    }

    #[test]
    fn test_guarded_imports_are_optional() {
        let source = "\
try:
    import alog
except ImportError:
    import json
finally:
    HAVE_ALOG = True
import yaml
";
        let imports = extract("mod", false, source);
        assert_eq!(targets(&imports), vec!["alog", "json", "yaml"]);
        assert!(imports[0].optional);
        // Handler and trailing imports are outside the guarded region
        assert!(!imports[1].optional);
        assert!(!imports[2].optional);
    }

    #[test]
    fn test_nested_try_keeps_guard_open() {
        let source = "\
try:
    if True:
        import alog
except ImportError:
    pass
";
        let imports = extract("mod", false, source);
        assert_eq!(targets(&imports), vec!["alog"]);
        assert!(imports[0].optional);
    }

    #[test]
    fn test_function_and_class_bodies_skipped() {
        let source = "\
import yaml

def helper():
    import json

class Thing:
    import os
";
        let imports = extract("mod", false, source);
        assert_eq!(targets(&imports), vec!["yaml"]);
    }

    #[test]
    fn test_relative_import_in_package() {
        // In a package initialiser a single dot anchors at the package
        // itself: with no sibling source file on disk the probe falls back to
        // the anchor, which here is the importer and is dropped. Two dots
        // anchor at the parent package.
        let imports = extract("pkg.sub", true, "from . import sibling\nfrom .. import other\n");
        assert_eq!(targets(&imports), vec!["pkg"]);
    }

    #[test]
    fn test_relative_import_in_plain_module() {
        let imports = extract("pkg.mod", false, "from .helpers import thing\n");
        assert_eq!(targets(&imports), vec!["pkg.helpers"]);
    }

    #[test]
    fn test_relative_import_escaping_root_is_dropped() {
        let imports = extract("pkg", true, "from .. import nothing\n");
        assert!(imports.is_empty());
    }

    #[test]
    fn test_from_probe_finds_internal_submodule() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("pkg")).unwrap();
        fs::write(temp.path().join("pkg/__init__.py"), "").unwrap();
        fs::write(temp.path().join("pkg/sub.py"), "").unwrap();
        let config = Config {
            src: vec![temp.path().to_path_buf()],
            ..Config::default()
        };
        let resolver = ModuleResolver::new_with_overrides(config, Some(""), Some("")).unwrap();

        let record = ModuleRecord::parse(
            ModuleName::new("pkg").unwrap(),
            temp.path().join("pkg/__init__.py"),
            true,
            "from . import sub, CONSTANT\n".to_owned(),
        )
        .unwrap();
        let imports = extract_imports(&record, &resolver, "pkg").unwrap();

        // `sub` resolves to a sub-module; `CONSTANT` falls back to the
        // package, which is the importer itself and is dropped.
        assert_eq!(targets(&imports), vec!["pkg.sub"]);
    }
}
