use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::site_packages::discover_site_packages_dirs;
use ruff_python_stdlib::sys;

/// Packages that are always treated as standard library regardless of where
/// their files resolve to.
const KNOWN_STD_PKGS: &[&str] = &["collections"];

/// Standard-library test for a dotted name: the name itself or its top-level
/// package must be in the stdlib table for the target version.
fn is_stdlib_module(module_name: &str, python_version: u8) -> bool {
    let top_level = module_name.split('.').next().unwrap_or(module_name);
    sys::is_known_standard_library(python_version, module_name)
        || sys::is_known_standard_library(python_version, top_level)
}

/// Classification of an absolute import target relative to a tracked root
/// package. Total: every name maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Equal to or descended from the tracked root package
    Internal,
    /// Standard library; dropped before entering the graph
    Standard,
    /// Everything else
    ThirdParty,
}

/// Resolves dotted module names to source files and classifies import
/// targets.
///
/// Scan roots are the configured `src` directories plus `PYTHONPATH` entries;
/// site-packages directories are kept separately for third-party source
/// lookup under `full_depth`.
#[derive(Debug)]
pub struct ModuleResolver {
    config: Config,
    /// Cache of resolved module paths
    module_cache: RefCell<IndexMap<String, Option<PathBuf>>>,
    /// Set of all first-party modules discovered in scan directories
    first_party_modules: IndexSet<String>,
    /// Site-packages directories for installed third-party sources
    site_packages_dirs: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new(config: Config) -> Result<Self> {
        Self::new_with_overrides(config, None, None)
    }

    /// Create a resolver with PYTHONPATH/VIRTUAL_ENV overrides, avoiding
    /// environment variable pollution in tests.
    pub fn new_with_overrides(
        config: Config,
        pythonpath_override: Option<&str>,
        virtualenv_override: Option<&str>,
    ) -> Result<Self> {
        let site_packages_dirs =
            discover_site_packages_dirs(&config.site_packages, virtualenv_override);
        let mut resolver = Self {
            config,
            module_cache: RefCell::new(IndexMap::new()),
            first_party_modules: IndexSet::new(),
            site_packages_dirs,
        };
        resolver.discover_first_party_modules(pythonpath_override)?;
        Ok(resolver)
    }

    /// All directories to scan for first-party modules (configured src +
    /// PYTHONPATH), deduplicated and canonicalized.
    pub fn scan_directories(&self) -> Vec<PathBuf> {
        self.scan_directories_with_pythonpath(None)
    }

    fn scan_directories_with_pythonpath(&self, pythonpath_override: Option<&str>) -> Vec<PathBuf> {
        let mut unique_dirs = IndexSet::new();

        for dir in &self.config.src {
            if let Ok(canonical) = dir.canonicalize() {
                unique_dirs.insert(canonical);
            } else {
                unique_dirs.insert(dir.clone());
            }
        }

        let pythonpath = pythonpath_override
            .map(str::to_owned)
            .or_else(|| std::env::var("PYTHONPATH").ok());

        if let Some(pythonpath) = pythonpath {
            let separator = if cfg!(windows) { ';' } else { ':' };
            for path_str in pythonpath.split(separator) {
                Self::add_pythonpath_directory(&mut unique_dirs, path_str);
            }
        }

        unique_dirs.into_iter().collect()
    }

    fn add_pythonpath_directory(unique_dirs: &mut IndexSet<PathBuf>, path_str: &str) {
        if path_str.is_empty() {
            return;
        }
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            return;
        }
        if let Ok(canonical) = path.canonicalize() {
            unique_dirs.insert(canonical);
        } else {
            unique_dirs.insert(path);
        }
    }

    fn discover_first_party_modules(&mut self, pythonpath_override: Option<&str>) -> Result<()> {
        let directories_to_scan = self.scan_directories_with_pythonpath(pythonpath_override);

        for src_dir in &directories_to_scan {
            self.scan_directory_for_modules(src_dir)?;
        }

        let known_first_party = self.config.known_first_party.clone();
        self.first_party_modules.extend(known_first_party);

        Ok(())
    }

    fn scan_directory_for_modules(&mut self, src_dir: &Path) -> Result<()> {
        if !src_dir.exists() {
            return Ok(());
        }

        debug!("Scanning source directory: {:?}", src_dir);

        let entries = WalkDir::new(src_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok());

        for entry in entries {
            self.process_directory_entry(src_dir, entry.path());
        }

        Ok(())
    }

    fn process_directory_entry(&mut self, src_dir: &Path, path: &Path) {
        if !is_python_file(path) {
            return;
        }

        if let Some(module_name) = self.path_to_module_name(src_dir, path) {
            crate::debug3!("Found first-party module: {}", module_name);
            self.first_party_modules.insert(module_name.clone());
            self.module_cache
                .borrow_mut()
                .insert(module_name, Some(path.to_path_buf()));
        }
    }

    fn path_to_module_name(&self, src_dir: &Path, file_path: &Path) -> Option<String> {
        crate::util::path_to_module_name(src_dir, file_path)
    }

    /// Classify an absolute import target against the tracked root package.
    ///
    /// First match wins: internal prefix, `_`-private and always-standard
    /// names, the stdlib table for the configured target version, explicitly
    /// configured third-party names, then the third-party default.
    pub fn classify(&self, module_name: &str, tracked_root: &str) -> ImportKind {
        debug_assert!(
            !module_name.starts_with('.'),
            "relative names must be resolved before classification"
        );

        let root = module_name.split('.').next().unwrap_or(module_name);

        if root == tracked_root {
            return ImportKind::Internal;
        }

        if module_name.starts_with('_') || KNOWN_STD_PKGS.contains(&root) {
            return ImportKind::Standard;
        }

        if let Ok(python_version) = self.config.python_version() {
            if is_stdlib_module(module_name, python_version) {
                return ImportKind::Standard;
            }
        }

        if self.config.known_third_party.contains(root) {
            return ImportKind::ThirdParty;
        }

        ImportKind::ThirdParty
    }

    /// Check if a module is first-party (discovered in a scan directory or
    /// configured as known first-party)
    pub fn is_first_party_module(&self, module_name: &str) -> bool {
        if self.first_party_modules.contains(module_name) {
            return true;
        }

        // A package with submodules discovered but no own entry
        let prefix = format!("{}.", module_name);
        if self
            .first_party_modules
            .iter()
            .any(|m| m.starts_with(&prefix))
        {
            return true;
        }

        // A submodule of a discovered module
        let parts: Vec<&str> = module_name.split('.').collect();
        for i in 1..parts.len() {
            let parent_module = parts[..i].join(".");
            if self.first_party_modules.contains(&parent_module) {
                return true;
            }
        }

        false
    }

    /// Resolve a first-party module name to its source file, caching results.
    pub fn resolve_module_path(&self, module_name: &str) -> Option<PathBuf> {
        if let Some(cached_path) = self.module_cache.borrow().get(module_name) {
            return cached_path.clone();
        }

        let resolved = if self.is_first_party_module(module_name) {
            self.scan_directories()
                .iter()
                .find_map(|src_dir| find_module_file(src_dir, module_name))
        } else {
            None
        };

        self.module_cache
            .borrow_mut()
            .insert(module_name.to_owned(), resolved.clone());
        resolved
    }

    /// Resolve an installed third-party module name to its source file in a
    /// site-packages directory. Used when scanning at full depth.
    pub fn resolve_in_site_packages(&self, module_name: &str) -> Option<PathBuf> {
        self.site_packages_dirs
            .iter()
            .find_map(|dir| find_module_file(dir, module_name))
    }

    /// Detect a namespace-package placeholder: the name maps to a directory
    /// on some scan root or site-packages directory, but no module file or
    /// package initialiser exists for it anywhere. Such a name has no file
    /// path to attribute and is treated like a standard-library name.
    pub fn is_namespace_package(&self, module_name: &str) -> bool {
        let relative: PathBuf = module_name.split('.').collect();
        let mut found_dir = false;
        let scan_dirs = self.scan_directories();
        for root in scan_dirs.iter().chain(self.site_packages_dirs.iter()) {
            if find_module_file(root, module_name).is_some() {
                return false;
            }
            if root.join(&relative).is_dir() {
                found_dir = true;
            }
        }
        found_dir
    }

    /// Get all discovered first-party modules
    pub fn first_party_modules(&self) -> &IndexSet<String> {
        &self.first_party_modules
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn is_python_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
}

/// Find the file for a module name under a root directory, trying `name.py`
/// then `name/__init__.py` for the final segment.
fn find_module_file(root_dir: &Path, module_name: &str) -> Option<PathBuf> {
    let parts: Vec<&str> = module_name.split('.').collect();
    let mut file_path = root_dir.to_path_buf();

    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        file_path.push(part);
    }

    let final_part = parts.last()?;

    file_path.push(format!("{}.py", final_part));
    if file_path.is_file() {
        return Some(file_path);
    }

    file_path.pop();
    file_path.push(final_part);
    file_path.push("__init__.py");
    if file_path.is_file() {
        return Some(file_path);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::EnvVarGuard;
    use std::fs;
    use tempfile::TempDir;

    fn resolver_for(temp: &TempDir) -> ModuleResolver {
        let config = Config {
            src: vec![temp.path().to_path_buf()],
            ..Config::default()
        };
        ModuleResolver::new_with_overrides(config, Some(""), Some("")).unwrap()
    }

    #[test]
    fn test_classify_stdlib_and_third_party() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sample_lib")).unwrap();
        fs::write(temp.path().join("sample_lib/__init__.py"), "").unwrap();
        let resolver = resolver_for(&temp);

        assert_eq!(resolver.classify("os", "sample_lib"), ImportKind::Standard);
        assert_eq!(resolver.classify("os.path", "sample_lib"), ImportKind::Standard);
        assert_eq!(
            resolver.classify("collections.abc", "sample_lib"),
            ImportKind::Standard
        );
        assert_eq!(resolver.classify("_thread", "sample_lib"), ImportKind::Standard);
        assert_eq!(
            resolver.classify("sample_lib.submod1", "sample_lib"),
            ImportKind::Internal
        );
        assert_eq!(resolver.classify("alog", "sample_lib"), ImportKind::ThirdParty);
    }

    #[test]
    fn test_resolve_module_path() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("pkg/sub")).unwrap();
        fs::write(temp.path().join("pkg/__init__.py"), "").unwrap();
        fs::write(temp.path().join("pkg/sub/__init__.py"), "").unwrap();
        fs::write(temp.path().join("pkg/sub/mod.py"), "").unwrap();
        let resolver = resolver_for(&temp);

        let resolved = resolver.resolve_module_path("pkg.sub.mod").unwrap();
        assert!(resolved.ends_with("pkg/sub/mod.py"));
        let resolved = resolver.resolve_module_path("pkg.sub").unwrap();
        assert!(resolved.ends_with("pkg/sub/__init__.py"));
        assert!(resolver.resolve_module_path("pkg.missing").is_none());
        assert!(resolver.resolve_module_path("yaml").is_none());
    }

    #[test]
    fn test_namespace_package_detection() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("nspkg")).unwrap();
        fs::write(temp.path().join("nspkg/inner.py"), "").unwrap();
        fs::create_dir_all(temp.path().join("realpkg")).unwrap();
        fs::write(temp.path().join("realpkg/__init__.py"), "").unwrap();
        let resolver = resolver_for(&temp);

        assert!(resolver.is_namespace_package("nspkg"));
        assert!(!resolver.is_namespace_package("realpkg"));
        assert!(!resolver.is_namespace_package("absent"));
    }

    #[test]
    #[serial_test::serial]
    fn test_scan_directories_with_pythonpath() {
        let temp = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        fs::write(extra.path().join("extra_mod.py"), "").unwrap();

        let config = Config {
            src: vec![temp.path().to_path_buf()],
            ..Config::default()
        };
        let _guard = EnvVarGuard::set("PYTHONPATH", extra.path().to_str().unwrap());
        let resolver = ModuleResolver::new(config).unwrap();

        assert!(resolver.is_first_party_module("extra_mod"));
        let dirs = resolver.scan_directories();
        assert!(dirs.contains(&extra.path().canonicalize().unwrap()));
    }
}
