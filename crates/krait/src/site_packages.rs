//! Discovery of installed distributions.
//!
//! Maps importable top-level module names back to the distributions that ship
//! them by scanning site-packages directories for `*.dist-info` metadata
//! installed by the standard packaging tool. The requirements partitioner
//! uses this to translate discovered import roots into declared requirement
//! names.

use indexmap::{IndexMap, IndexSet};
use log::debug;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

/// Normalise a distribution name for comparison: lower-case, with hyphens and
/// underscores interchangeable (underscore is the canonical form here).
pub fn normalize_dist_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Return the site-packages directories to scan: explicitly configured
/// directories first, then the active `VIRTUAL_ENV`, then common venv
/// directory names under the current working directory.
pub fn discover_site_packages_dirs(
    explicit: &[PathBuf],
    virtualenv_override: Option<&str>,
) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = explicit
        .iter()
        .filter(|p| p.is_dir())
        .cloned()
        .collect();

    let explicit_virtualenv = virtualenv_override
        .map(str::to_owned)
        .or_else(|| std::env::var("VIRTUAL_ENV").ok());

    let venv_roots = if let Some(venv) = explicit_virtualenv {
        vec![PathBuf::from(venv)]
    } else {
        detect_fallback_virtualenv_paths()
    };

    for venv_root in venv_roots {
        dirs.extend(site_packages_in_venv(&venv_root));
    }

    dirs
}

/// Detect common virtual environment directory names in the current working
/// directory.
fn detect_fallback_virtualenv_paths() -> Vec<PathBuf> {
    let Ok(current_dir) = std::env::current_dir() else {
        return Vec::new();
    };
    let common_venv_names = [".venv", "venv", "env", ".virtualenv", "virtualenv"];
    common_venv_names
        .iter()
        .map(|name| current_dir.join(name))
        .filter(|candidate| !site_packages_in_venv(candidate).is_empty())
        .collect()
}

fn site_packages_in_venv(venv_root: &Path) -> Vec<PathBuf> {
    if !venv_root.is_dir() {
        return Vec::new();
    }

    if cfg!(windows) {
        let site_packages = venv_root.join("Lib").join("site-packages");
        if site_packages.is_dir() {
            return vec![site_packages];
        }
        return Vec::new();
    }

    // Unix layout: <venv>/lib/pythonX.Y/site-packages
    let lib_dir = venv_root.join("lib");
    let Ok(entries) = fs::read_dir(&lib_dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str())?;
            if !path.is_dir() || !name.starts_with("python") {
                return None;
            }
            let site_packages = path.join("site-packages");
            site_packages.is_dir().then_some(site_packages)
        })
        .collect()
}

/// Read-only index from importable module root to the distributions that
/// install it.
#[derive(Debug, Default)]
pub struct InstalledIndex {
    module_to_dists: IndexMap<String, IndexSet<String>>,
}

impl InstalledIndex {
    /// Build an index by scanning the given site-packages directories.
    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        let mut index = Self::default();
        for dir in dirs {
            index.scan_site_packages(dir);
        }
        index
    }

    /// The process-wide index over the ambient environment, constructed once
    /// behind a write-once guard.
    pub fn global() -> &'static Self {
        static INDEX: OnceCell<InstalledIndex> = OnceCell::new();
        INDEX.get_or_init(|| Self::from_dirs(&discover_site_packages_dirs(&[], None)))
    }

    /// Distributions that install the given top-level module, normalised.
    pub fn distributions_for(&self, module_root: &str) -> Option<&IndexSet<String>> {
        self.module_to_dists.get(module_root)
    }

    fn scan_site_packages(&mut self, site_packages_dir: &Path) {
        let Ok(entries) = fs::read_dir(site_packages_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() && name.ends_with(".dist-info") {
                self.scan_dist_info(&path, name);
            }
        }
    }

    fn scan_dist_info(&mut self, dist_info: &Path, dir_name: &str) {
        let dist_name = read_metadata_name(dist_info)
            .or_else(|| {
                // Fall back to the directory name: <name>-<version>.dist-info
                dir_name
                    .strip_suffix(".dist-info")
                    .and_then(|stem| stem.split('-').next())
                    .map(str::to_owned)
            })
            .map(|name| normalize_dist_name(&name));

        let Some(dist_name) = dist_name else {
            return;
        };

        let top_levels = read_top_levels(dist_info);
        if top_levels.is_empty() {
            debug!(
                "No importable top-level modules found for distribution {}",
                dist_name
            );
            return;
        }
        for module_root in top_levels {
            self.module_to_dists
                .entry(module_root)
                .or_default()
                .insert(dist_name.clone());
        }
    }
}

fn read_metadata_name(dist_info: &Path) -> Option<String> {
    let metadata = fs::read_to_string(dist_info.join("METADATA")).ok()?;
    metadata.lines().find_map(|line| {
        line.strip_prefix("Name:")
            .map(|name| name.trim().to_owned())
    })
}

/// Importable top-level module names for a distribution, from `top_level.txt`
/// when present, otherwise recovered from the `RECORD` file list.
fn read_top_levels(dist_info: &Path) -> IndexSet<String> {
    if let Ok(content) = fs::read_to_string(dist_info.join("top_level.txt")) {
        let names: IndexSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    let mut names = IndexSet::new();
    let Ok(record) = fs::read_to_string(dist_info.join("RECORD")) else {
        return names;
    };
    for line in record.lines() {
        // RECORD rows are `path,hash,size`
        let Some(path) = line.split(',').next() else {
            continue;
        };
        if path.starts_with("..") || path.contains(".dist-info") || path.contains(".data/") {
            continue;
        }
        let root = path.split('/').next().unwrap_or(path);
        if let Some(stem) = root.strip_suffix(".py") {
            names.insert(stem.to_owned());
        } else if !root.contains('.') {
            names.insert(root.to_owned());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_dist_info(
        site_packages: &Path,
        dir_name: &str,
        metadata_name: &str,
        top_levels: &[&str],
    ) {
        let dist_info = site_packages.join(dir_name);
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(
            dist_info.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {}\nVersion: 1.0\n", metadata_name),
        )
        .unwrap();
        fs::write(dist_info.join("top_level.txt"), top_levels.join("\n")).unwrap();
    }

    #[test]
    fn test_normalize_dist_name() {
        assert_eq!(normalize_dist_name("PyYAML"), "pyyaml");
        assert_eq!(normalize_dist_name("alchemy-logging"), "alchemy_logging");
        assert_eq!(normalize_dist_name("import_tracker"), "import_tracker");
    }

    #[test]
    fn test_index_from_top_level_txt() {
        let temp = TempDir::new().unwrap();
        write_dist_info(
            temp.path(),
            "alchemy_logging-1.3.2.dist-info",
            "alchemy-logging",
            &["alog"],
        );
        write_dist_info(temp.path(), "PyYAML-6.0.dist-info", "PyYAML", &["yaml", "_yaml"]);

        let index = InstalledIndex::from_dirs(&[temp.path().to_path_buf()]);
        assert_eq!(
            index.distributions_for("alog").unwrap().iter().collect::<Vec<_>>(),
            vec!["alchemy_logging"]
        );
        assert!(index.distributions_for("yaml").unwrap().contains("pyyaml"));
        assert!(index.distributions_for("missing").is_none());
    }

    #[test]
    fn test_index_from_record() {
        let temp = TempDir::new().unwrap();
        let dist_info = temp.path().join("demo_pkg-0.1.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("METADATA"), "Name: demo-pkg\n").unwrap();
        fs::write(
            dist_info.join("RECORD"),
            "demo/__init__.py,sha256=abc,10\n\
             demo/core.py,sha256=def,20\n\
             demo_single.py,sha256=ghi,5\n\
             demo_pkg-0.1.dist-info/METADATA,sha256=jkl,30\n",
        )
        .unwrap();

        let index = InstalledIndex::from_dirs(&[temp.path().to_path_buf()]);
        assert!(index.distributions_for("demo").unwrap().contains("demo_pkg"));
        assert!(index.distributions_for("demo_single").unwrap().contains("demo_pkg"));
        assert!(index.distributions_for("demo_pkg-0.1.dist-info").is_none());
    }
}
