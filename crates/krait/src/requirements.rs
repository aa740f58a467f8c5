//! Requirements partitioning.
//!
//! Aligns discovered per-module closures against a declared requirement list
//! and splits it into a small base set plus named extras groups, so that
//! installing one feature subset pulls only its transitive third-party
//! closure. A synthetic `all` group unions everything.

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::site_packages::{InstalledIndex, discover_site_packages_dirs, normalize_dist_name};
use crate::tracker::{Closure, Submodules, TrackOptions, track};

/// Splits a requirement entry's distribution name from its version
/// constraint or extras marker.
static REQ_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=><!~\[]").expect("valid regex"));

const ALL_GROUP: &str = "all";

/// Policy for optional-only dependencies in extras groups.
#[derive(Debug, Clone, Default)]
pub enum KeepOptional {
    /// Prune optional-only dependencies (default)
    #[default]
    Discard,
    /// Keep every optional dependency
    Keep,
    /// Keep only the named distributions per module
    PerModule(IndexMap<String, IndexSet<String>>),
}

#[derive(Debug, Clone)]
pub struct RequirementsOptions {
    /// Sub-modules to hold as extras. `None` tracks every sub-module of the
    /// library; an empty list produces no extras groups beyond `all`.
    pub extras_modules: Option<Vec<String>>,
    pub keep_optional: KeepOptional,
    /// Scan into third-party dependencies; on by default so the partition
    /// reflects the full installable closure.
    pub full_depth: bool,
}

impl Default for RequirementsOptions {
    fn default() -> Self {
        Self {
            extras_modules: None,
            keep_optional: KeepOptional::Discard,
            full_depth: true,
        }
    }
}

/// Split a declared requirement list into `(base_requirements, extras)`.
///
/// Each requirement entry is a distribution name plus optional version
/// constraint (`"PyYaml >= 6.0"`). The returned extras map holds one group
/// per extras module, keyed by fully-qualified module name, plus the `all`
/// group; every emitted entry is one of the declared strings, verbatim.
pub fn parse_requirements(
    config: &Config,
    requirements: &[String],
    library_name: &str,
    opts: &RequirementsOptions,
    index: Option<&InstalledIndex>,
) -> Result<(Vec<String>, IndexMap<String, Vec<String>>)> {
    let declared = parse_declared(requirements);
    debug!("Declared requirements: {:?}", declared.keys().collect::<Vec<_>>());

    let built_index;
    let index = match index {
        Some(index) => index,
        None if config.site_packages.is_empty() => InstalledIndex::global(),
        None => {
            built_index =
                InstalledIndex::from_dirs(&discover_site_packages_dirs(&config.site_packages, None));
            &built_index
        }
    };

    // Discover closures for the chosen extras modules
    let mut module_dists: IndexMap<String, IndexSet<String>> = IndexMap::new();
    let selection = match &opts.extras_modules {
        None => Some(Submodules::All),
        Some(list) if list.is_empty() => None,
        Some(list) => Some(Submodules::Listed(list.clone())),
    };
    if let Some(submodules) = selection {
        let mut track_opts = TrackOptions::new(library_name);
        track_opts.submodules = submodules;
        track_opts.full_depth = opts.full_depth;
        let tracked = track(config, &track_opts)?;

        let relevant: Vec<String> = match &opts.extras_modules {
            Some(list) => list.clone(),
            None => tracked.closures.keys().cloned().collect(),
        };
        for module in relevant {
            let closure = tracked
                .closures
                .get(&module)
                .expect("selected modules were tracked");
            let dists = closure_distributions(&module, closure, &opts.keep_optional, index);
            module_dists.insert(module, dists);
        }
    }
    module_dists.sort_keys();
    debug!("Per-module distribution sets: {:?}", module_dists);

    // Common requirements are those shared by every tracked module
    let mut common: IndexSet<String> = IndexSet::new();
    for (i, dists) in module_dists.values().enumerate() {
        if i == 0 {
            common = dists.clone();
        } else {
            common.retain(|dist| dists.contains(dist));
        }
    }

    let mut extras: IndexMap<String, IndexSet<String>> = IndexMap::new();
    for (module, dists) in &module_dists {
        let unique: IndexSet<String> = dists.difference(&common).cloned().collect();
        extras.insert(module.clone(), unique);
    }

    // Declared distributions that appear in no closure are likely runtime
    // deps of untracked code; fold them into the base set.
    let mut all_group: IndexSet<String> = common.clone();
    for dists in extras.values() {
        all_group.extend(dists.iter().cloned());
    }
    let missing: Vec<String> = declared
        .keys()
        .filter(|name| !all_group.contains(*name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        debug!("Adding untracked declared requirements to base: {:?}", missing);
    }
    common.extend(missing.iter().cloned());
    all_group.extend(missing);

    // Emit only distributions the library actually declares
    let base = map_requirements(&declared, &common);
    let mut extras_require: IndexMap<String, Vec<String>> = extras
        .into_iter()
        .map(|(module, dists)| (module, map_requirements(&declared, &dists)))
        .collect();
    extras_require.insert(ALL_GROUP.to_owned(), map_requirements(&declared, &all_group));

    Ok((base, extras_require))
}

/// Parse declared entries into `normalized name -> original string`.
fn parse_declared(requirements: &[String]) -> IndexMap<String, String> {
    let mut declared = IndexMap::new();
    for raw in requirements {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let name = REQ_SPLIT.split(line).next().unwrap_or(line).trim();
        declared.insert(normalize_dist_name(name), line.to_owned());
    }
    declared
}

/// The distribution set for one module's closure, honouring the
/// optional-dependency policy and falling back to the import name when the
/// index has no mapping.
fn closure_distributions(
    module: &str,
    closure: &Closure,
    keep_optional: &KeepOptional,
    index: &InstalledIndex,
) -> IndexSet<String> {
    let mut dists = IndexSet::new();
    for (dep_root, info) in &closure.deps {
        let dep_dists: IndexSet<String> = match index.distributions_for(dep_root) {
            Some(found) => found.clone(),
            None => {
                warn!(
                    "Could not find a distribution for import '{}'; using the module name verbatim",
                    dep_root
                );
                [normalize_dist_name(dep_root)].into_iter().collect()
            }
        };

        if info.optional && !keep_dep(keep_optional, module, dep_root, &dep_dists) {
            crate::debug2!("Pruning optional dependency {} of {}", dep_root, module);
            continue;
        }
        dists.extend(dep_dists);
    }
    dists
}

fn keep_dep(
    keep_optional: &KeepOptional,
    module: &str,
    dep_root: &str,
    dep_dists: &IndexSet<String>,
) -> bool {
    match keep_optional {
        KeepOptional::Discard => false,
        KeepOptional::Keep => true,
        KeepOptional::PerModule(per_module) => per_module.get(module).is_some_and(|kept| {
            kept.iter().any(|name| {
                let name = normalize_dist_name(name);
                name == dep_root || dep_dists.contains(&name)
            })
        }),
    }
}

/// Map a distribution set back to the declared requirement strings, sorted.
fn map_requirements(
    declared: &IndexMap<String, String>,
    dists: &IndexSet<String>,
) -> Vec<String> {
    let mut mapped: Vec<String> = dists
        .iter()
        .filter_map(|dist| declared.get(dist))
        .cloned()
        .collect();
    mapped.sort();
    mapped.dedup();
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declared_splits_constraints() {
        let requirements = vec![
            "alchemy-logging>=1.0.3".to_owned(),
            "PyYaml >= 6.0".to_owned(),
            "something-ElSe[extras]~=1.2.3".to_owned(),
            "conditional_deps".to_owned(),
            "# a comment".to_owned(),
            String::new(),
        ];
        let declared = parse_declared(&requirements);
        assert_eq!(
            declared.keys().collect::<Vec<_>>(),
            vec!["alchemy_logging", "pyyaml", "something_else", "conditional_deps"]
        );
        assert_eq!(declared["pyyaml"], "PyYaml >= 6.0");
    }

    #[test]
    fn test_map_requirements_keeps_declared_strings() {
        let declared = parse_declared(&[
            "alchemy-logging>=1.0.3".to_owned(),
            "PyYaml >= 6.0".to_owned(),
        ]);
        let dists: IndexSet<String> = ["pyyaml", "alchemy_logging", "numpy"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(
            map_requirements(&declared, &dists),
            vec!["PyYaml >= 6.0".to_owned(), "alchemy-logging>=1.0.3".to_owned()]
        );
    }

    #[test]
    fn test_keep_dep_per_module() {
        let per_module: IndexMap<String, IndexSet<String>> = [(
            "lib.opt".to_owned(),
            ["alog".to_owned()].into_iter().collect::<IndexSet<_>>(),
        )]
        .into_iter()
        .collect();
        let keep = KeepOptional::PerModule(per_module);
        let dists: IndexSet<String> = ["alchemy_logging".to_owned()].into_iter().collect();

        assert!(keep_dep(&keep, "lib.opt", "alog", &dists));
        assert!(!keep_dep(&keep, "lib.other", "alog", &dists));
        assert!(!keep_dep(&keep, "lib.opt", "yaml", &dists));
        assert!(!keep_dep(&KeepOptional::Discard, "lib.opt", "alog", &dists));
        assert!(keep_dep(&KeepOptional::Keep, "lib.opt", "alog", &dists));
    }
}
