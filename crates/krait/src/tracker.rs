//! Dependency discovery over one target module.
//!
//! Drives the loader and extractor from a root name to a frozen import
//! graph, then flattens per-module third-party closures with witness paths,
//! direct/transitive classification, optionality, and parent-direct-dep
//! attribution.

use anyhow::Result;
use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use crate::config::Config;
use crate::error::TrackError;
use crate::extractor::{ImportSite, extract_imports};
use crate::krait_graph::{DepGraph, EdgeData, ModuleNode, NodeKind};
use crate::loader::{ModuleHandle, ModuleLoader, ModuleSource};
use crate::module_name::ModuleName;
use crate::resolver::{ImportKind, ModuleResolver};

/// Which modules to report closures for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Submodules {
    /// Only the named target
    #[default]
    Target,
    /// The target plus every internal sub-module discovered beneath it
    All,
    /// The target plus the listed sub-modules (which must have been scanned)
    Listed(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct TrackOptions {
    /// Target module name; may be relative when `package_name` is given
    pub module_name: String,
    /// Parent package for a relative `module_name`
    pub package_name: Option<String>,
    pub submodules: Submodules,
    /// Include witness paths in the rendered output
    pub track_import_stack: bool,
    /// Annotate each dependency as direct or transitive
    pub detect_transitive: bool,
    /// Annotate each dependency's optional status
    pub show_optional: bool,
    /// Scan into third-party dependencies as well
    pub full_depth: bool,
    /// Graft direct third-party deps of ancestor packages into each
    /// sub-module's closure. Disabling keeps such deps with the parent only.
    pub augment_parents: bool,
}

impl TrackOptions {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            package_name: None,
            submodules: Submodules::Target,
            track_import_stack: false,
            detect_transitive: false,
            show_optional: false,
            full_depth: false,
            augment_parents: true,
        }
    }
}

/// One path of modules explaining why a third-party root is required: the
/// queried module first, ending at the module whose import introduces the
/// dependency. A grafted parent-direct dep leads with the augmenting parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub modules: Vec<String>,
    /// Import sites along the path; the last frame is the site introducing
    /// the dependency
    pub frames: Vec<ImportSite>,
    /// True when at least one link on this path is guarded
    pub optional: bool,
}

/// Aggregated closure entry for one third-party root package.
#[derive(Debug, Clone)]
pub struct DepInfo {
    /// At least one witness of length one (the query imports it itself)
    pub direct: bool,
    /// Every witness crosses at least one optional link
    pub optional: bool,
    pub witnesses: Vec<Witness>,
}

/// Third-party closure of one queried module, keyed by third-party root.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    pub deps: BTreeMap<String, DepInfo>,
}

impl Closure {
    /// Dependency roots in lexical order.
    pub fn dep_names(&self) -> Vec<&str> {
        self.deps.keys().map(String::as_str).collect()
    }
}

/// The result of one discovery run: closures for every queried module.
#[derive(Debug)]
pub struct TrackedModules {
    /// Fully-qualified name of the queried target
    pub target: String,
    pub closures: BTreeMap<String, Closure>,
}

/// Run discovery for the configured target and return raw closures.
pub fn track(config: &Config, opts: &TrackOptions) -> Result<TrackedModules> {
    let resolver = ModuleResolver::new(config.clone())?;

    let target = ModuleName::resolve_relative(&opts.module_name, opts.package_name.as_deref())
        .ok_or_else(|| TrackError::UnknownTargetModule(opts.module_name.clone()))?;
    log::debug!("Tracking {} (full_depth: {})", target, opts.full_depth);

    let graph = build_graph(&resolver, &target, opts.full_depth)?;
    crate::debug2!("Graph holds {} modules", graph.module_count());
    if graph.has_cycles() {
        crate::debug1!("Import cycles present; traversal prunes revisited modules");
    }

    let output_modules = select_output_modules(&graph, &target, &opts.submodules)?;
    crate::debug2!("Output modules: {:?}", output_modules);

    let tracker = DepTracker::new(graph, target.root(), opts.augment_parents);
    let mut closures = BTreeMap::new();
    for module in output_modules {
        let closure = tracker.closure(&module)?;
        closures.insert(module, closure);
    }

    Ok(TrackedModules {
        target: target.as_str().to_owned(),
        closures,
    })
}

/// Build the import graph reachable from the target (§4.4 work-set).
fn build_graph(
    resolver: &ModuleResolver,
    target: &ModuleName,
    full_depth: bool,
) -> Result<DepGraph, TrackError> {
    let tracked_root = target.root().to_owned();
    let loader = ModuleLoader::new(resolver);
    let mut graph = DepGraph::new();
    let mut to_check: VecDeque<ModuleName> = VecDeque::new();
    let mut seen: IndexSet<String> = IndexSet::new();

    // Importing the target first imports every ancestor package, so they are
    // part of the scan even when nothing imports them explicitly.
    for ancestor in target.ancestors() {
        seen.insert(ancestor.as_str().to_owned());
        to_check.push_back(ancestor);
    }
    if seen.insert(target.as_str().to_owned()) {
        to_check.push_back(target.clone());
    }

    while let Some(name) = to_check.pop_front() {
        let kind = resolver.classify(name.as_str(), &tracked_root);
        let node_kind = match kind {
            ImportKind::Internal => NodeKind::Internal,
            ImportKind::ThirdParty => NodeKind::ThirdParty,
            ImportKind::Standard => continue,
        };

        let handle = loader.load(&name, &tracked_root)?;
        let record = match handle {
            ModuleHandle::Missing(missing) => {
                if name == *target {
                    return Err(TrackError::UnknownTargetModule(name.as_str().to_owned()));
                }
                // No source to follow: keep the node so edges to it survive,
                // either an absent optional dependency or a namespace-package
                // placeholder.
                crate::debug2!("No source for {}; recording as leaf", name);
                graph.add_module(ModuleNode {
                    name: missing.name().clone(),
                    path: None,
                    is_package: false,
                    kind: node_kind,
                });
                continue;
            }
            ModuleHandle::Loaded(record) => record,
        };

        graph.add_module(ModuleNode {
            name: record.name.clone(),
            path: Some(record.path.clone()),
            is_package: record.is_package,
            kind: node_kind,
        });

        let imports = extract_imports(&record, resolver, &tracked_root)?;
        for imp in imports {
            let imp_kind = resolver.classify(imp.target.as_str(), &tracked_root);
            let imp_node_kind = match imp_kind {
                ImportKind::Standard => continue,
                ImportKind::Internal => NodeKind::Internal,
                ImportKind::ThirdParty => NodeKind::ThirdParty,
            };

            // A namespace-package placeholder has no file path to attribute;
            // drop it the way standard-library names are dropped.
            if imp_kind == ImportKind::ThirdParty
                && resolver.is_namespace_package(imp.target.as_str())
            {
                crate::debug2!("Dropping namespace-package placeholder {}", imp.target);
                continue;
            }

            graph.add_module(ModuleNode {
                name: imp.target.clone(),
                path: None,
                is_package: false,
                kind: imp_node_kind,
            });
            graph.add_import(
                record.name.as_str(),
                imp.target.as_str(),
                imp.optional,
                imp.site,
            );

            let follow = imp_kind == ImportKind::Internal || full_depth;
            if !follow {
                continue;
            }
            // Also scan every intermediate ancestor so parent-direct-dep
            // attribution has the data it needs.
            for ancestor in imp.target.ancestors() {
                if seen.insert(ancestor.as_str().to_owned()) {
                    to_check.push_back(ancestor);
                }
            }
            if seen.insert(imp.target.as_str().to_owned()) {
                to_check.push_back(imp.target);
            }
        }
    }

    Ok(graph)
}

/// Modules the caller wants closures for, sorted lexically.
fn select_output_modules(
    graph: &DepGraph,
    target: &ModuleName,
    submodules: &Submodules,
) -> Result<Vec<String>, TrackError> {
    let mut output: Vec<String> = vec![target.as_str().to_owned()];
    match submodules {
        Submodules::Target => {}
        Submodules::All => {
            for node in graph.internal_modules() {
                if node.path.is_some() && target.is_ancestor_of(&node.name) {
                    output.push(node.name.as_str().to_owned());
                }
            }
        }
        Submodules::Listed(names) => {
            for name in names {
                if !graph.contains(name) {
                    return Err(TrackError::UntrackedQuery(name.clone()));
                }
                output.push(name.clone());
            }
        }
    }
    output.sort();
    output.dedup();
    Ok(output)
}

/// Flattener over a frozen graph; closures are derived views cached per
/// query.
#[derive(Debug)]
pub struct DepTracker {
    graph: DepGraph,
    tracked_root: String,
    augment_parents: bool,
    closure_cache: RefCell<FxHashMap<String, Closure>>,
}

/// Breadth-first traversal state: one candidate path from the query.
#[derive(Debug, Clone)]
struct PathState {
    path: Vec<String>,
    frames: Vec<ImportSite>,
    optional: bool,
}

impl DepTracker {
    pub fn new(graph: DepGraph, tracked_root: &str, augment_parents: bool) -> Self {
        Self {
            graph,
            tracked_root: tracked_root.to_owned(),
            augment_parents,
            closure_cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    /// The third-party closure of one scanned module.
    pub fn closure(&self, module_name: &str) -> Result<Closure, TrackError> {
        if let Some(cached) = self.closure_cache.borrow().get(module_name) {
            return Ok(cached.clone());
        }
        if !self.graph.contains(module_name) {
            return Err(TrackError::UntrackedQuery(module_name.to_owned()));
        }

        let closure = self.compute_closure(module_name);
        self.closure_cache
            .borrow_mut()
            .insert(module_name.to_owned(), closure.clone());
        Ok(closure)
    }

    fn compute_closure(&self, module_name: &str) -> Closure {
        let mut witnesses: BTreeMap<String, Vec<Witness>> = BTreeMap::new();
        let mut expanded: FxHashSet<String> = FxHashSet::default();
        let mut queue: VecDeque<PathState> = VecDeque::new();

        expanded.insert(module_name.to_owned());
        queue.push_back(PathState {
            path: vec![module_name.to_owned()],
            frames: Vec::new(),
            optional: false,
        });

        while let Some(state) = queue.pop_front() {
            let current = state.path.last().expect("paths are never empty").clone();

            for (node, edge) in self.graph.edges_from(&current) {
                match node.kind {
                    NodeKind::ThirdParty => {
                        self.record_witnesses(&mut witnesses, &state, node, edge, None);
                        // At full depth the third-party module itself may have
                        // been scanned; walk through it for its own deps.
                        self.enqueue(&mut queue, &mut expanded, &state, node, edge);
                    }
                    NodeKind::Internal => {
                        self.enqueue(&mut queue, &mut expanded, &state, node, edge);
                    }
                }
            }

            if self.augment_parents {
                self.augment_from_parents(&mut witnesses, &state, &current);
            }
        }

        let mut closure = Closure::default();
        for (dep_root, mut dep_witnesses) in witnesses {
            dep_witnesses.sort_by(|a, b| a.modules.cmp(&b.modules));
            dep_witnesses.dedup();
            let direct = dep_witnesses.iter().any(|w| w.modules.len() == 1);
            let optional = dep_witnesses.iter().all(|w| w.optional);
            closure.deps.insert(
                dep_root,
                DepInfo {
                    direct,
                    optional,
                    witnesses: dep_witnesses,
                },
            );
        }
        closure
    }

    /// Graft direct third-party deps of every strict ancestor of `current`
    /// into the closure: importing `current` transitively imports each
    /// ancestor package. The grafted dependency stays optional only when the
    /// parent's edge and every existing edge from `current` agree.
    fn augment_from_parents(
        &self,
        witnesses: &mut BTreeMap<String, Vec<Witness>>,
        state: &PathState,
        current: &str,
    ) {
        let Some(current_name) = ModuleName::new(current) else {
            return;
        };
        let current_root = current_name.root().to_owned();
        for parent in current_name.ancestors() {
            let parent_name = parent.as_str();
            if !self.graph.contains(parent_name) {
                continue;
            }
            // A parent already on the path contributes its direct deps
            // through the ordinary traversal; grafting again would only
            // duplicate the witness with the parent repeated.
            if state.path.iter().any(|module| module == parent_name) {
                continue;
            }
            for (dep_node, parent_edge) in self.graph.third_party_edges_from(parent_name) {
                if dep_node.name.root() == current_root {
                    continue;
                }
                let child_optional = self
                    .direct_edge_optional(current, dep_node.name.as_str())
                    .unwrap_or(true);
                let augmented = AugmentedFrom {
                    parent: parent_name,
                    child_optional,
                };
                self.record_witnesses(witnesses, state, dep_node, parent_edge, Some(augmented));
            }
        }
    }

    fn direct_edge_optional(&self, from: &str, to: &str) -> Option<bool> {
        self.graph
            .edges_from(from)
            .into_iter()
            .find(|(node, _)| node.name.as_str() == to)
            .map(|(_, edge)| edge.is_optional())
    }

    /// Record one witness per recorded import site of the introducing edge,
    /// so that duplicate imports of the same target keep distinct provenance.
    fn record_witnesses(
        &self,
        witnesses: &mut BTreeMap<String, Vec<Witness>>,
        state: &PathState,
        dep_node: &ModuleNode,
        edge: &EdgeData,
        augmented: Option<AugmentedFrom<'_>>,
    ) {
        let dep_root = dep_node.name.root().to_owned();
        if dep_root == self.tracked_root {
            return;
        }

        let mut modules = truncate_at_root(&state.path, &dep_root);
        if let Some(augmented) = &augmented {
            modules.insert(0, augmented.parent.to_owned());
        }

        for (site, site_optional) in edge.sites() {
            let link_optional = match &augmented {
                // The graft stays optional only if every source agrees
                Some(augmented) => site_optional && augmented.child_optional,
                None => site_optional,
            };
            let mut frames = state.frames.clone();
            frames.push(site.clone());
            witnesses.entry(dep_root.clone()).or_default().push(Witness {
                modules: modules.clone(),
                frames,
                optional: state.optional || link_optional,
            });
        }
    }

    fn enqueue(
        &self,
        queue: &mut VecDeque<PathState>,
        expanded: &mut FxHashSet<String>,
        state: &PathState,
        node: &ModuleNode,
        edge: &EdgeData,
    ) {
        let name = node.name.as_str();
        if state.path.iter().any(|m| m == name) {
            return;
        }
        if !expanded.insert(name.to_owned()) {
            return;
        }
        let mut path = state.path.clone();
        path.push(name.to_owned());
        let mut frames = state.frames.clone();
        if let Some(site) = edge.first_site() {
            frames.push(site.clone());
        }
        queue.push_back(PathState {
            path,
            frames,
            optional: state.optional || edge.is_optional(),
        });
    }
}

struct AugmentedFrom<'a> {
    parent: &'a str,
    child_optional: bool,
}

/// Trim a witness path before the first module that belongs to the
/// dependency's own root package (full-depth paths can run through it).
fn truncate_at_root(path: &[String], dep_root: &str) -> Vec<String> {
    let cut = path
        .iter()
        .position(|module| module.split('.').next() == Some(dep_root))
        .unwrap_or(path.len());
    path[..cut].to_vec()
}
