//! Environment filtering of a lock document into a reduced dependency graph.

use crate::oracle::{Environment, EnvironmentOracle};
use crate::CoreError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::{debug, trace};
use wheelock_schema::{DependencySpecifier, LockDocument, PackageFile, PackageId, PackageKey};

/// Which document-level predicate ruled the environment out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    Marker,
    Tag,
    RequiresPython,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MismatchReason::Marker => "marker",
            MismatchReason::Tag => "tag",
            MismatchReason::RequiresPython => "requires-python",
        })
    }
}

/// A package version that survived filtering, with its surviving files in
/// document order. `files` may be empty; the checker reports that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: PackageKey,
    pub files: Vec<PackageFile>,
}

/// A dependency that survived marker evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: PackageKey,
    /// Index into the source node's surviving `files`.
    pub file: usize,
    pub specifier: DependencySpecifier,
    pub to: PackageKey,
}

/// A surviving specifier that names no package in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    /// `None` for a root requirement.
    pub required_by: Option<PackageKey>,
    pub specifier: DependencySpecifier,
}

/// The lock document as seen from one environment. Built fresh per run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    environment: String,
    roots: BTreeSet<PackageKey>,
    nodes: BTreeMap<PackageKey, Node>,
    edges: Vec<Edge>,
    missing: Vec<MissingReference>,
}

impl ResolvedGraph {
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn roots(&self) -> impl Iterator<Item = &PackageKey> {
        self.roots.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, key: &PackageKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_from<'a>(&'a self, key: &'a PackageKey) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.from == key)
    }

    pub fn missing(&self) -> &[MissingReference] {
        &self.missing
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn marker_holds(
    spec: &DependencySpecifier,
    env: &Environment,
    oracle: &dyn EnvironmentOracle,
) -> bool {
    spec.marker()
        .map_or(true, |m| oracle.evaluate_marker(m, env))
}

fn file_survives(file: &PackageFile, env: &Environment, oracle: &dyn EnvironmentOracle) -> bool {
    let Some(tags) = file.tag_set() else {
        trace!("{}: not a wheel filename, dropped", file.filename());
        return false;
    };
    if oracle.tag_compatible(&tags, env).is_none() {
        trace!("{}: tags {tags} incompatible", file.filename());
        return false;
    }
    if let Some(ref rp) = file.requires_python {
        if !oracle.python_satisfies(rp, env) {
            trace!("{}: requires-python {rp} not satisfied", file.filename());
            return false;
        }
    }
    true
}

/// Filter `doc` down to what `env` can see.
///
/// Document-level predicates are checked first and fail the whole build.
/// Then nodes are discovered from the root requirements by worklist
/// traversal: each visited node keeps the files the oracle accepts, and each
/// surviving file's dependencies whose markers hold become edges to every
/// key with the named name and extras. Cycles are fine; every key is
/// visited once.
pub fn build(
    doc: &LockDocument,
    env: &Environment,
    oracle: &dyn EnvironmentOracle,
) -> Result<ResolvedGraph, CoreError> {
    let mismatch = |reason| CoreError::EnvironmentMismatch {
        environment: env.name.clone(),
        reason,
    };
    let meta = &doc.metadata;
    if let Some(ref marker) = meta.marker {
        if !oracle.evaluate_marker(marker, env) {
            return Err(mismatch(MismatchReason::Marker));
        }
    }
    if let Some(ref tags) = meta.tag_set {
        if oracle.tag_compatible(tags, env).is_none() {
            return Err(mismatch(MismatchReason::Tag));
        }
    }
    if let Some(ref rp) = meta.requires_python {
        if !oracle.python_satisfies(rp, env) {
            return Err(mismatch(MismatchReason::RequiresPython));
        }
    }

    let mut graph = ResolvedGraph {
        environment: env.name.clone(),
        ..ResolvedGraph::default()
    };
    let mut queue: VecDeque<PackageKey> = VecDeque::new();
    let mut seen: BTreeSet<PackageKey> = BTreeSet::new();

    for spec in &meta.root_requirements {
        if !marker_holds(spec, env, oracle) {
            debug!("root requirement '{spec}' skipped: marker false");
            continue;
        }
        let id = PackageId::of(spec);
        let targets: Vec<PackageKey> = doc.keys_for(&id).cloned().collect();
        if targets.is_empty() {
            graph.missing.push(MissingReference {
                required_by: None,
                specifier: spec.clone(),
            });
        }
        for key in targets {
            graph.roots.insert(key.clone());
            if seen.insert(key.clone()) {
                queue.push_back(key);
            }
        }
    }

    while let Some(key) = queue.pop_front() {
        let all_files = doc.files(&key).unwrap_or_default();
        let files: Vec<PackageFile> = all_files
            .iter()
            .filter(|f| file_survives(f, env, oracle))
            .cloned()
            .collect();
        trace!("{key}: {} of {} files survive", files.len(), all_files.len());

        for (index, file) in files.iter().enumerate() {
            for spec in &file.depends_on {
                if !marker_holds(spec, env, oracle) {
                    trace!("{key}: dependency '{spec}' skipped: marker false");
                    continue;
                }
                let id = PackageId::of(spec);
                let targets: Vec<PackageKey> = doc.keys_for(&id).cloned().collect();
                if targets.is_empty() {
                    graph.missing.push(MissingReference {
                        required_by: Some(key.clone()),
                        specifier: spec.clone(),
                    });
                    continue;
                }
                for to in targets {
                    if seen.insert(to.clone()) {
                        queue.push_back(to.clone());
                    }
                    graph.edges.push(Edge {
                        from: key.clone(),
                        file: index,
                        specifier: spec.clone(),
                        to,
                    });
                }
            }
        }

        graph.nodes.insert(key.clone(), Node { key, files });
    }

    debug!(
        "graph for '{}': {} nodes, {} edges, {} missing references",
        env.name,
        graph.nodes.len(),
        graph.edges.len(),
        graph.missing.len()
    );
    Ok(graph)
}
