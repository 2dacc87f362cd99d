//! Dependency-first install ordering.

use crate::graph::ResolvedGraph;
use crate::CoreError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use wheelock_schema::{ExtraName, PackageFile, PackageId, PackageKey, PackageName, Version};

/// One distribution to place. Keys of the same distribution that differ
/// only in extras share a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallStep {
    pub name: PackageName,
    pub version: Version,
    pub extras: Vec<ExtraName>,
    #[serde(skip)]
    pub keys: Vec<PackageKey>,
    #[serde(rename = "file", serialize_with = "serialize_filename")]
    pub file: PackageFile,
}

fn serialize_filename<S: serde::Serializer>(
    file: &PackageFile,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(file.filename())
}

/// Ordered install sequence. Every step comes after the steps it depends
/// on, except inside a mutual-dependency cycle, whose members appear
/// together in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

/// Order the resolved packages for application.
///
/// Dependencies are the edges leaving each package's *selected* file. The
/// order is a topological sort of the strongly connected components of the
/// distribution-level graph; among components that are ready at the same
/// time, the one with the smallest name goes first.
pub fn plan(
    graph: &ResolvedGraph,
    resolved: &BTreeMap<PackageId, PackageKey>,
    selected: &BTreeMap<PackageKey, PackageFile>,
) -> Result<InstallPlan, CoreError> {
    let mut by_name: BTreeMap<&PackageName, Vec<&PackageKey>> = BTreeMap::new();
    for key in resolved.values() {
        if !selected.contains_key(key) {
            return Err(CoreError::MissingSelection(key.to_string()));
        }
        by_name.entry(&key.name).or_default().push(key);
    }

    let mut deps: BTreeMap<&PackageName, BTreeSet<&PackageName>> = BTreeMap::new();
    for (name, keys) in &by_name {
        let entry = deps.entry(*name).or_default();
        for key in keys {
            let (Some(node), Some(chosen)) = (graph.node(key), selected.get(*key)) else {
                continue;
            };
            for edge in graph.edges_from(key) {
                if node.files.get(edge.file) != Some(chosen) {
                    continue;
                }
                if edge.to.name != **name && by_name.contains_key(&edge.to.name) {
                    entry.insert(&edge.to.name);
                }
            }
        }
    }

    let order = component_order(&deps);
    let mut steps = Vec::with_capacity(order.len());
    for name in order {
        let keys: Vec<PackageKey> = by_name[name].iter().map(|k| (*k).clone()).collect();
        let mut extras: Vec<ExtraName> = keys.iter().flat_map(|k| k.extras.clone()).collect();
        extras.sort();
        extras.dedup();
        // Keys are sorted, so the key without extras (if any) provides the file.
        let first = &keys[0];
        let file = selected[first].clone();
        steps.push(InstallStep {
            name: first.name.clone(),
            version: first.version.clone(),
            extras,
            keys,
            file,
        });
    }
    Ok(InstallPlan { steps })
}

fn component_order<'a>(
    deps: &BTreeMap<&'a PackageName, BTreeSet<&'a PackageName>>,
) -> Vec<&'a PackageName> {
    let mut graph: DiGraph<&PackageName, ()> = DiGraph::new();
    let index: BTreeMap<&PackageName, NodeIndex> =
        deps.keys().map(|&n| (n, graph.add_node(n))).collect();
    for (n, targets) in deps {
        for t in targets {
            graph.add_edge(index[n], index[t], ());
        }
    }

    // Each component is identified by its smallest member.
    let mut component_of: BTreeMap<&PackageName, &PackageName> = BTreeMap::new();
    let mut members: BTreeMap<&PackageName, Vec<&PackageName>> = BTreeMap::new();
    for scc in tarjan_scc(&graph) {
        let mut names: Vec<&PackageName> = scc.iter().map(|&i| graph[i]).collect();
        names.sort();
        let Some(&id) = names.first() else {
            continue;
        };
        for &n in &names {
            component_of.insert(n, id);
        }
        members.insert(id, names);
    }

    let mut waiting_on: BTreeMap<&PackageName, BTreeSet<&PackageName>> = BTreeMap::new();
    for (n, targets) in deps {
        let c = component_of[n];
        let entry = waiting_on.entry(c).or_default();
        for t in targets {
            let tc = component_of[t];
            if tc != c {
                entry.insert(tc);
            }
        }
    }

    let mut order = Vec::with_capacity(deps.len());
    let mut ready: BTreeSet<&PackageName> = waiting_on
        .iter()
        .filter(|(_, w)| w.is_empty())
        .map(|(c, _)| *c)
        .collect();
    let mut done: BTreeSet<&PackageName> = BTreeSet::new();
    while let Some(c) = ready.pop_first() {
        done.insert(c);
        order.extend(members[c].iter().copied());
        for (other, waits) in &mut waiting_on {
            if done.contains(other) || ready.contains(other) {
                continue;
            }
            waits.remove(c);
            if waits.is_empty() {
                ready.insert(*other);
            }
        }
    }
    order
}
