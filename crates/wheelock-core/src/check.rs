//! Single-version / at-least-one-file proof over a [`ResolvedGraph`].

use crate::graph::ResolvedGraph;
use crate::CoreError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use wheelock_schema::{PackageId, PackageKey, PackageName, Version};

/// A fatal reason the graph does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Finding {
    /// More than one version of one package is reachable. Reported per
    /// name+extras group, and for the bare name when different extras
    /// groups disagree on the version.
    AmbiguousVersion {
        package: PackageId,
        versions: Vec<Version>,
    },
    /// The only reachable version has no file this environment can install.
    UnresolvablePackage { package: PackageId, version: Version },
    /// A surviving requirement names a package the document does not contain.
    MissingPackage {
        package: PackageId,
        required_by: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::AmbiguousVersion { package, versions } => {
                let versions: Vec<&str> = versions.iter().map(Version::as_str).collect();
                write!(
                    f,
                    "{package}: ambiguous version, reachable as {}",
                    versions.join(", ")
                )
            }
            Finding::UnresolvablePackage { package, version } => {
                write!(f, "{package}=={version}: no installable file for this environment")
            }
            Finding::MissingPackage {
                package,
                required_by,
            } => write!(f, "{package}: required by {required_by} but not in the lock document"),
        }
    }
}

/// Outcome of [`check`]: either one key per reachable name+extras, or every
/// finding that prevents that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub environment: String,
    /// Populated only when `findings` is empty.
    #[serde(serialize_with = "serialize_keys")]
    pub resolved: BTreeMap<PackageId, PackageKey>,
    pub findings: Vec<Finding>,
}

fn serialize_keys<S: serde::Serializer>(
    resolved: &BTreeMap<PackageId, PackageKey>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(resolved.values())
}

impl ResolutionReport {
    pub fn is_resolved(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn into_resolved(self) -> Result<BTreeMap<PackageId, PackageKey>, CoreError> {
        if self.findings.is_empty() {
            Ok(self.resolved)
        } else {
            Err(CoreError::Resolution(self.findings))
        }
    }
}

/// Prove that `graph` yields exactly one version per reachable package, each
/// with at least one surviving file.
///
/// All findings are collected rather than stopping at the first, so a
/// locker sees every problem with a document at once.
pub fn check(graph: &ResolvedGraph) -> ResolutionReport {
    let mut reachable: BTreeSet<&PackageKey> = BTreeSet::new();
    let mut queue: VecDeque<&PackageKey> = graph.roots().collect();
    while let Some(key) = queue.pop_front() {
        if !reachable.insert(key) {
            continue;
        }
        for edge in graph.edges_from(key) {
            if !reachable.contains(&edge.to) {
                queue.push_back(&edge.to);
            }
        }
    }

    let mut groups: BTreeMap<PackageId, Vec<&PackageKey>> = BTreeMap::new();
    for &key in &reachable {
        groups.entry(key.id()).or_default().push(key);
    }

    let mut findings = Vec::new();
    let mut resolved = BTreeMap::new();
    let mut versions_by_name: BTreeMap<&PackageName, BTreeSet<&Version>> = BTreeMap::new();
    let mut ambiguous_names: BTreeSet<&PackageName> = BTreeSet::new();

    for (id, keys) in &groups {
        for key in keys {
            versions_by_name
                .entry(&key.name)
                .or_default()
                .insert(&key.version);
        }
        if keys.len() > 1 {
            ambiguous_names.insert(&keys[0].name);
            findings.push(Finding::AmbiguousVersion {
                package: id.clone(),
                versions: keys.iter().map(|k| k.version.clone()).collect(),
            });
            continue;
        }
        let key = keys[0];
        let installable = graph.node(key).is_some_and(|n| !n.files.is_empty());
        if installable {
            resolved.insert(id.clone(), key.clone());
        } else {
            findings.push(Finding::UnresolvablePackage {
                package: id.clone(),
                version: key.version.clone(),
            });
        }
    }

    for (name, versions) in versions_by_name {
        if versions.len() > 1 && !ambiguous_names.contains(&name) {
            findings.push(Finding::AmbiguousVersion {
                package: PackageId::new(name.clone(), Vec::new()),
                versions: versions.into_iter().cloned().collect(),
            });
        }
    }

    for missing in graph.missing() {
        let required_by = missing
            .required_by
            .as_ref()
            .map_or_else(|| "root requirements".to_owned(), ToString::to_string);
        let is_reachable = missing.required_by.as_ref().map_or(true, |k| reachable.contains(k));
        if is_reachable {
            findings.push(Finding::MissingPackage {
                package: PackageId::of(&missing.specifier),
                required_by,
            });
        }
    }

    findings.sort();
    findings.dedup();
    if !findings.is_empty() {
        resolved.clear();
    }
    ResolutionReport {
        environment: graph.environment().to_owned(),
        resolved,
        findings,
    }
}
