use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use wheelock_schema::{Marker, PythonConstraint, TagSet};

/// A concrete install target.
///
/// Profiles are TOML files:
///
/// ```toml
/// name = "linux-cp312"
/// python-version = "3.12.1"
/// tags = ["cp312-cp312-manylinux_2_17_x86_64", "cp312-abi3-manylinux_2_17_x86_64", "py3-none-any"]
/// unknown-markers = false
///
/// [markers]
/// 'sys_platform == "linux"' = true
/// 'sys_platform == "win32"' = false
/// ```
///
/// `tags` is ordered most specific first. `markers` is a truth table keyed by
/// marker expression (whitespace-insensitive); expressions missing from it
/// evaluate to `unknown-markers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Environment {
    pub name: String,
    pub python_version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub markers: BTreeMap<String, bool>,
    #[serde(default)]
    pub unknown_markers: bool,
}

impl Environment {
    pub fn from_toml_str(input: &str) -> Result<Self, CoreError> {
        toml::from_str(input).map_err(|e| CoreError::Profile {
            path: "<inline>".to_owned(),
            reason: e.to_string(),
        })
    }

    pub fn read_from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoreError::Profile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Oracle rank for a compatible tag. Higher is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Specificity(pub u32);

/// Answers environment predicates for the resolution engine.
///
/// Implementations must be total and deterministic: the same
/// `(predicate, env)` pair always yields the same answer, and no input
/// makes them fail.
pub trait EnvironmentOracle: Send + Sync {
    fn evaluate_marker(&self, marker: &Marker, env: &Environment) -> bool;

    /// `None` when no tag in `tags` is supported by `env`.
    fn tag_compatible(&self, tags: &TagSet, env: &Environment) -> Option<Specificity>;

    fn python_satisfies(&self, constraint: &PythonConstraint, env: &Environment) -> bool;
}

/// Oracle backed by an [`Environment`] profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileOracle;

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl EnvironmentOracle for ProfileOracle {
    fn evaluate_marker(&self, marker: &Marker, env: &Environment) -> bool {
        let wanted = collapse_whitespace(marker);
        env.markers
            .iter()
            .find(|(expr, _)| collapse_whitespace(expr) == wanted)
            .map_or(env.unknown_markers, |(_, value)| *value)
    }

    fn tag_compatible(&self, tags: &TagSet, env: &Environment) -> Option<Specificity> {
        let supported: Vec<String> = env
            .tags
            .iter()
            .flat_map(|t| TagSet::new(t.as_str()).expand())
            .collect();
        let offered = tags.expand();
        let best = supported
            .iter()
            .position(|tag| offered.iter().any(|o| o == tag))?;
        Some(Specificity((supported.len() - best) as u32))
    }

    fn python_satisfies(&self, constraint: &PythonConstraint, env: &Environment) -> bool {
        crate::python::satisfies(&env.python_version, constraint)
    }
}
