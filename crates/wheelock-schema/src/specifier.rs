use crate::types::{ExtraName, Marker, PackageName};
use crate::SchemaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A dependency reference: `name[extra,...] constraint ; marker`.
///
/// Only the parts the engine needs are split out. The version constraint is
/// carried verbatim: the locker has already resolved it, so the engine never
/// evaluates it. The marker is opaque and goes to an environment oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencySpecifier {
    raw: String,
    name: PackageName,
    extras: Vec<ExtraName>,
    constraint: Option<String>,
    marker: Option<Marker>,
}

impl DependencySpecifier {
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidSpecifier {
            specifier: input.to_owned(),
            reason: reason.to_owned(),
        };

        let raw = input.trim();
        let (requirement, marker) = match raw.split_once(';') {
            Some((req, m)) => {
                let m = m.trim();
                if m.is_empty() {
                    return Err(invalid("empty marker after ';'"));
                }
                (req.trim(), Some(Marker::new(m)))
            }
            None => (raw, None),
        };

        let name_end = requirement
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(requirement.len());
        let name = &requirement[..name_end];
        if name.is_empty() {
            return Err(invalid("missing package name"));
        }

        let mut rest = requirement[name_end..].trim_start();
        let mut extras = Vec::new();
        if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket
                .find(']')
                .ok_or_else(|| invalid("unterminated extras list"))?;
            for extra in after_bracket[..close].split(',') {
                let extra = extra.trim();
                if extra.is_empty() {
                    continue;
                }
                extras.push(ExtraName::new(extra));
            }
            rest = after_bracket[close + 1..].trim_start();
        }
        extras.sort();
        extras.dedup();

        let constraint = if rest.is_empty() {
            None
        } else {
            Some(rest.to_owned())
        };

        Ok(Self {
            raw: raw.to_owned(),
            name: PackageName::new(name),
            extras,
            constraint,
            marker,
        })
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// Sorted, deduplicated extras.
    pub fn extras(&self) -> &[ExtraName] {
        &self.extras
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    /// The specifier exactly as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DependencySpecifier {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DependencySpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for DependencySpecifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
