//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so the document format
//! stays readable. Names and extras go through [`normalize_name`] on every
//! construction path, including deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    (@common $name:ident) => {
        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };

    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        string_newtype!(@common $name);

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

/// Same as `string_newtype!`, but every constructor canonicalizes the input.
macro_rules! normalized_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance, canonicalizing the raw spelling.
            pub fn new(raw: impl AsRef<str>) -> Self {
                Self(normalize_name(raw.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        string_newtype!(@common $name);

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::new(raw))
            }
        }
    };
}

/// Canonical spelling of a distribution or extra name.
///
/// Lowercase, with every run of `-`, `_` and `.` collapsed into a single `-`.
/// This is the only normalization rule in the workspace; document parsing and
/// dependency lookups both go through it.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;
    for c in raw.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            in_separator = true;
            continue;
        }
        if in_separator && !out.is_empty() {
            out.push('-');
        }
        in_separator = false;
        out.extend(c.to_lowercase());
    }
    out
}

normalized_newtype!(
    /// Normalized distribution name.
    PackageName
);

normalized_newtype!(
    /// Normalized extra name.
    ExtraName
);

string_newtype!(
    /// Opaque environment marker expression, evaluated by an environment oracle.
    Marker
);

string_newtype!(
    /// Opaque platform compatibility predicate, e.g. `cp312-cp312-manylinux_2_17_x86_64`
    /// or a compressed set such as `py2.py3-none-any`.
    TagSet
);

string_newtype!(
    /// Lowercase hexadecimal digest value.
    HexDigest
);

string_newtype!(
    /// Opaque Python version constraint such as `>=3.8,<4`.
    PythonConstraint
);

string_newtype!(
    /// Package version, pinned by the locker.
    Version
);

impl TagSet {
    /// Expand a compressed tag set into its individual `python-abi-platform` triples.
    ///
    /// Returns an empty list when the value is not a three-part tag.
    pub fn expand(&self) -> Vec<String> {
        let parts: Vec<&str> = self.0.split('-').collect();
        let [pythons, abis, platforms] = parts.as_slice() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for py in pythons.split('.') {
            for abi in abis.split('.') {
                for plat in platforms.split('.') {
                    if py.is_empty() || abi.is_empty() || plat.is_empty() {
                        continue;
                    }
                    out.push(format!("{py}-{abi}-{plat}"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        assert_eq!(normalize_name("Friendly-Bard"), "friendly-bard");
        assert_eq!(normalize_name("FRIENDLY_BARD"), "friendly-bard");
        assert_eq!(normalize_name("friendly.bard"), "friendly-bard");
        assert_eq!(normalize_name("FrIeNdLy-._.-bArD"), "friendly-bard");
        assert_eq!(normalize_name("  attrs "), "attrs");
    }

    #[test]
    fn package_name_normalizes_on_every_path() {
        let a = PackageName::new("Zope.Interface");
        let b: PackageName = "zope_interface".into();
        let c: PackageName = serde_json::from_str("\"ZOPE-interface\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "zope-interface");
    }

    #[test]
    fn extra_name_sorts_by_normalized_form() {
        let mut extras = vec![ExtraName::new("Socks"), ExtraName::new("a_b")];
        extras.sort();
        assert_eq!(extras[0], "a-b");
        assert_eq!(extras[1], "socks");
    }

    #[test]
    fn marker_display_and_serde() {
        let m = Marker::new("sys_platform == \"linux\"");
        assert_eq!(m.to_string(), "sys_platform == \"linux\"");
        let json = serde_json::to_string(&m).unwrap();
        let back: Marker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn tag_set_expands_compressed_sets() {
        let tags = TagSet::new("py2.py3-none-any").expand();
        assert_eq!(tags, vec!["py2-none-any", "py3-none-any"]);

        let tags = TagSet::new("cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64").expand();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&"cp312-cp312-manylinux2014_x86_64".to_owned()));
    }

    #[test]
    fn tag_set_rejects_malformed() {
        assert!(TagSet::new("none-any").expand().is_empty());
        assert!(TagSet::new("").expand().is_empty());
    }
}
