use crate::diagnostics::Diagnostic;
use crate::SchemaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// `major.minor` version of the lock document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    /// The newest format this engine reads and the one it emits.
    pub const CURRENT: FormatVersion = FormatVersion { major: 1, minor: 0 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Gate a parsed version against [`FormatVersion::CURRENT`].
    ///
    /// A different major is fatal. A newer minor is accepted with a warning;
    /// an older minor of the same major is always readable.
    pub fn check_supported(self) -> Result<Option<Diagnostic>, SchemaError> {
        if self.major != Self::CURRENT.major {
            return Err(SchemaError::UnsupportedMajorVersion {
                found: self,
                supported: Self::CURRENT,
            });
        }
        if self.minor > Self::CURRENT.minor {
            return Ok(Some(Diagnostic::UnsupportedMinorVersion {
                found: self,
                supported: Self::CURRENT,
            }));
        }
        Ok(None)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for FormatVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidField {
            field: "lock-version".to_owned(),
            reason: format!("expected 'MAJOR.MINOR', got '{s}'"),
        };
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for FormatVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FormatVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
