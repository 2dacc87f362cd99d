use crate::version::FormatVersion;
use serde::Serialize;
use std::fmt;

/// Non-fatal finding surfaced to the caller. Never blocks progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// Document minor version is newer than this engine knows about.
    UnsupportedMinorVersion {
        found: FormatVersion,
        supported: FormatVersion,
    },
    /// Document was read from a path without the `.lock-document` suffix.
    NonStandardFileName { path: String },
    /// The locker recorded an environment as unsupported instead of failing.
    UnsupportedEnvironment { environment: String, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnsupportedMinorVersion { found, supported } => write!(
                f,
                "lock-version {found} is newer than supported {supported}; unknown fields are ignored"
            ),
            Diagnostic::NonStandardFileName { path } => write!(
                f,
                "'{path}' does not use the .{} suffix",
                crate::LOCK_DOCUMENT_SUFFIX
            ),
            Diagnostic::UnsupportedEnvironment {
                environment,
                reason,
            } => write!(f, "environment '{environment}' is unsupported: {reason}"),
        }
    }
}
