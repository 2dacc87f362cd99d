//! Lock document model for wheelock.
//!
//! This crate defines the schema layer: TOML lock document parsing and
//! validation (`LockDocument`), canonical package identity (`PackageKey`,
//! `PackageId`), dependency specifiers, format version gating, and
//! deterministic emission of documents back to disk.

pub mod diagnostics;
pub mod document;
pub mod specifier;
pub mod types;
pub mod version;

pub use diagnostics::Diagnostic;
pub use document::{
    FileLocation, LoadedDocument, LockDocument, Metadata, PackageFile, PackageId, PackageKey,
    DIGEST_PREFERENCE,
};
pub use specifier::DependencySpecifier;
pub use types::{
    normalize_name, ExtraName, HexDigest, Marker, PackageName, PythonConstraint, TagSet, Version,
};
pub use version::FormatVersion;

use thiserror::Error;

/// File name suffix for lock documents, without the leading dot.
pub const LOCK_DOCUMENT_SUFFIX: &str = "lock-document";

/// Document name used when none is given.
pub const DEFAULT_LOCK_DOCUMENT: &str = "wheelock.lock-document";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read lock document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse lock document: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("lock document serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("unknown fields for this lock-version: {0}")]
    UnknownFields(String),
    #[error("invalid dependency specifier '{specifier}': {reason}")]
    InvalidSpecifier { specifier: String, reason: String },
    #[error("hash table for '{file}' of {package} must not be empty")]
    EmptyHashes { package: String, file: String },
    #[error("package {0} has no files")]
    NoFiles(String),
    #[error("duplicate package entry {0}")]
    DuplicatePackage(String),
    #[error("unsupported lock-version {found}: this engine reads major version {}", .supported.major)]
    UnsupportedMajorVersion {
        found: FormatVersion,
        supported: FormatVersion,
    },
}
