use crate::diagnostics::Diagnostic;
use crate::specifier::DependencySpecifier;
use crate::types::{ExtraName, HexDigest, Marker, PackageName, PythonConstraint, TagSet, Version};
use crate::version::FormatVersion;
use crate::{SchemaError, LOCK_DOCUMENT_SUFFIX};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Digest algorithms ranked strongest first; the first one a file records is
/// its primary digest. Unlisted algorithms rank after these, alphabetically.
pub const DIGEST_PREFERENCE: &[&str] = &["sha512", "sha384", "sha256", "blake3"];

/// A package name plus its sorted extras, ignoring version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageId {
    pub name: PackageName,
    pub extras: Vec<ExtraName>,
}

impl PackageId {
    pub fn new(name: PackageName, mut extras: Vec<ExtraName>) -> Self {
        extras.sort();
        extras.dedup();
        Self { name, extras }
    }

    /// The id a dependency specifier points at.
    pub fn of(spec: &DependencySpecifier) -> Self {
        Self::new(spec.name().clone(), spec.extras().to_vec())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(ExtraName::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        Ok(())
    }
}

/// Node identity: normalized name, sorted extras, pinned version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageKey {
    pub name: PackageName,
    pub extras: Vec<ExtraName>,
    pub version: Version,
}

impl PackageKey {
    pub fn new(name: PackageName, mut extras: Vec<ExtraName>, version: Version) -> Self {
        extras.sort();
        extras.dedup();
        Self {
            name,
            extras,
            version,
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId {
            name: self.name.clone(),
            extras: self.extras.clone(),
        }
    }

    pub fn matches(&self, id: &PackageId) -> bool {
        self.name == id.name && self.extras == id.extras
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.id(), self.version)
    }
}

/// Where a file can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileLocation {
    Url(String),
    /// Local path; relative paths are resolved against the document's directory.
    Path(String),
}

impl FileLocation {
    pub fn as_str(&self) -> &str {
        match self {
            FileLocation::Url(s) | FileLocation::Path(s) => s,
        }
    }

    /// Last path segment, without query string or fragment.
    pub fn file_name(&self) -> &str {
        let trimmed = match self {
            FileLocation::Url(url) => url.split(['?', '#']).next().unwrap_or(url),
            FileLocation::Path(path) => path,
        };
        trimmed
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(trimmed)
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate artifact for a [`PackageKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub location: FileLocation,
    pub display_name: Option<String>,
    pub is_direct_reference: bool,
    /// Algorithm (lowercase) to lowercase hex digest. Never empty.
    pub hashes: BTreeMap<String, HexDigest>,
    pub depends_on: Vec<DependencySpecifier>,
    pub requires_python: Option<PythonConstraint>,
}

impl PackageFile {
    pub fn new(location: FileLocation) -> Self {
        Self {
            location,
            display_name: None,
            is_direct_reference: false,
            hashes: BTreeMap::new(),
            depends_on: Vec::new(),
            requires_python: None,
        }
    }

    /// The explicit display name if recorded, otherwise the name implied by the location.
    pub fn filename(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.location.file_name())
    }

    /// Compatibility tags implied by a wheel filename:
    /// `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
    ///
    /// Anything that is not a wheel has no tag set.
    pub fn tag_set(&self) -> Option<TagSet> {
        let filename = self.filename();
        let stem = filename
            .strip_suffix(".whl")
            .or_else(|| filename.strip_suffix(".WHL"))?;
        let parts: Vec<&str> = stem.split('-').collect();
        if !(5..=6).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        let n = parts.len();
        Some(TagSet::new(format!(
            "{}-{}-{}",
            parts[n - 3],
            parts[n - 2],
            parts[n - 1]
        )))
    }

    /// Strongest recorded digest, per [`DIGEST_PREFERENCE`]. Algorithms
    /// outside that list never count, so an `md5`-only file has none.
    pub fn primary_digest(&self) -> Option<(&str, &HexDigest)> {
        DIGEST_PREFERENCE
            .iter()
            .find_map(|alg| self.hashes.get_key_value(*alg))
            .map(|(alg, digest)| (alg.as_str(), digest))
    }
}

/// Document-wide applicability and the graph roots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub marker: Option<Marker>,
    pub tag_set: Option<TagSet>,
    pub root_requirements: Vec<DependencySpecifier>,
    pub requires_python: Option<PythonConstraint>,
}

/// Parsed lock document. Immutable once loaded; every stage reads it by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct LockDocument {
    pub format_version: FormatVersion,
    pub created_at: DateTime<Utc>,
    pub tool: toml::Table,
    pub metadata: Metadata,
    packages: BTreeMap<PackageKey, Vec<PackageFile>>,
}

/// A document together with the warnings produced while reading it.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: LockDocument,
    pub diagnostics: Vec<Diagnostic>,
}

impl LockDocument {
    pub fn new(metadata: Metadata, created_at: DateTime<Utc>) -> Self {
        Self {
            format_version: FormatVersion::CURRENT,
            created_at,
            tool: toml::Table::new(),
            metadata,
            packages: BTreeMap::new(),
        }
    }

    /// Add a package entry, enforcing the per-key invariants.
    pub fn add_package(
        &mut self,
        key: PackageKey,
        files: Vec<PackageFile>,
    ) -> Result<(), SchemaError> {
        if files.is_empty() {
            return Err(SchemaError::NoFiles(key.to_string()));
        }
        for file in &files {
            if file.hashes.is_empty() {
                return Err(SchemaError::EmptyHashes {
                    package: key.to_string(),
                    file: file.filename().to_owned(),
                });
            }
        }
        if self.packages.contains_key(&key) {
            return Err(SchemaError::DuplicatePackage(key.to_string()));
        }
        self.packages.insert(key, files);
        Ok(())
    }

    pub fn packages(&self) -> impl Iterator<Item = (&PackageKey, &[PackageFile])> {
        self.packages.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn files(&self, key: &PackageKey) -> Option<&[PackageFile]> {
        self.packages.get(key).map(Vec::as_slice)
    }

    /// Every key with the given name and extras, in version order.
    pub fn keys_for<'a>(&'a self, id: &'a PackageId) -> impl Iterator<Item = &'a PackageKey> + 'a {
        let start = PackageKey {
            name: id.name.clone(),
            extras: id.extras.clone(),
            version: Version::new(""),
        };
        self.packages
            .range(start..)
            .map(|(k, _)| k)
            .take_while(move |k| k.matches(id))
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn parse_str(input: &str) -> Result<LoadedDocument, SchemaError> {
        let table: toml::Table = input.parse()?;

        let raw_version = table
            .get("lock-version")
            .ok_or_else(|| SchemaError::MissingField("lock-version".to_owned()))?;
        let format_version: FormatVersion = raw_version
            .as_str()
            .ok_or_else(|| SchemaError::InvalidField {
                field: "lock-version".to_owned(),
                reason: "expected a string".to_owned(),
            })?
            .parse()?;

        let mut diagnostics = Vec::new();
        let newer_minor = format_version.check_supported()?;
        let unknown = unknown_keys(&table);
        if !unknown.is_empty() {
            if newer_minor.is_none() {
                return Err(SchemaError::UnknownFields(unknown.join(", ")));
            }
            tracing::debug!("ignoring fields from newer minor version: {}", unknown.join(", "));
        }
        diagnostics.extend(newer_minor);

        let raw: RawDocument = toml::from_str(input)?;
        let document = raw.into_document(format_version)?;
        Ok(LoadedDocument {
            document,
            diagnostics,
        })
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<LoadedDocument, SchemaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut loaded = Self::parse_str(&content)?;
        let has_suffix = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&format!(".{LOCK_DOCUMENT_SUFFIX}")));
        if !has_suffix {
            loaded.diagnostics.push(Diagnostic::NonStandardFileName {
                path: path.display().to_string(),
            });
        }
        Ok(loaded)
    }

    /// Deterministic TOML rendering: packages sorted by key, files in recorded order.
    pub fn to_toml_string(&self) -> Result<String, SchemaError> {
        let created_at: toml::value::Datetime = self
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .parse()
            .map_err(|e| SchemaError::InvalidField {
                field: "created-at".to_owned(),
                reason: format!("{e}"),
            })?;

        let out = DocumentOut {
            lock_version: self.format_version,
            created_at,
            metadata: MetadataOut {
                marker: self.metadata.marker.as_ref(),
                tag: self.metadata.tag_set.as_ref(),
                requires_python: self.metadata.requires_python.as_ref(),
                requires: &self.metadata.root_requirements,
            },
            packages: self
                .packages
                .iter()
                .map(|(key, files)| PackageOut {
                    name: &key.name,
                    version: &key.version,
                    extras: &key.extras,
                    files: files.iter().map(FileOut::from).collect(),
                })
                .collect(),
            tool: (!self.tool.is_empty()).then_some(&self.tool),
        };
        Ok(toml::to_string_pretty(&out)?)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SchemaError::Io(e.error))?;
        // Fsync parent directory to ensure rename durability on power loss.
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }
}

const DOCUMENT_KEYS: &[&str] = &["lock-version", "created-at", "metadata", "package", "tool"];
const METADATA_KEYS: &[&str] = &["marker", "tag", "requires", "requires-python"];
const PACKAGE_KEYS: &[&str] = &["name", "version", "extras", "file"];
const FILE_KEYS: &[&str] = &[
    "name",
    "url",
    "path",
    "direct",
    "hashes",
    "depends-on",
    "requires-python",
];

fn unknown_keys(table: &toml::Table) -> Vec<String> {
    fn check(table: &toml::Table, known: &[&str], prefix: &str, out: &mut Vec<String>) {
        for key in table.keys() {
            if !known.contains(&key.as_str()) {
                out.push(format!("{prefix}{key}"));
            }
        }
    }

    let mut out = Vec::new();
    check(table, DOCUMENT_KEYS, "", &mut out);
    if let Some(meta) = table.get("metadata").and_then(toml::Value::as_table) {
        check(meta, METADATA_KEYS, "metadata.", &mut out);
    }
    let packages = table.get("package").and_then(toml::Value::as_array);
    for (i, pkg) in packages.into_iter().flatten().enumerate() {
        let Some(pkg) = pkg.as_table() else { continue };
        check(pkg, PACKAGE_KEYS, &format!("package[{i}]."), &mut out);
        let files = pkg.get("file").and_then(toml::Value::as_array);
        for (j, file) in files.into_iter().flatten().enumerate() {
            if let Some(file) = file.as_table() {
                check(file, FILE_KEYS, &format!("package[{i}].file[{j}]."), &mut out);
            }
        }
    }
    out
}

fn parse_created_at(value: &toml::value::Datetime) -> Result<DateTime<Utc>, SchemaError> {
    let raw = value.to_string();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Offset-less datetimes are taken as UTC.
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| SchemaError::InvalidField {
            field: "created-at".to_owned(),
            reason: format!("'{raw}' is not a date-time"),
        })
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDocument {
    created_at: Option<toml::value::Datetime>,
    metadata: Option<RawMetadata>,
    #[serde(default, rename = "package")]
    packages: Vec<RawPackage>,
    #[serde(default)]
    tool: toml::Table,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMetadata {
    marker: Option<Marker>,
    tag: Option<TagSet>,
    requires: Option<Vec<DependencySpecifier>>,
    requires_python: Option<PythonConstraint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPackage {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    extras: Vec<ExtraName>,
    #[serde(default, rename = "file")]
    files: Vec<RawFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawFile {
    name: Option<String>,
    url: Option<String>,
    path: Option<String>,
    #[serde(default)]
    direct: bool,
    hashes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    depends_on: Vec<DependencySpecifier>,
    requires_python: Option<PythonConstraint>,
}

impl RawDocument {
    fn into_document(self, format_version: FormatVersion) -> Result<LockDocument, SchemaError> {
        let created_at = self
            .created_at
            .as_ref()
            .ok_or_else(|| SchemaError::MissingField("created-at".to_owned()))
            .and_then(parse_created_at)?;
        let raw_meta = self
            .metadata
            .ok_or_else(|| SchemaError::MissingField("metadata".to_owned()))?;
        let metadata = Metadata {
            marker: raw_meta.marker,
            tag_set: raw_meta.tag,
            root_requirements: raw_meta
                .requires
                .ok_or_else(|| SchemaError::MissingField("metadata.requires".to_owned()))?,
            requires_python: raw_meta.requires_python,
        };

        let mut doc = LockDocument {
            format_version,
            created_at,
            tool: self.tool,
            metadata,
            packages: BTreeMap::new(),
        };
        for (i, raw_pkg) in self.packages.into_iter().enumerate() {
            let name = raw_pkg
                .name
                .ok_or_else(|| SchemaError::MissingField(format!("package[{i}].name")))?;
            let version = raw_pkg
                .version
                .ok_or_else(|| SchemaError::MissingField(format!("package[{i}].version")))?;
            let key = PackageKey::new(
                PackageName::new(&name),
                raw_pkg.extras,
                Version::new(version.trim()),
            );
            let files = raw_pkg
                .files
                .into_iter()
                .enumerate()
                .map(|(j, f)| f.into_file(&format!("package[{i}].file[{j}]")))
                .collect::<Result<Vec<_>, _>>()?;
            doc.add_package(key, files)?;
        }
        Ok(doc)
    }
}

impl RawFile {
    fn into_file(self, path: &str) -> Result<PackageFile, SchemaError> {
        let location = match (self.url, self.path) {
            (Some(url), None) => FileLocation::Url(url),
            (None, Some(p)) => FileLocation::Path(p),
            (None, None) => return Err(SchemaError::MissingField(format!("{path}.url"))),
            (Some(_), Some(_)) => {
                return Err(SchemaError::InvalidField {
                    field: path.to_owned(),
                    reason: "both 'url' and 'path' are set".to_owned(),
                })
            }
        };
        let raw_hashes = self
            .hashes
            .ok_or_else(|| SchemaError::MissingField(format!("{path}.hashes")))?;
        let mut hashes = BTreeMap::new();
        for (alg, digest) in raw_hashes {
            let digest = digest.trim().to_ascii_lowercase();
            if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(SchemaError::InvalidField {
                    field: format!("{path}.hashes.{alg}"),
                    reason: "digest must be hexadecimal".to_owned(),
                });
            }
            let alg_key = alg.trim().to_ascii_lowercase();
            if hashes.contains_key(&alg_key) {
                return Err(SchemaError::InvalidField {
                    field: format!("{path}.hashes.{alg}"),
                    reason: format!("'{alg_key}' is recorded more than once"),
                });
            }
            hashes.insert(alg_key, HexDigest::new(digest));
        }
        // Empty tables are caught by add_package with the package key in the message.
        Ok(PackageFile {
            location,
            display_name: self.name,
            is_direct_reference: self.direct,
            hashes,
            depends_on: self.depends_on,
            requires_python: self.requires_python,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct DocumentOut<'a> {
    lock_version: FormatVersion,
    created_at: toml::value::Datetime,
    metadata: MetadataOut<'a>,
    #[serde(rename = "package")]
    packages: Vec<PackageOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool: Option<&'a toml::Table>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct MetadataOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<&'a Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a TagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_python: Option<&'a PythonConstraint>,
    requires: &'a [DependencySpecifier],
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct PackageOut<'a> {
    name: &'a PackageName,
    version: &'a Version,
    #[serde(skip_serializing_if = "is_empty_slice")]
    extras: &'a [ExtraName],
    #[serde(rename = "file")]
    files: Vec<FileOut<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct FileOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    direct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_python: Option<&'a PythonConstraint>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    depends_on: &'a [DependencySpecifier],
    hashes: &'a BTreeMap<String, HexDigest>,
}

fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

impl<'a> From<&'a PackageFile> for FileOut<'a> {
    fn from(file: &'a PackageFile) -> Self {
        let (url, path) = match &file.location {
            FileLocation::Url(u) => (Some(u.as_str()), None),
            FileLocation::Path(p) => (None, Some(p.as_str())),
        };
        Self {
            name: file.display_name.as_deref(),
            url,
            path,
            direct: file.is_direct_reference,
            requires_python: file.requires_python.as_ref(),
            depends_on: &file.depends_on,
            hashes: &file.hashes,
        }
    }
}
