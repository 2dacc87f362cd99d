use crate::{FetchError, Fetcher};
use std::path::{Path, PathBuf};
use wheelock_schema::FileLocation;

/// Reads artifacts from the local filesystem.
///
/// Relative paths are resolved against `base_dir`, normally the directory
/// holding the lock document.
pub struct LocalFetcher {
    base_dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.strip_prefix("file://").unwrap_or(raw);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, location: &FileLocation) -> Result<Vec<u8>, FetchError> {
        let raw = match location {
            FileLocation::Path(p) => p.as_str(),
            FileLocation::Url(u) if u.starts_with("file://") => u.as_str(),
            FileLocation::Url(u) => return Err(FetchError::UnsupportedLocation(u.clone())),
        };
        let path = self.resolve(raw);
        tracing::debug!("reading {}", path.display());
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.display().to_string())
            } else {
                FetchError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })
    }
}
