use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Cache of artifacts whose bytes already passed hash verification.
///
/// Entries are named `<algorithm>-<hexdigest>` after the digest that
/// verified them. Writes are staged in `staging/` and atomically renamed,
/// so a crash never leaves a partial file under a trusted name. Reads do
/// not re-check the digest; callers must verify before trusting the bytes.
pub struct ArtifactStore {
    layout: StoreLayout,
}

impl ArtifactStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Cache entry name for a recorded digest.
    pub fn key(algorithm: &str, digest: &str) -> Result<String, StoreError> {
        let valid_alg = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_digest = !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit());
        if !(valid_alg && valid_digest) {
            return Err(StoreError::InvalidKey(format!("{algorithm}-{digest}")));
        }
        Ok(format!("{algorithm}-{}", digest.to_ascii_lowercase()))
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.layout.artifacts_dir().join(key)
    }

    /// Store verified bytes under `key`. Idempotent: existing entries are kept.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let dest = self.path_of(key);
        if dest.exists() {
            return Ok(());
        }

        let mut tmp = NamedTempFile::new_in(self.layout.staging_dir())?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&self.layout.artifacts_dir())?;
        debug!("cached artifact {key} ({} bytes)", data.len());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(key);
        if !path.exists() {
            return Err(StoreError::ArtifactNotFound(key.to_owned()));
        }
        Ok(fs::read(&path)?)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_of(key).exists()
    }

    /// Drop an entry, e.g. one that failed re-verification.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_of(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.artifacts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
