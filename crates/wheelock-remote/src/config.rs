use crate::FetchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retrieval settings read from `~/.config/wheelock/fetch.json`.
///
/// Command-line flags take precedence over every field here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Sent as `Authorization: Bearer <token>` on HTTP requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Number of concurrent retrieval workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

impl FetchConfig {
    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Load the default config file, or defaults if there is none.
    pub fn load_default() -> Result<Self, FetchError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| FetchError::Config(format!("invalid fetch config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), FetchError> {
        let io_err = |source| FetchError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| FetchError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, FetchError> {
    let home = std::env::var("HOME").map_err(|_| FetchError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/wheelock/fetch.json"))
}
