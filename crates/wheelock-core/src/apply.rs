use crate::installer::VerifiedArtifact;
use crate::plan::InstallPlan;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

/// Written next to the placed files after a successful install.
pub const INSTALL_RECORD_FILE: &str = "wheelock-install.json";

/// Places verified artifacts into a target.
///
/// Called only with a complete plan whose every artifact already passed
/// verification, `artifacts[i]` belonging to `plan.steps[i]`.
pub trait Applier {
    fn apply(
        &self,
        plan: &InstallPlan,
        artifacts: &[VerifiedArtifact],
    ) -> Result<ApplyReport, CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub placed: Vec<PathBuf>,
    pub record: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    pub file: String,
    pub direct: bool,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub environment: String,
    pub installed_at: String,
    pub packages: Vec<InstalledPackage>,
}

impl InstallRecord {
    pub fn read_from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Copies each artifact into a directory under its file name.
///
/// All artifacts are first written to temp files inside the target, then
/// renamed into place in plan order. A file about to be replaced is first
/// moved aside to a backup inside the target. If any step fails, files this
/// run created are removed and replaced files are restored from their
/// backups; on success the backups are deleted.
pub struct DirectoryApplier {
    target: PathBuf,
    environment: String,
}

impl DirectoryApplier {
    pub fn new(target: impl Into<PathBuf>, environment: &str) -> Self {
        Self {
            target: target.into(),
            environment: environment.to_owned(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn write_record(
        &self,
        plan: &InstallPlan,
        artifacts: &[VerifiedArtifact],
    ) -> Result<PathBuf, CoreError> {
        let record = InstallRecord {
            environment: self.environment.clone(),
            installed_at: chrono::Utc::now().to_rfc3339(),
            packages: plan
                .steps
                .iter()
                .zip(artifacts)
                .map(|(step, artifact)| InstalledPackage {
                    name: step.name.to_string(),
                    version: step.version.to_string(),
                    extras: step.extras.iter().map(ToString::to_string).collect(),
                    file: step.file.filename().to_owned(),
                    direct: step.file.is_direct_reference,
                    digest: format!("{}:{}", artifact.verified.algorithm, artifact.verified.digest),
                })
                .collect(),
        };
        let path = self.target.join(INSTALL_RECORD_FILE);
        let mut tmp = NamedTempFile::new_in(&self.target)?;
        tmp.write_all(serde_json::to_string_pretty(&record)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| CoreError::Io(e.error))?;
        Ok(path)
    }

    /// Move an existing file at `dest` aside. Directories are left alone;
    /// the rename onto them fails later and triggers a rollback.
    fn back_up(&self, dest: &Path) -> Result<Option<TempPath>, CoreError> {
        match std::fs::symlink_metadata(dest) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
            Ok(meta) if meta.is_dir() => Ok(None),
            Ok(_) => {
                let backup = NamedTempFile::new_in(&self.target)?.into_temp_path();
                std::fs::rename(dest, &backup)?;
                debug!("backed up {}", dest.display());
                Ok(Some(backup))
            }
        }
    }

    fn rollback(journal: Vec<Placement>) {
        for entry in journal.into_iter().rev() {
            match entry {
                Placement::Created(path) => {
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!("rollback: failed to remove {}: {e}", path.display());
                    }
                }
                Placement::Replaced { dest, backup } => {
                    if let Err(e) = backup.persist(&dest) {
                        warn!("rollback: failed to restore {}: {}", dest.display(), e.error);
                    }
                }
            }
        }
    }
}

/// What placing one file did to the target, so it can be undone.
enum Placement {
    Created(PathBuf),
    Replaced { dest: PathBuf, backup: TempPath },
}

fn safe_file_name(name: &str) -> Result<&str, CoreError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(name)
    } else {
        Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("refusing to place file with unsafe name '{name}'"),
        )))
    }
}

impl Applier for DirectoryApplier {
    fn apply(
        &self,
        plan: &InstallPlan,
        artifacts: &[VerifiedArtifact],
    ) -> Result<ApplyReport, CoreError> {
        if plan.len() != artifacts.len() {
            return Err(CoreError::MissingSelection(format!(
                "{} steps but {} artifacts",
                plan.len(),
                artifacts.len()
            )));
        }
        std::fs::create_dir_all(&self.target)?;

        // Stage everything first; a failure here leaves the target untouched
        // since unpersisted temp files delete themselves on drop.
        let mut staged = Vec::with_capacity(plan.len());
        for (step, artifact) in plan.steps.iter().zip(artifacts) {
            let name = safe_file_name(step.file.filename())?;
            let mut tmp = NamedTempFile::new_in(&self.target)?;
            tmp.write_all(&artifact.bytes)?;
            tmp.as_file().sync_all()?;
            staged.push((tmp, self.target.join(name)));
        }

        let mut placed = Vec::with_capacity(staged.len());
        let mut journal = Vec::with_capacity(staged.len());
        for (tmp, dest) in staged {
            let backup = match self.back_up(&dest) {
                Ok(backup) => backup,
                Err(e) => {
                    Self::rollback(journal);
                    return Err(e);
                }
            };
            if let Err(e) = tmp.persist(&dest) {
                if let Some(backup) = backup {
                    journal.push(Placement::Replaced {
                        dest: dest.clone(),
                        backup,
                    });
                }
                Self::rollback(journal);
                return Err(CoreError::Io(e.error));
            }
            journal.push(match backup {
                Some(backup) => Placement::Replaced {
                    dest: dest.clone(),
                    backup,
                },
                None => Placement::Created(dest.clone()),
            });
            debug!("placed {}", dest.display());
            placed.push(dest);
        }

        let record = match self.write_record(plan, artifacts) {
            Ok(path) => path,
            Err(e) => {
                Self::rollback(journal);
                return Err(e);
            }
        };
        // Dropping the journal deletes the backups.
        drop(journal);
        info!(
            "installed {} packages into {}",
            placed.len(),
            self.target.display()
        );
        Ok(ApplyReport {
            placed,
            record: Some(record),
        })
    }
}
