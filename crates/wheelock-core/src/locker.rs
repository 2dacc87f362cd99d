use crate::check::{check, Finding};
use crate::graph::{build, MismatchReason};
use crate::oracle::{Environment, EnvironmentOracle, ProfileOracle};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use wheelock_schema::{Diagnostic, LockDocument};

/// How strictly the locker treats environments that do not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockerPolicy {
    /// Record an environment whose only findings are unresolvable packages
    /// as unsupported (a warning) instead of refusing to emit.
    #[serde(default)]
    pub allow_unresolvable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentStatus {
    Resolved,
    Unsupported,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub environment: String,
    pub status: EnvironmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<MismatchReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockerReport {
    pub environments: Vec<EnvironmentReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LockerReport {
    pub fn is_publishable(&self) -> bool {
        self.environments
            .iter()
            .all(|e| e.status != EnvironmentStatus::Failed)
    }

    pub fn failed(&self) -> Vec<String> {
        self.environments
            .iter()
            .filter(|e| e.status == EnvironmentStatus::Failed)
            .map(|e| e.environment.clone())
            .collect()
    }
}

/// The locker role: a document may only be published after it resolves in
/// every environment the locker claims to support.
pub struct Locker {
    oracle: Box<dyn EnvironmentOracle>,
    policy: LockerPolicy,
}

impl Locker {
    pub fn new(policy: LockerPolicy) -> Self {
        Self {
            oracle: Box::new(ProfileOracle),
            policy,
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Box<dyn EnvironmentOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn policy(&self) -> LockerPolicy {
        self.policy
    }

    fn validate_one(&self, doc: &LockDocument, env: &Environment) -> Result<EnvironmentReport, CoreError> {
        let graph = match build(doc, env, self.oracle.as_ref()) {
            Ok(graph) => graph,
            Err(CoreError::EnvironmentMismatch { reason, .. }) => {
                return Ok(EnvironmentReport {
                    environment: env.name.clone(),
                    status: EnvironmentStatus::Failed,
                    mismatch: Some(reason),
                    findings: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };
        let report = check(&graph);
        let status = if report.is_resolved() {
            EnvironmentStatus::Resolved
        } else if self.policy.allow_unresolvable
            && report
                .findings
                .iter()
                .all(|f| matches!(f, Finding::UnresolvablePackage { .. }))
        {
            EnvironmentStatus::Unsupported
        } else {
            EnvironmentStatus::Failed
        };
        Ok(EnvironmentReport {
            environment: env.name.clone(),
            status,
            mismatch: None,
            findings: report.findings,
        })
    }

    /// Build and check `doc` once per environment.
    pub fn validate(
        &self,
        doc: &LockDocument,
        envs: &[Environment],
    ) -> Result<LockerReport, CoreError> {
        if envs.is_empty() {
            return Err(CoreError::NoEnvironments);
        }
        let mut report = LockerReport::default();
        for env in envs {
            let env_report = self.validate_one(doc, env)?;
            match env_report.status {
                EnvironmentStatus::Resolved => info!("'{}': resolved", env.name),
                EnvironmentStatus::Unsupported => {
                    let reason = env_report
                        .findings
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    warn!("'{}': recorded as unsupported: {reason}", env.name);
                    report.diagnostics.push(Diagnostic::UnsupportedEnvironment {
                        environment: env.name.clone(),
                        reason,
                    });
                }
                EnvironmentStatus::Failed => warn!("'{}': does not resolve", env.name),
            }
            report.environments.push(env_report);
        }
        Ok(report)
    }

    /// Validate, then write `doc` to `path` only if every environment passed.
    pub fn emit(
        &self,
        doc: &LockDocument,
        envs: &[Environment],
        path: &Path,
    ) -> Result<LockerReport, CoreError> {
        let report = self.validate(doc, envs)?;
        Self::publish(doc, &report, path)?;
        Ok(report)
    }

    /// Write `doc` to `path` if `report` has no failed environment.
    pub fn publish(doc: &LockDocument, report: &LockerReport, path: &Path) -> Result<(), CoreError> {
        if !report.is_publishable() {
            return Err(CoreError::EmissionRefused(report.failed()));
        }
        doc.write_to_file(path)?;
        info!("wrote {}", path.display());
        Ok(())
    }
}
