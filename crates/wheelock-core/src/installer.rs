use crate::apply::{Applier, ApplyReport};
use crate::check::check;
use crate::concurrency::{run_bounded, CancelToken, StoreLock, DEFAULT_JOBS};
use crate::graph::{build, ResolvedGraph};
use crate::oracle::{Environment, EnvironmentOracle, ProfileOracle};
use crate::plan::{plan, InstallPlan, InstallStep};
use crate::select::select;
use crate::verify::{verify, DigestComputer, StandardDigests, Verified};
use crate::CoreError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use wheelock_remote::Fetcher;
use wheelock_schema::{LockDocument, PackageId, PackageKey};
use wheelock_store::{ArtifactStore, StoreLayout};

/// Bytes that matched a recorded digest of their file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub bytes: Vec<u8>,
    pub verified: Verified,
    /// Served from the artifact store instead of the fetcher.
    pub cached: bool,
}

/// Output of [`Installer::resolve`]: everything needed to install, nothing
/// touched yet.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub environment: String,
    pub graph: ResolvedGraph,
    pub packages: BTreeMap<PackageId, PackageKey>,
    pub plan: InstallPlan,
}

#[derive(Debug, Clone)]
pub struct InstallResult {
    pub plan: InstallPlan,
    pub fetched: usize,
    pub cached: usize,
    pub applied: ApplyReport,
}

/// The installer role: resolve one lock document against one environment,
/// retrieve and verify every selected file, then apply all or nothing.
pub struct Installer {
    layout: StoreLayout,
    artifacts: ArtifactStore,
    oracle: Box<dyn EnvironmentOracle>,
    fetcher: Box<dyn Fetcher>,
    digests: Box<dyn DigestComputer>,
    jobs: usize,
    cancel: CancelToken,
}

impl Installer {
    /// Create an installer whose artifact store lives under `store_root`.
    pub fn new(store_root: impl Into<PathBuf>, fetcher: Box<dyn Fetcher>) -> Self {
        let layout = StoreLayout::new(store_root.into());
        let artifacts = ArtifactStore::new(layout.clone());
        Self {
            layout,
            artifacts,
            oracle: Box::new(ProfileOracle),
            fetcher,
            digests: Box::new(StandardDigests),
            jobs: DEFAULT_JOBS,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Box<dyn EnvironmentOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    #[must_use]
    pub fn with_digests(mut self, digests: Box<dyn DigestComputer>) -> Self {
        self.digests = digests;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn store_layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Build, check, select and plan. Pure with respect to the filesystem.
    pub fn resolve(
        &self,
        doc: &LockDocument,
        env: &Environment,
    ) -> Result<ResolveResult, CoreError> {
        let oracle = self.oracle.as_ref();
        let graph = build(doc, env, oracle)?;
        let packages = check(&graph).into_resolved()?;

        let mut selected = BTreeMap::new();
        for key in packages.values() {
            let files = graph.node(key).map(|n| n.files.as_slice()).unwrap_or_default();
            let file = select(files, env, oracle)?
                .ok_or_else(|| CoreError::MissingSelection(key.to_string()))?;
            debug!("{key}: selected {}", file.filename());
            selected.insert(key.clone(), file.clone());
        }

        let plan = plan(&graph, &packages, &selected)?;
        info!(
            "resolved {} packages for '{}' ({} install steps)",
            packages.len(),
            env.name,
            plan.len()
        );
        Ok(ResolveResult {
            environment: env.name.clone(),
            graph,
            packages,
            plan,
        })
    }

    fn cached(&self, step: &InstallStep) -> Option<VerifiedArtifact> {
        for (algorithm, digest) in &step.file.hashes {
            let Ok(key) = ArtifactStore::key(algorithm, digest) else {
                continue;
            };
            if !self.artifacts.exists(&key) {
                continue;
            }
            let bytes = match self.artifacts.get(&key) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("failed to read cached artifact {key}: {e}");
                    continue;
                }
            };
            match verify(&step.file, &bytes, self.digests.as_ref()) {
                Ok(verified) => {
                    return Some(VerifiedArtifact {
                        bytes,
                        verified,
                        cached: true,
                    })
                }
                Err(e) => {
                    warn!("cached artifact {key} is corrupt, refetching: {e}");
                    if let Err(e) = self.artifacts.remove(&key) {
                        warn!("failed to drop corrupt artifact {key}: {e}");
                    }
                }
            }
        }
        None
    }

    fn fetch_one(&self, step: &InstallStep) -> Result<VerifiedArtifact, CoreError> {
        if let Some(artifact) = self.cached(step) {
            debug!("{}: using cached artifact", step.file.filename());
            return Ok(artifact);
        }
        let bytes = self
            .fetcher
            .fetch(&step.file.location)
            .map_err(|source| CoreError::Fetch {
                package: format!("{}=={}", step.name, step.version),
                source,
            })?;
        let verified = verify(&step.file, &bytes, self.digests.as_ref())?;
        debug!(
            "{}: verified {} bytes with {}",
            step.file.filename(),
            bytes.len(),
            verified.algorithm
        );
        Ok(VerifiedArtifact {
            bytes,
            verified,
            cached: false,
        })
    }

    /// Retrieve and verify every step on the worker pool. Returns only once
    /// all of them succeeded; the first failure cancels the rest.
    pub fn fetch_verified(&self, plan: &InstallPlan) -> Result<Vec<VerifiedArtifact>, CoreError> {
        run_bounded(&plan.steps, self.jobs, &self.cancel, |step| {
            self.fetch_one(step)
        })
    }

    /// Resolve, fetch and verify everything, then store and apply.
    ///
    /// Nothing reaches the store or the target until every artifact of the
    /// plan has been verified.
    pub fn install(
        &self,
        doc: &LockDocument,
        env: &Environment,
        applier: &dyn Applier,
    ) -> Result<InstallResult, CoreError> {
        let resolved = self.resolve(doc, env)?;
        let _interrupts = self.cancel.watch_interrupts(format!(
            "install of {} packages for '{}'",
            resolved.plan.len(),
            env.name
        ));

        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        self.layout.initialize()?;
        let stale = self.layout.clean_staging()?;
        if stale > 0 {
            debug!("removed {stale} stale staging files");
        }

        let artifacts = self.fetch_verified(&resolved.plan)?;
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let mut fetched = 0;
        for artifact in artifacts.iter().filter(|a| !a.cached) {
            let key = ArtifactStore::key(&artifact.verified.algorithm, &artifact.verified.digest)?;
            self.artifacts.put(&key, &artifact.bytes)?;
            fetched += 1;
        }
        let cached = artifacts.len() - fetched;

        let applied = applier.apply(&resolved.plan, &artifacts)?;
        info!(
            "installed {} packages for '{}' ({fetched} fetched, {cached} cached)",
            resolved.plan.len(),
            env.name
        );
        Ok(InstallResult {
            plan: resolved.plan,
            fetched,
            cached,
            applied,
        })
    }
}
