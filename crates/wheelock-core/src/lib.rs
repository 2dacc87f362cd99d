//! Resolution engine for wheelock lock documents.
//!
//! This crate turns a parsed `LockDocument` and a concrete target
//! `Environment` into an install decision: the `graph` builder filters the
//! document through an `EnvironmentOracle`, `check` proves one version per
//! reachable package, `select` picks a file per package by a fixed total
//! order, `verify` gates retrieved bytes on their recorded hashes, and
//! `plan` orders the result dependency-first. `Installer` and `Locker` run
//! that pipeline for the two roles that share it.

pub mod apply;
pub mod check;
pub mod concurrency;
pub mod graph;
pub mod installer;
pub mod locker;
pub mod oracle;
pub mod plan;
pub mod python;
pub mod select;
pub mod verify;

pub use apply::{
    Applier, ApplyReport, DirectoryApplier, InstallRecord, InstalledPackage, INSTALL_RECORD_FILE,
};
pub use check::{check, Finding, ResolutionReport};
pub use concurrency::{
    install_signal_handler, run_bounded, CancelToken, InterruptAction, InterruptGuard, Interrupts,
    StoreLock, DEFAULT_JOBS,
};
pub use graph::{build, Edge, MismatchReason, MissingReference, Node, ResolvedGraph};
pub use installer::{InstallResult, Installer, ResolveResult, VerifiedArtifact};
pub use locker::{EnvironmentReport, EnvironmentStatus, Locker, LockerPolicy, LockerReport};
pub use oracle::{Environment, EnvironmentOracle, ProfileOracle, Specificity};
pub use plan::{plan, InstallPlan, InstallStep};
pub use select::select;
pub use verify::{verify, DigestComputer, StandardDigests, Verified, SUPPORTED_ALGORITHMS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("lock document error: {0}")]
    Schema(#[from] wheelock_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] wheelock_store::StoreError),
    #[error("failed to fetch {package}: {source}")]
    Fetch {
        package: String,
        #[source]
        source: wheelock_remote::FetchError,
    },
    #[error("invalid environment profile {path}: {reason}")]
    Profile { path: String, reason: String },
    #[error("lock document does not apply to environment '{environment}': {reason} does not match")]
    EnvironmentMismatch {
        environment: String,
        reason: MismatchReason,
    },
    #[error("resolution failed:\n{}", format_findings(.0))]
    Resolution(Vec<Finding>),
    #[error("hash mismatch for {file}: no recorded digest matched (checked: {})", format_checked(.checked))]
    HashMismatch { file: String, checked: Vec<String> },
    #[error("files '{first}' and '{second}' share primary digest {digest}")]
    DuplicateDigest {
        first: String,
        second: String,
        digest: String,
    },
    #[error("no file selected for resolved package {0}")]
    MissingSelection(String),
    #[error("refusing to emit: validation failed for {}", .0.join(", "))]
    EmissionRefused(Vec<String>),
    #[error("no environments given to validate against")]
    NoEnvironments,
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_checked(checked: &[String]) -> String {
    if checked.is_empty() {
        "no supported algorithm".to_owned()
    } else {
        checked.join(", ")
    }
}
