//! Installer runs against a local artifact directory, a temporary store and
//! a temporary target.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wheelock_core::{
    Applier, CoreError, DigestComputer, DirectoryApplier, Environment, InstallRecord, Installer,
    StandardDigests, StoreLock, INSTALL_RECORD_FILE,
};
use wheelock_remote::{FetchError, Fetcher, LocalFetcher};
use wheelock_schema::{FileLocation, LockDocument};
use wheelock_store::{ArtifactStore, StoreLayout};

struct Wheel {
    name: &'static str,
    version: &'static str,
    depends_on: &'static [&'static str],
    body: &'static [u8],
}

const WHEELS: &[Wheel] = &[
    Wheel {
        name: "attrs",
        version: "23.1.0",
        depends_on: &[],
        body: b"attrs wheel",
    },
    Wheel {
        name: "mousebender",
        version: "2.0.0",
        depends_on: &["attrs", "packaging"],
        body: b"mousebender wheel",
    },
    Wheel {
        name: "packaging",
        version: "23.2",
        depends_on: &["pyparsing"],
        body: b"packaging wheel",
    },
    Wheel {
        name: "pyparsing",
        version: "3.1.1",
        depends_on: &[],
        body: b"pyparsing wheel",
    },
];

impl Wheel {
    fn filename(&self) -> String {
        format!("{}-{}-py3-none-any.whl", self.name, self.version)
    }
}

fn sha256(bytes: &[u8]) -> String {
    StandardDigests.digest("sha256", bytes).unwrap()
}

struct Fixture {
    _dir: tempfile::TempDir,
    dist: PathBuf,
    store: PathBuf,
    target: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        for wheel in WHEELS {
            fs::write(dist.join(wheel.filename()), wheel.body).unwrap();
        }
        Self {
            dist,
            store: dir.path().join("store"),
            target: dir.path().join("site-packages"),
            _dir: dir,
        }
    }

    fn installer(&self) -> Installer {
        Installer::new(&self.store, Box::new(LocalFetcher::new(&self.dist)))
    }

    fn applier(&self) -> DirectoryApplier {
        DirectoryApplier::new(&self.target, "linux-cp312")
    }

    fn stored_keys(&self) -> Vec<String> {
        ArtifactStore::new(StoreLayout::new(&self.store))
            .list()
            .unwrap()
    }
}

/// Lock document over [`WHEELS`], recording the real digest of each body.
fn document() -> LockDocument {
    let mut out = String::from(
        r#"lock-version = "1.0"
created-at = 2024-03-01T12:00:00Z

[metadata]
requires = ["mousebender"]
"#,
    );
    for wheel in WHEELS {
        let deps: Vec<String> = wheel.depends_on.iter().map(|d| format!("\"{d}\"")).collect();
        out.push_str(&format!(
            r#"
[[package]]
name = "{}"
version = "{}"
[[package.file]]
path = "{}"
depends-on = [{}]
hashes = {{ sha256 = "{}" }}
"#,
            wheel.name,
            wheel.version,
            wheel.filename(),
            deps.join(", "),
            sha256(wheel.body)
        ));
    }
    LockDocument::parse_str(&out).unwrap().document
}

fn linux() -> Environment {
    Environment::from_toml_str(
        r#"
name = "linux-cp312"
python-version = "3.12.1"
tags = ["py3-none-any"]
"#,
    )
    .unwrap()
}

fn listing(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Fetcher that counts calls and delegates.
struct CountingFetcher {
    inner: LocalFetcher,
    calls: Arc<AtomicUsize>,
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, location: &FileLocation) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(location)
    }
}

#[test]
fn install_places_every_package_and_records_it() {
    let fx = Fixture::new();
    let result = fx
        .installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap();

    assert_eq!(result.plan.len(), 4);
    assert_eq!(result.fetched, 4);
    assert_eq!(result.cached, 0);
    assert_eq!(result.applied.placed.len(), 4);

    for wheel in WHEELS {
        assert_eq!(fs::read(fx.target.join(wheel.filename())).unwrap(), wheel.body);
    }
    let record = InstallRecord::read_from_file(&fx.target.join(INSTALL_RECORD_FILE)).unwrap();
    assert_eq!(record.environment, "linux-cp312");
    let order: Vec<&str> = record.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(order, vec!["attrs", "pyparsing", "packaging", "mousebender"]);
    assert_eq!(
        record.packages[0].digest,
        format!("sha256:{}", sha256(b"attrs wheel"))
    );

    assert_eq!(fx.stored_keys().len(), 4);
    assert!(fx
        .stored_keys()
        .contains(&format!("sha256-{}", sha256(b"pyparsing wheel"))));
}

#[test]
fn hash_mismatch_applies_and_stores_nothing() {
    let fx = Fixture::new();
    fs::write(fx.dist.join("packaging-23.2-py3-none-any.whl"), b"tampered").unwrap();

    let err = fx
        .installer()
        .with_jobs(2)
        .install(&document(), &linux(), &fx.applier())
        .unwrap_err();
    assert!(
        matches!(err, CoreError::HashMismatch { ref file, .. } if file == "packaging-23.2-py3-none-any.whl"),
        "unexpected error: {err}"
    );
    assert!(listing(&fx.target).is_empty());
    assert!(fx.stored_keys().is_empty());
}

#[test]
fn missing_artifact_aborts_before_apply() {
    let fx = Fixture::new();
    fs::remove_file(fx.dist.join("attrs-23.1.0-py3-none-any.whl")).unwrap();

    let err = fx
        .installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Fetch {
            source: FetchError::NotFound(_),
            ..
        }
    ));
    assert!(listing(&fx.target).is_empty());
}

#[test]
fn second_install_is_served_from_the_store() {
    let fx = Fixture::new();
    fx.installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let installer = Installer::new(
        &fx.store,
        Box::new(CountingFetcher {
            inner: LocalFetcher::new(&fx.dist),
            calls: Arc::clone(&calls),
        }),
    );
    let target = fx.target.with_file_name("second-site");
    let result = installer
        .install(&document(), &linux(), &DirectoryApplier::new(&target, "linux-cp312"))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.cached, 4);
    assert_eq!(result.fetched, 0);
    assert_eq!(
        fs::read(target.join("attrs-23.1.0-py3-none-any.whl")).unwrap(),
        b"attrs wheel"
    );
}

#[test]
fn corrupt_store_entry_is_refetched() {
    let fx = Fixture::new();
    fx.installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap();

    let layout = StoreLayout::new(&fx.store);
    let key = format!("sha256-{}", sha256(b"attrs wheel"));
    fs::write(layout.artifacts_dir().join(&key), b"bit rot").unwrap();

    let result = fx
        .installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap();
    assert_eq!(result.fetched, 1);
    assert_eq!(result.cached, 3);
    assert_eq!(
        ArtifactStore::new(layout).get(&key).unwrap(),
        b"attrs wheel"
    );
}

#[test]
fn resolve_touches_nothing() {
    let fx = Fixture::new();
    let resolved = fx.installer().resolve(&document(), &linux()).unwrap();
    assert_eq!(resolved.packages.len(), 4);
    assert_eq!(resolved.plan.len(), 4);
    assert!(!fx.store.exists());
    assert!(!fx.target.exists());
}

#[test]
fn cancelled_run_applies_nothing() {
    let fx = Fixture::new();
    let installer = fx.installer();
    installer.cancel_token().cancel();
    let err = installer
        .install(&document(), &linux(), &fx.applier())
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(listing(&fx.target).is_empty());
}

#[test]
fn install_waits_for_the_store_lock() {
    let fx = Fixture::new();
    let layout = StoreLayout::new(&fx.store);
    let held = StoreLock::acquire(&layout.lock_file()).unwrap();
    assert!(StoreLock::try_acquire(&layout.lock_file()).unwrap().is_none());
    drop(held);

    fx.installer()
        .install(&document(), &linux(), &fx.applier())
        .unwrap();
    assert_eq!(StoreLock::holder(&layout.lock_file()), None);
    assert!(StoreLock::try_acquire(&layout.lock_file()).unwrap().is_some());
}

/// Applier that refuses everything, to prove nothing reaches it early.
struct RefusingApplier;

impl Applier for RefusingApplier {
    fn apply(
        &self,
        _plan: &wheelock_core::InstallPlan,
        _artifacts: &[wheelock_core::VerifiedArtifact],
    ) -> Result<wheelock_core::ApplyReport, CoreError> {
        Err(CoreError::Io(std::io::Error::other("target is read-only")))
    }
}

#[test]
fn applier_failure_surfaces_after_verification() {
    let fx = Fixture::new();
    let err = fx
        .installer()
        .install(&document(), &linux(), &RefusingApplier)
        .unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
    // Verified artifacts were stored; only application failed.
    assert_eq!(fx.stored_keys().len(), 4);
}
