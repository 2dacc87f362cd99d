//! Resolution behaviour over whole lock documents: graph building, checking,
//! selection and planning, without touching the filesystem.

use std::collections::BTreeSet;
use wheelock_core::{
    build, check, plan, select, CoreError, Environment, EnvironmentOracle, Finding,
    MismatchReason, ProfileOracle, Specificity,
};
use wheelock_schema::{LockDocument, Marker, PackageFile, PythonConstraint, TagSet};

fn linux() -> Environment {
    Environment::from_toml_str(
        r#"
name = "linux-cp312"
python-version = "3.12.1"
tags = ["cp312-cp312-manylinux_2_17_x86_64", "py3-none-any"]

[markers]
'sys_platform == "linux"' = true
'sys_platform == "win32"' = false
'python_version < "3.11"' = false
"#,
    )
    .unwrap()
}

fn parse(input: &str) -> LockDocument {
    LockDocument::parse_str(input).unwrap().document
}

const HEADER: &str = r#"
lock-version = "1.0"
created-at = 2024-03-01T12:00:00Z
"#;

fn mousebender_doc(attrs_files: &str) -> String {
    format!(
        r#"{HEADER}
[metadata]
requires = ["mousebender"]

[[package]]
name = "attrs"
version = "23.1.0"
{attrs_files}

[[package]]
name = "mousebender"
version = "2.0.0"
[[package.file]]
path = "dist/mousebender-2.0.0-py3-none-any.whl"
depends-on = ["attrs", "packaging"]
hashes = {{ sha256 = "1111111111111111111111111111111111111111111111111111111111111111" }}

[[package]]
name = "packaging"
version = "23.2"
[[package.file]]
path = "dist/packaging-23.2-py3-none-any.whl"
depends-on = ["pyparsing"]
hashes = {{ sha256 = "2222222222222222222222222222222222222222222222222222222222222222" }}

[[package]]
name = "pyparsing"
version = "3.1.1"
[[package.file]]
path = "dist/pyparsing-3.1.1-py3-none-any.whl"
hashes = {{ sha256 = "3333333333333333333333333333333333333333333333333333333333333333" }}
"#
    )
}

const ATTRS_ONE_FILE: &str = r#"
[[package.file]]
path = "dist/attrs-23.1.0-py3-none-any.whl"
hashes = { sha256 = "4444444444444444444444444444444444444444444444444444444444444444" }
"#;

const ATTRS_TWO_FILES: &str = r#"
[[package.file]]
path = "dist/attrs-23.1.0-2-py3-none-any.whl"
hashes = { sha256 = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" }
[[package.file]]
path = "dist/attrs-23.1.0-1-py3-none-any.whl"
hashes = { sha256 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" }
"#;

/// Oracle that answers every predicate from fixed lists, independent of the
/// profile contents.
struct FixedOracle {
    true_markers: Vec<&'static str>,
    python_ok: bool,
}

impl EnvironmentOracle for FixedOracle {
    fn evaluate_marker(&self, marker: &Marker, _env: &Environment) -> bool {
        self.true_markers.iter().any(|m| *m == marker.as_str())
    }

    fn tag_compatible(&self, _tags: &TagSet, _env: &Environment) -> Option<Specificity> {
        Some(Specificity(1))
    }

    fn python_satisfies(&self, _constraint: &PythonConstraint, _env: &Environment) -> bool {
        self.python_ok
    }
}

#[test]
fn four_packages_resolve_and_plan_dependencies_first() {
    let doc = parse(&mousebender_doc(ATTRS_ONE_FILE));
    let env = linux();
    let graph = build(&doc, &env, &ProfileOracle).unwrap();
    let report = check(&graph);
    assert!(report.is_resolved(), "{:?}", report.findings);
    let resolved = report.into_resolved().unwrap();

    let names: Vec<&str> = resolved.values().map(|k| k.name.as_str()).collect();
    assert_eq!(names, vec!["attrs", "mousebender", "packaging", "pyparsing"]);

    let selected = resolved
        .values()
        .map(|key| {
            let node = graph.node(key).unwrap();
            let file = select(&node.files, &env, &ProfileOracle).unwrap().unwrap();
            (key.clone(), file.clone())
        })
        .collect();
    let plan = plan(&graph, &resolved, &selected).unwrap();

    let pos = |n: &str| plan.position(n).unwrap();
    assert!(pos("attrs") < pos("mousebender"));
    assert!(pos("packaging") < pos("mousebender"));
    assert!(pos("pyparsing") < pos("packaging"));
    assert_eq!(plan.len(), 4);
}

#[test]
fn equal_specificity_picks_smaller_digest() {
    let doc = parse(&mousebender_doc(ATTRS_TWO_FILES));
    let env = linux();
    let graph = build(&doc, &env, &ProfileOracle).unwrap();
    let resolved = check(&graph).into_resolved().unwrap();
    let attrs = resolved.values().find(|k| k.name == "attrs").unwrap();
    let files = &graph.node(attrs).unwrap().files;
    assert_eq!(files.len(), 2);

    let chosen = select(files, &env, &ProfileOracle).unwrap().unwrap();
    assert_eq!(chosen.filename(), "attrs-23.1.0-1-py3-none-any.whl");

    let mut reversed: Vec<PackageFile> = files.clone();
    reversed.reverse();
    let again = select(&reversed, &env, &ProfileOracle).unwrap().unwrap();
    assert_eq!(again, chosen);
}

#[test]
fn document_marker_false_is_a_mismatch() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
marker = 'sys_platform == "win32"'
requires = ["winonly"]

[[package]]
name = "winonly"
version = "1.0"
[[package.file]]
path = "winonly-1.0-py3-none-any.whl"
hashes = {{ sha256 = "01" }}
"#
    ));
    let err = build(&doc, &linux(), &ProfileOracle).unwrap_err();
    assert!(matches!(
        err,
        CoreError::EnvironmentMismatch {
            reason: MismatchReason::Marker,
            ..
        }
    ));
}

#[test]
fn injected_oracle_decides_markers_and_python() {
    let input = format!(
        r#"{HEADER}
[metadata]
marker = "custom-platform"
requires-python = ">=4"
requires = ["a"]

[[package]]
name = "a"
version = "1.0"
[[package.file]]
path = "a-1.0-anything-at-all.whl"
hashes = {{ sha256 = "01" }}
"#
    );
    let doc = parse(&input);
    let env = linux();

    let mismatch = build(
        &doc,
        &env,
        &FixedOracle {
            true_markers: vec!["custom-platform"],
            python_ok: false,
        },
    )
    .unwrap_err();
    assert!(matches!(
        mismatch,
        CoreError::EnvironmentMismatch {
            reason: MismatchReason::RequiresPython,
            ..
        }
    ));

    let graph = build(
        &doc,
        &env,
        &FixedOracle {
            true_markers: vec!["custom-platform"],
            python_ok: true,
        },
    )
    .unwrap();
    assert!(check(&graph).is_resolved());
}

#[test]
fn two_reachable_versions_are_ambiguous() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
requires = ["app", "tool"]

[[package]]
name = "app"
version = "1.0"
[[package.file]]
path = "app-1.0-py3-none-any.whl"
depends-on = ["six"]
hashes = {{ sha256 = "01" }}

[[package]]
name = "six"
version = "1.15.0"
[[package.file]]
path = "six-1.15.0-py3-none-any.whl"
hashes = {{ sha256 = "02" }}

[[package]]
name = "six"
version = "1.16.0"
[[package.file]]
path = "six-1.16.0-py3-none-any.whl"
hashes = {{ sha256 = "03" }}

[[package]]
name = "tool"
version = "1.0"
[[package.file]]
path = "tool-1.0-py3-none-any.whl"
hashes = {{ sha256 = "04" }}
"#
    ));
    let graph = build(&doc, &linux(), &ProfileOracle).unwrap();
    let report = check(&graph);
    assert!(!report.is_resolved());
    assert!(report.resolved.is_empty());
    assert!(report.findings.iter().any(|f| matches!(
        f,
        Finding::AmbiguousVersion { package, versions }
            if package.name == "six" && versions.len() == 2
    )));
    assert!(matches!(
        report.into_resolved(),
        Err(CoreError::Resolution(_))
    ));
}

#[test]
fn incompatible_files_leave_package_unresolvable() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
requires = ["native"]

[[package]]
name = "native"
version = "0.9"
[[package.file]]
path = "native-0.9-cp312-cp312-win_amd64.whl"
hashes = {{ sha256 = "01" }}
[[package.file]]
path = "native-0.9-cp39-cp39-macosx_11_0_arm64.whl"
hashes = {{ sha256 = "02" }}
[[package.file]]
path = "native-0.9.tar.gz"
hashes = {{ sha256 = "03" }}
"#
    ));
    let graph = build(&doc, &linux(), &ProfileOracle).unwrap();
    let report = check(&graph);
    assert_eq!(report.findings.len(), 1);
    assert!(matches!(
        &report.findings[0],
        Finding::UnresolvablePackage { package, version }
            if package.name == "native" && version.as_str() == "0.9"
    ));
}

#[test]
fn marker_guarded_dependencies_are_skipped() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
requires = ["app", 'pywin32; sys_platform == "win32"']

[[package]]
name = "app"
version = "1.0"
[[package.file]]
path = "app-1.0-py3-none-any.whl"
depends-on = ['tomli; python_version < "3.11"', 'colorama; sys_platform == "win32"']
hashes = {{ sha256 = "01" }}
"#
    ));
    let graph = build(&doc, &linux(), &ProfileOracle).unwrap();
    assert_eq!(graph.node_count(), 1);
    assert!(graph.missing().is_empty());
    assert!(check(&graph).is_resolved());
}

#[test]
fn missing_dependency_is_reported() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
requires = ["app"]

[[package]]
name = "app"
version = "1.0"
[[package.file]]
path = "app-1.0-py3-none-any.whl"
depends-on = ["ghost"]
hashes = {{ sha256 = "01" }}
"#
    ));
    let graph = build(&doc, &linux(), &ProfileOracle).unwrap();
    let report = check(&graph);
    assert!(report.findings.iter().any(|f| matches!(
        f,
        Finding::MissingPackage { package, .. } if package.name == "ghost"
    )));
}

#[test]
fn build_and_check_are_repeatable() {
    let doc = parse(&mousebender_doc(ATTRS_TWO_FILES));
    let env = linux();
    let first = check(&build(&doc, &env, &ProfileOracle).unwrap());
    for _ in 0..5 {
        let again = check(&build(&doc, &env, &ProfileOracle).unwrap());
        assert_eq!(again, first);
    }
}

#[test]
fn selection_ignores_file_order() {
    let doc = parse(&format!(
        r#"{HEADER}
[metadata]
requires = ["numpy"]

[[package]]
name = "numpy"
version = "1.26.4"
[[package.file]]
path = "numpy-1.26.4-py3-none-any.whl"
hashes = {{ sha256 = "0a" }}
[[package.file]]
path = "numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.whl"
hashes = {{ sha256 = "ff" }}
[[package.file]]
path = "numpy-1.26.4-cp312-cp312-win_amd64.whl"
hashes = {{ sha256 = "00" }}
"#
    ));
    let env = linux();
    let key = doc.packages().next().unwrap().0.clone();
    let files = doc.files(&key).unwrap().to_vec();
    let best = select(&files, &env, &ProfileOracle).unwrap().unwrap().clone();
    assert_eq!(
        best.filename(),
        "numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.whl"
    );

    // Every rotation of the candidates yields the same winner.
    for shift in 0..files.len() {
        let mut rotated = files.clone();
        rotated.rotate_left(shift);
        assert_eq!(select(&rotated, &env, &ProfileOracle).unwrap(), Some(&best));
    }
}

#[test]
fn removing_a_file_never_grows_the_surviving_set() {
    let full = mousebender_doc(ATTRS_TWO_FILES);
    let trimmed = full.replace(
        r#"[[package.file]]
path = "dist/attrs-23.1.0-1-py3-none-any.whl"
hashes = { sha256 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" }
"#,
        "",
    );
    assert_ne!(full, trimmed);

    let env = linux();
    let surviving = |input: &str| -> BTreeSet<String> {
        let doc = parse(input);
        let graph = build(&doc, &env, &ProfileOracle).unwrap();
        graph
            .nodes()
            .filter(|n| n.key.name == "attrs")
            .flat_map(|n| n.files.iter().map(|f| f.filename().to_owned()))
            .collect()
    };
    let before = surviving(&full);
    let after = surviving(&trimmed);
    assert!(after.is_subset(&before));
    assert_eq!(after.len(), 1);
}
