use super::{
    fail, json_pretty, load_document, EXIT_FAILURE, EXIT_INTEGRITY_ERROR, EXIT_SUCCESS,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use wheelock_core::{verify, CoreError, StandardDigests};
use wheelock_schema::{LockDocument, PackageFile, PackageKey};

#[derive(Debug, Serialize)]
struct ArtifactCheck {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Every recorded file whose name matches `filename`.
fn recorded<'a>(doc: &'a LockDocument, filename: &str) -> Vec<(&'a PackageKey, &'a PackageFile)> {
    doc.packages()
        .flat_map(|(key, files)| files.iter().map(move |f| (key, f)))
        .filter(|(_, f)| f.filename() == filename)
        .collect()
}

fn check_one(doc: &LockDocument, path: &Path) -> ArtifactCheck {
    let display = path.display().to_string();
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return ArtifactCheck {
            path: display,
            package: None,
            status: "unknown",
            detail: Some("not a file name".to_owned()),
        };
    };
    let candidates = recorded(doc, filename);
    let Some((first_key, _)) = candidates.first() else {
        return ArtifactCheck {
            path: display,
            package: None,
            status: "unknown",
            detail: Some("not recorded in the lock document".to_owned()),
        };
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return ArtifactCheck {
                path: display,
                package: Some(first_key.to_string()),
                status: "unreadable",
                detail: Some(e.to_string()),
            }
        }
    };

    // The same file can be recorded under several extras keys; any match counts.
    let mut last_err: Option<CoreError> = None;
    for (key, file) in &candidates {
        match verify(file, &bytes, &StandardDigests) {
            Ok(v) => {
                return ArtifactCheck {
                    path: display,
                    package: Some(key.to_string()),
                    status: "ok",
                    detail: Some(format!("{}:{}", v.algorithm, v.digest)),
                }
            }
            Err(e) => last_err = Some(e),
        }
    }
    ArtifactCheck {
        path: display,
        package: Some(first_key.to_string()),
        status: "mismatch",
        detail: last_err.map(|e| e.to_string()),
    }
}

/// Check local artifacts against the digests recorded in `document`.
pub fn run(document: &Path, artifacts: &[PathBuf], json: bool) -> Result<u8, String> {
    let doc = match load_document(document) {
        Ok(doc) => doc,
        Err(e) => return fail(&e),
    };
    let results: Vec<ArtifactCheck> = artifacts.iter().map(|p| check_one(&doc, p)).collect();

    if json {
        println!("{}", json_pretty(&results)?);
    } else {
        for r in &results {
            let mark = match r.status {
                "ok" => console::style("ok").green().to_string(),
                "mismatch" => console::style("MISMATCH").red().bold().to_string(),
                other => console::style(other).yellow().to_string(),
            };
            print!("{mark} {}", r.path);
            if let Some(ref d) = r.detail {
                print!(" ({d})");
            }
            println!();
        }
    }

    if results.iter().any(|r| r.status == "mismatch") {
        Ok(EXIT_INTEGRITY_ERROR)
    } else if results.iter().all(|r| r.status == "ok") {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
