use super::{colorize_status, fail, json_pretty, load_document, load_environments, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use wheelock_core::{Locker, LockerPolicy};

/// Validate `document` against every profile and write it to `output` only
/// if none of them failed.
pub fn run(
    document: &Path,
    envs: &[PathBuf],
    output: &Path,
    allow_unresolvable: bool,
    json: bool,
) -> Result<u8, String> {
    let doc = match load_document(document) {
        Ok(doc) => doc,
        Err(e) => return fail(&e),
    };
    let envs = match load_environments(envs) {
        Ok(envs) => envs,
        Err(e) => return fail(&e),
    };
    let locker = Locker::new(LockerPolicy { allow_unresolvable });
    let report = match locker.validate(&doc, &envs) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    if json {
        let payload = serde_json::json!({
            "output": output.display().to_string(),
            "publishable": report.is_publishable(),
            "environments": report.environments,
            "diagnostics": report.diagnostics,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for env in &report.environments {
            println!("{:<24} {}", env.environment, colorize_status(env.status));
            if let Some(reason) = env.mismatch {
                println!("    {reason} does not match");
            }
            for finding in &env.findings {
                println!("    {finding}");
            }
        }
    }

    if let Err(e) = Locker::publish(&doc, &report, output) {
        return fail(&e);
    }
    if !json {
        println!("wrote {}", output.display());
    }
    Ok(EXIT_SUCCESS)
}
