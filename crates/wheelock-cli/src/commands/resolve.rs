use super::{document_dir, fail, json_pretty, load_document, EXIT_SUCCESS};
use std::path::Path;
use wheelock_core::{Environment, Installer};
use wheelock_remote::LocalFetcher;

/// Dry run: print the install plan without fetching anything.
pub fn run(store_path: &Path, document: &Path, env_path: &Path, json: bool) -> Result<u8, String> {
    let doc = match load_document(document) {
        Ok(doc) => doc,
        Err(e) => return fail(&e),
    };
    let env = match Environment::read_from_file(env_path) {
        Ok(env) => env,
        Err(e) => return fail(&e),
    };
    let installer = Installer::new(store_path, Box::new(LocalFetcher::new(document_dir(document))));
    let resolved = match installer.resolve(&doc, &env) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    if json {
        let payload = serde_json::json!({
            "environment": resolved.environment,
            "steps": resolved.plan.steps,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "install plan for '{}' ({} packages):",
            resolved.environment,
            resolved.plan.len()
        );
        for (i, step) in resolved.plan.steps.iter().enumerate() {
            let extras = if step.extras.is_empty() {
                String::new()
            } else {
                let names: Vec<String> = step.extras.iter().map(ToString::to_string).collect();
                format!("[{}]", names.join(","))
            };
            println!(
                "  {:>3}. {}{extras} {}  {}",
                i + 1,
                step.name,
                step.version,
                console::style(step.file.filename()).dim()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
