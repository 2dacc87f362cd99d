use super::{
    fail, fetch_settings, json_pretty, load_document, make_fetcher, maybe_spinner, spin_fail,
    spin_ok, EXIT_SUCCESS,
};
use std::path::Path;
use wheelock_core::{DirectoryApplier, Environment, Installer};

pub fn run(
    store_path: &Path,
    document: &Path,
    env_path: &Path,
    target: &Path,
    jobs: Option<usize>,
    json: bool,
) -> Result<u8, String> {
    let doc = match load_document(document) {
        Ok(doc) => doc,
        Err(e) => return fail(&e),
    };
    let env = match Environment::read_from_file(env_path) {
        Ok(env) => env,
        Err(e) => return fail(&e),
    };
    let (config, jobs) = fetch_settings(jobs)?;
    let installer = Installer::new(store_path, Box::new(make_fetcher(config, document)))
        .with_jobs(jobs);
    let applier = DirectoryApplier::new(target, &env.name);

    let pb = maybe_spinner(json, &format!("installing for '{}'...", env.name));
    let result = match installer.install(&doc, &env, &applier) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "install complete");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "install failed");
            }
            return fail(&e);
        }
    };

    if json {
        let payload = serde_json::json!({
            "environment": env.name,
            "target": target.display().to_string(),
            "packages": result.plan.steps,
            "fetched": result.fetched,
            "cached": result.cached,
            "record": result.applied.record,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "installed {} packages into {} ({} fetched, {} cached)",
            result.plan.len(),
            target.display(),
            result.fetched,
            result.cached
        );
        for step in &result.plan.steps {
            println!("  {} {}", step.name, step.version);
        }
    }
    Ok(EXIT_SUCCESS)
}
