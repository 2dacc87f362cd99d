use super::{fail, json_pretty, load_document, EXIT_RESOLUTION_ERROR, EXIT_SUCCESS};
use std::path::Path;
use wheelock_core::{build, check, Environment, ProfileOracle};

pub fn run(document: &Path, env_path: &Path, json: bool) -> Result<u8, String> {
    let doc = match load_document(document) {
        Ok(doc) => doc,
        Err(e) => return fail(&e),
    };
    let env = match Environment::read_from_file(env_path) {
        Ok(env) => env,
        Err(e) => return fail(&e),
    };
    let graph = match build(&doc, &env, &ProfileOracle) {
        Ok(graph) => graph,
        Err(e) => return fail(&e),
    };
    let report = check(&graph);

    if json {
        println!("{}", json_pretty(&report)?);
    } else if report.is_resolved() {
        println!(
            "{}: {} packages resolve",
            env.name,
            report.resolved.len()
        );
        for key in report.resolved.values() {
            println!("  {key}");
        }
    } else {
        println!("{}: resolution failed", env.name);
        for finding in &report.findings {
            println!("  {finding}");
        }
    }

    if report.is_resolved() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_RESOLUTION_ERROR)
    }
}
