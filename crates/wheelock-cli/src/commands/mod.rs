pub mod check;
pub mod emit;
pub mod install;
pub mod resolve;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wheelock_core::{CoreError, Environment, EnvironmentStatus, DEFAULT_JOBS};
use wheelock_remote::{FetchConfig, HttpFetcher, LocalFetcher, LocationFetcher};
use wheelock_schema::LockDocument;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DOCUMENT_ERROR: u8 = 2;
pub const EXIT_RESOLUTION_ERROR: u8 = 3;
pub const EXIT_INTEGRITY_ERROR: u8 = 4;

pub fn exit_code(err: &CoreError) -> u8 {
    match err {
        CoreError::Schema(_) | CoreError::Profile { .. } => EXIT_DOCUMENT_ERROR,
        CoreError::EnvironmentMismatch { .. }
        | CoreError::Resolution(_)
        | CoreError::MissingSelection(_)
        | CoreError::EmissionRefused(_)
        | CoreError::NoEnvironments => EXIT_RESOLUTION_ERROR,
        CoreError::HashMismatch { .. } | CoreError::DuplicateDigest { .. } => {
            EXIT_INTEGRITY_ERROR
        }
        _ => EXIT_FAILURE,
    }
}

/// Report a core failure on stderr and turn it into the matching exit code.
pub fn fail(err: &CoreError) -> Result<u8, String> {
    eprintln!("error: {err}");
    Ok(exit_code(err))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Read a lock document and print its diagnostics as warnings.
pub fn load_document(path: &Path) -> Result<LockDocument, CoreError> {
    let loaded = LockDocument::read_from_file(path)?;
    for diagnostic in &loaded.diagnostics {
        eprintln!("{} {diagnostic}", console::style("warning:").yellow());
    }
    Ok(loaded.document)
}

pub fn load_environments(paths: &[PathBuf]) -> Result<Vec<Environment>, CoreError> {
    paths.iter().map(|p| Environment::read_from_file(p)).collect()
}

/// Directory that relative file paths in `document` are resolved against.
pub fn document_dir(document: &Path) -> PathBuf {
    match document.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Config file, then `--jobs`, then the built-in default.
pub fn fetch_settings(jobs: Option<usize>) -> Result<(FetchConfig, usize), String> {
    let config = FetchConfig::load_default().map_err(|e| format!("fetch config: {e}"))?;
    let jobs = jobs.or(config.jobs).unwrap_or(DEFAULT_JOBS).max(1);
    Ok((config, jobs))
}

pub fn make_fetcher(config: FetchConfig, document: &Path) -> LocationFetcher {
    LocationFetcher::new(
        HttpFetcher::new(config),
        LocalFetcher::new(document_dir(document)),
    )
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Spinner only for human output.
pub fn maybe_spinner(json: bool, msg: &str) -> Option<ProgressBar> {
    (!json).then(|| spinner(msg))
}

pub fn colorize_status(status: EnvironmentStatus) -> String {
    use console::Style;
    match status {
        EnvironmentStatus::Resolved => Style::new().green().apply_to("resolved").to_string(),
        EnvironmentStatus::Unsupported => {
            Style::new().yellow().apply_to("unsupported").to_string()
        }
        EnvironmentStatus::Failed => Style::new().red().bold().apply_to("failed").to_string(),
    }
}
