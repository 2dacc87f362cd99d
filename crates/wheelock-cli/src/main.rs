mod commands;

use clap::{Parser, Subcommand};
use commands::EXIT_FAILURE;
use std::path::PathBuf;
use std::process::ExitCode;
use wheelock_core::install_signal_handler;

#[derive(Debug, Parser)]
#[command(
    name = "wheelock",
    version,
    about = "Reproducible lock document resolution, verification and installation"
)]
struct Cli {
    /// Path to the artifact store directory.
    #[arg(long, default_value = "~/.local/share/wheelock", global = true)]
    store: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that a lock document resolves for one environment.
    Check {
        /// Path to the lock document.
        document: PathBuf,
        /// Environment profile (TOML).
        #[arg(long = "env")]
        env: PathBuf,
    },
    /// Show the install plan for one environment without fetching anything.
    Resolve {
        /// Path to the lock document.
        document: PathBuf,
        /// Environment profile (TOML).
        #[arg(long = "env")]
        env: PathBuf,
    },
    /// Fetch, verify and place every selected file into a target directory.
    Install {
        /// Path to the lock document.
        document: PathBuf,
        /// Environment profile (TOML).
        #[arg(long = "env")]
        env: PathBuf,
        /// Directory to place the selected files in.
        #[arg(long)]
        target: PathBuf,
        /// Concurrent retrieval workers (overrides the fetch config).
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Check local artifacts against the digests recorded in a lock document.
    Verify {
        /// Path to the lock document.
        document: PathBuf,
        /// Artifact files to check, matched to recorded files by name.
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },
    /// Validate a lock document against every supported environment, then write it.
    Emit {
        /// Path to the lock document.
        document: PathBuf,
        /// Environment profile (TOML); repeat once per supported environment.
        #[arg(long = "env", required = true)]
        envs: Vec<PathBuf>,
        /// Where to write the validated document.
        #[arg(short, long)]
        output: PathBuf,
        /// Record environments whose only problem is an uninstallable package
        /// as unsupported instead of refusing to emit.
        #[arg(long, default_value_t = false)]
        allow_unresolvable: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("WHEELOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let store_path = expand_tilde(&cli.store);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Check { document, env } => commands::check::run(&document, &env, json_output),
        Commands::Resolve { document, env } => {
            commands::resolve::run(&store_path, &document, &env, json_output)
        }
        Commands::Install {
            document,
            env,
            target,
            jobs,
        } => commands::install::run(&store_path, &document, &env, &target, jobs, json_output),
        Commands::Verify {
            document,
            artifacts,
        } => commands::verify::run(&document, &artifacts, json_output),
        Commands::Emit {
            document,
            envs,
            output,
            allow_unresolvable,
        } => commands::emit::run(&document, &envs, &output, allow_unresolvable, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
