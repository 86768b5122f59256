mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_PROVIDER_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "lacuna",
    version,
    about = "Provision Pub/Sub push subscriptions from container labels"
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./lacuna.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

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
    /// Watch container events and reconcile subscriptions until interrupted.
    Daemon {
        /// Docker CLI binary to use for the event stream.
        #[arg(long, default_value = "docker")]
        docker: String,
    },
    /// Compile a JSON object of container labels into subscriptions.
    Compile {
        /// Service identity used for subscription ids.
        #[arg(long)]
        service: String,
        /// JSON file with the labels; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Feed recorded `docker events --format '{{json .}}'` lines through the dispatcher.
    Replay {
        /// File with one JSON event per line.
        file: PathBuf,
        /// Use the in-memory provider regardless of configuration.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LACUNA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Daemon { docker } => commands::daemon::run(config_path, &docker),
        Commands::Compile { service, file } => {
            commands::compile::run(config_path, &service, file.as_deref(), json_output)
        }
        Commands::Replay { file, dry_run } => {
            commands::replay::run(config_path, &file, dry_run, json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:")
                || msg.starts_with("failed to parse config")
            {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("provider error:") {
                EXIT_PROVIDER_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
