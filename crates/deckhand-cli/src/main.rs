//! Deckhand CLI - render hardened Kubernetes bundles from workload configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use commands::apply::SecretsFrom;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author = "Deckhand Contributors")]
#[command(version)]
#[command(about = "Render hardened Kubernetes bundles from workload configuration", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render bundles locally
    Template {
        /// Configuration file(s), later files override earlier ones
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Render only this workload
        #[arg(short, long)]
        workload: Option<String>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Override the document namespace
        #[arg(short, long, env = "DECKHAND_NAMESPACE")]
        namespace: Option<String>,

        /// Secret content file ({name: {key: content}})
        #[arg(long)]
        secrets: Option<PathBuf>,

        /// Render for an update of running workloads
        #[arg(long)]
        upgrade: bool,

        /// Output directory (if not set, outputs to stdout)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Validate configuration without rendering
    Validate {
        /// Configuration file(s)
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the secret fingerprint of a workload
    Fingerprint {
        /// Configuration file(s)
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Workload name
        #[arg(short, long)]
        workload: String,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Secret content file ({name: {key: content}})
        #[arg(long)]
        secrets: PathBuf,
    },

    /// Compare two rendered manifest streams
    Diff {
        /// Previously rendered stream
        old: PathBuf,

        /// Newly rendered stream
        new: PathBuf,

        /// Lines of context around each change
        #[arg(short = 'U', long, default_value_t = 3)]
        context: usize,
    },

    /// Render bundles and apply them to the cluster
    Apply {
        /// Configuration file(s)
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Apply only this workload
        #[arg(short, long)]
        workload: Option<String>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Override the document namespace
        #[arg(short, long, env = "DECKHAND_NAMESPACE")]
        namespace: Option<String>,

        /// Secret content file ({name: {key: content}})
        #[arg(long, conflicts_with = "cluster_secrets")]
        secrets: Option<PathBuf>,

        /// Read secret content from the target namespace
        #[arg(long)]
        cluster_secrets: bool,

        /// Render in upgrade mode even for workloads not yet deployed
        /// (deployed workloads always are)
        #[arg(long)]
        upgrade: bool,

        /// Let the API server run admission without persisting anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("DECKHAND_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            return exit_code(code);
        }
    };

    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Template {
            configs,
            workload,
            set,
            namespace,
            secrets,
            upgrade,
            output_dir,
        } => commands::template::run(
            &configs,
            workload.as_deref(),
            &set,
            namespace.as_deref(),
            secrets.as_deref(),
            upgrade,
            output_dir.as_deref(),
        ),

        Commands::Validate { configs, set, json } => commands::validate::run(&configs, &set, json),

        Commands::Fingerprint {
            configs,
            workload,
            set,
            secrets,
        } => commands::fingerprint::run(&configs, &workload, &set, &secrets),

        Commands::Diff { old, new, context } => commands::diff::run(&old, &new, context),

        Commands::Apply {
            configs,
            workload,
            set,
            namespace,
            secrets,
            cluster_secrets,
            upgrade,
            dry_run,
        } => {
            let secrets = if cluster_secrets {
                SecretsFrom::Cluster
            } else {
                SecretsFrom::File(secrets.as_deref())
            };
            commands::apply::run(
                &configs,
                workload.as_deref(),
                &set,
                namespace.as_deref(),
                secrets,
                upgrade,
                dry_run,
            )
        }
    };

    match result {
        Ok(()) => exit_code(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            exit_code(code)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
