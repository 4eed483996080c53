//! chartwatch CLI - profile discovery for Flux Helm repositories

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "chartwatch")]
#[command(author = "chartwatch Contributors")]
#[command(version)]
#[command(about = "Profile discovery for Flux Helm repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/chartwatch/config.yaml)
    #[arg(long, global = true, env = "CHARTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch HelmRepository objects and keep the profile cache up to date
    Watch {
        /// Only watch this namespace (overrides the configuration)
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Show the resource kinds a HelmRelease last applied
    Inventory {
        /// HelmRelease name
        release: String,

        /// HelmRelease namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the cached profiles of a HelmRepository
    Profiles {
        /// Repository as <namespace>/<name>
        repository: String,

        /// Refresh from the cluster before reading the cache
        #[arg(long)]
        refresh: bool,

        /// Print the values file of one profile version (<chart>@<version>)
        #[arg(long)]
        values: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => exit_with(err),
    };

    let result = match cli.command {
        Commands::Watch { namespace } => commands::watch::run(config, namespace).await,
        Commands::Inventory {
            release,
            namespace,
            json,
        } => commands::inventory::run(&release, &namespace, json).await,
        Commands::Profiles {
            repository,
            refresh,
            values,
            json,
        } => commands::profiles::run(&config, &repository, refresh, values.as_deref(), json).await,
    };

    if let Err(err) = result {
        exit_with(err);
    }
}

fn exit_with(err: error::CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}
