//! deployctl - Entry Point
//!
//! Submits an application directory for a remote build and follows the
//! deployment until it is live.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use deployctl::app::options::DeployOptions;
use deployctl::app::run;
use deployctl::logs::LogLevel;
use deployctl::progress::printer::ExplainFormat;
use deployctl::storage::layout::StorageLayout;
use deployctl::utils::version_info;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Build and deploy applications to a cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the app in a directory and roll it out
    Deploy {
        /// App name (defaults to the app config name, then the directory name)
        #[arg(short, long)]
        app: Option<String>,

        /// Directory to deploy
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Cluster to deploy to (defaults to the active cluster)
        #[arg(short, long)]
        cluster: Option<String>,

        /// Print every build step instead of the live view
        #[arg(short = 'x', long)]
        explain: bool,

        /// Line format of explain output
        #[arg(long, value_enum, default_value_t = ExplainFormat::Auto)]
        explain_format: ExplainFormat,

        /// Log level (overrides settings)
        #[arg(long)]
        log_level: Option<LogLevel>,

        /// Seconds to wait for the builder to show progress
        #[arg(long)]
        stall_window: Option<u64>,

        /// Do not attach git metadata to the deployment
        #[arg(long)]
        no_git: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,

        /// Show what would be built without building or deploying
        #[arg(long)]
        analyze: bool,
    },

    /// Print version information as JSON
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), anyhow::Error> = match cli.command {
        Commands::Version => serde_json::to_string_pretty(&version_info())
            .map(|json| println!("{}", json))
            .map_err(Into::into),
        Commands::Deploy {
            app,
            dir,
            cluster,
            explain,
            explain_format,
            log_level,
            stall_window,
            no_git,
            force,
            analyze,
        } => {
            let options = DeployOptions {
                app_name: app,
                dir,
                cluster,
                explain,
                explain_format,
                log_level,
                stall_window: stall_window.map(Duration::from_secs),
                inspect_git: !no_git,
                force,
            };
            let outcome = if analyze {
                run::analyze(options, StorageLayout::default())
                    .await
                    .inspect_err(|e| eprintln!("Error: {}", e))
            } else {
                run::deploy(options, StorageLayout::default(), await_shutdown_signal()).await
            };
            match outcome {
                Ok(()) => Ok(()),
                Err(e) => std::process::exit(e.exit_code()),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling...");
        }
    }
}
