//! `deploy` command

use std::future::Future;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::app::options::DeployOptions;
use crate::app::prompt::{confirm, needs_confirmation};
use crate::app::report::{write_analysis, write_failure, write_success};
use crate::deploy::analyze::analyze_dir;
use crate::deploy::archive::TarArchiver;
use crate::deploy::gate::DirectoryGate;
use crate::deploy::orchestrator::{self, Collaborators, DeployOrchestrator, Target};
use crate::errors::CliError;
use crate::http::builds::HttpBuildClient;
use crate::http::client::HttpClient;
use crate::http::deployments::HttpDeploymentStore;
use crate::logs::{init_logging, LogOptions, LogSink};
use crate::progress::theme::Theme;
use crate::progress::{explain, interactive, Presenter};
use crate::storage::app_config::AppConfig;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Deploy the app in `options.dir` to the selected cluster.
///
/// `shutdown_signal` resolving cancels the run the same way Ctrl+C in the
/// live view does.
pub async fn deploy(
    options: DeployOptions,
    layout: StorageLayout,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), CliError> {
    let settings = Settings::load(&layout.settings_file()).await?;
    let stderr_is_terminal = std::io::stderr().is_terminal();
    let interactive = wants_live_view(options.explain, std::io::stdout().is_terminal(), stderr_is_terminal);

    // the live view owns the terminal, so logs go to a file
    let sink = if interactive {
        LogSink::File(layout.logs_dir().path().to_path_buf())
    } else {
        LogSink::Stderr
    };
    let _log_guard = match init_logging(LogOptions {
        log_level: options.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        sink,
        ..Default::default()
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let (cluster_name, cluster) = settings.cluster(options.cluster.as_deref())?;
    let base_url = Url::parse(&cluster.base_url)
        .map_err(|e| CliError::ConfigError(format!("invalid base_url for cluster {}: {}", cluster_name, e)))?;
    let client = HttpClient::new(base_url.as_str(), cluster.token.clone(), settings.request_timeout())?;

    let app_name = resolve_app_name(options.app_name.as_deref(), &options.dir).await;
    let theme = Theme::detect(stderr_is_terminal);

    if needs_confirmation(options.force, std::io::stdin().is_terminal(), settings.clusters.len()) {
        let question = format!("Deploy app '{}' to cluster '{}'?", app_name, cluster_name);
        let confirmed = confirm(&question, &mut std::io::stdin().lock(), &mut std::io::stderr())
            .map_err(|e| CliError::ConfigError(format!("confirmation cancelled: {}", e)))?;
        if !confirmed {
            info!("deploy declined at confirmation");
            eprintln!("  deployment cancelled");
            return Ok(());
        }
    }
    let stall_window = options.stall_window.unwrap_or_else(|| settings.stall_window());

    let orchestrator = DeployOrchestrator::new(
        Collaborators {
            store: Arc::new(HttpDeploymentStore::new(client.clone())),
            builder: Arc::new(HttpBuildClient::new(client)),
            archiver: Arc::new(TarArchiver::new()),
            gate: Arc::new(DirectoryGate),
        },
        Target {
            app_name: app_name.clone(),
            cluster_id: cluster_name.clone(),
            dir: options.dir.clone(),
        },
        orchestrator::Options {
            stall_window,
            failure_report_timeout: settings.failure_report_timeout(),
            inspect_git: options.inspect_git,
            ..Default::default()
        },
    );

    let presenter = select_presenter(&options, interactive, theme, stall_window);

    let root = CancellationToken::new();
    let signal_root = root.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal.await;
        info!("shutdown signal received, cancelling deploy");
        signal_root.cancel();
    });

    eprintln!(
        "  {} {}: {} {} {}",
        theme.check(),
        theme.phase_name("Deploying"),
        app_name,
        theme.faint("→"),
        cluster_name
    );

    let run = orchestrator.run(presenter, root.child_token()).await;
    signal_task.abort();
    info!(state = %run.state(), "deploy run ended");

    match run.into_result() {
        Ok(report) => {
            let mut out = std::io::stdout().lock();
            let host = base_url.host_str().unwrap_or_default();
            write_success(&mut out, &app_name, &report, host, theme)?;
            out.flush()?;
            Ok(())
        }
        Err(e) => {
            let mut err = std::io::stderr().lock();
            write_failure(&mut err, &app_name, &e, theme)?;
            err.flush()?;
            Err(e)
        }
    }
}

/// Show what the builder would make of the app in `options.dir`, without
/// building or recording anything
pub async fn analyze(options: DeployOptions, layout: StorageLayout) -> Result<(), CliError> {
    let settings = Settings::load(&layout.settings_file()).await?;
    let _log_guard = match init_logging(LogOptions {
        log_level: options.log_level.clone().unwrap_or_else(|| settings.log_level.clone()),
        sink: LogSink::Stderr,
        ..Default::default()
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let (cluster_name, cluster) = settings.cluster(options.cluster.as_deref())?;
    let base_url = Url::parse(&cluster.base_url)
        .map_err(|e| CliError::ConfigError(format!("invalid base_url for cluster {}: {}", cluster_name, e)))?;
    let client = HttpClient::new(base_url.as_str(), cluster.token.clone(), settings.request_timeout())?;

    let dir = tokio::fs::canonicalize(&options.dir)
        .await
        .unwrap_or_else(|_| options.dir.clone());
    println!("Analyzing app in {}...\n", dir.display());

    let analysis = analyze_dir(&dir, &TarArchiver::new(), &HttpBuildClient::new(client)).await?;
    let theme = Theme::detect(std::io::stdout().is_terminal());
    let mut out = std::io::stdout().lock();
    write_analysis(&mut out, &analysis, theme)?;
    out.flush()?;
    Ok(())
}

fn select_presenter(
    options: &DeployOptions,
    interactive: bool,
    theme: Theme,
    stall_window: std::time::Duration,
) -> Box<dyn Presenter> {
    if interactive {
        let interactive_options = interactive::Options {
            theme,
            stall_window,
            ..Default::default()
        };
        return Box::new(interactive::InteractiveRenderer::terminal(interactive_options));
    }

    let stderr_is_terminal = std::io::stderr().is_terminal();
    Box::new(explain::ExplainRenderer::stdio(explain::Options {
        format: options.explain_format.resolve(stderr_is_terminal),
        theme,
        stall_window,
        side_is_terminal: stderr_is_terminal,
        ..Default::default()
    }))
}

/// The live view needs a terminal on both streams; redirected stdout gets explain output
fn wants_live_view(explain: bool, stdout_is_terminal: bool, stderr_is_terminal: bool) -> bool {
    !explain && stdout_is_terminal && stderr_is_terminal
}

/// App name from the flag, the app config, or the directory name
pub async fn resolve_app_name(flag: Option<&str>, dir: &Path) -> String {
    if let Some(name) = flag.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Ok(Some(config)) = AppConfig::load(dir).await {
        if !config.name.is_empty() {
            return config.name;
        }
    }
    let dir = tokio::fs::canonicalize(dir).await.unwrap_or_else(|_| dir.to_path_buf());
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "app".to_string())
}
