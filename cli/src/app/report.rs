//! Final report of a deploy run

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use deploy_api::models::{AccessInfo, AppAnalysis, LockInfo};

use crate::deploy::orchestrator::DeployReport;
use crate::errors::CliError;
use crate::progress::theme::Theme;

/// Print the outcome of a successful deploy
pub fn write_success(
    out: &mut dyn Write,
    app_name: &str,
    report: &DeployReport,
    cluster_address: &str,
    theme: Theme,
) -> io::Result<()> {
    writeln!(
        out,
        "\n{} Updated version {} deployed. All traffic moved to new version.",
        theme.check(),
        theme.highlight(&report.version)
    )?;
    match &report.access_info {
        Some(access) => write_access_info(out, app_name, access, cluster_address),
        None => Ok(()),
    }
}

/// Print how the deployed app can be reached.
///
/// `cluster_address` is the API address of the cluster, used when the
/// server did not return a hostname for it.
pub fn write_access_info(
    out: &mut dyn Write,
    app_name: &str,
    access: &AccessInfo,
    cluster_address: &str,
) -> io::Result<()> {
    let cluster = if !access.cluster_hostname.is_empty() {
        access.cluster_hostname.clone()
    } else {
        strip_port(cluster_address).to_string()
    };

    if !access.hostnames.is_empty() {
        writeln!(out, "\nYour app is available at:")?;
        for host in &access.hostnames {
            writeln!(out, "  https://{}", host)?;
        }
        if access.default_route {
            writeln!(out, "  (also the default route)")?;
        }
    } else if access.default_route {
        if cluster.is_empty() {
            writeln!(out, "\nYour app is the default route and will receive all unmatched traffic.")?;
        } else {
            writeln!(out, "\nYour app is the default route, available at:")?;
            writeln!(out, "  https://{}", cluster)?;
        }
        write_route_suggestion(out, app_name, &access.cluster_hostname)?;
    } else {
        writeln!(out, "\nNo routes configured for this app.")?;
        write_route_suggestion(out, app_name, &access.cluster_hostname)?;
    }
    Ok(())
}

fn write_route_suggestion(out: &mut dyn Write, app_name: &str, cluster_hostname: &str) -> io::Result<()> {
    if cluster_hostname.is_empty() {
        writeln!(out, "To reach it by name, route a hostname of your choice to '{}'.", app_name)
    } else {
        writeln!(
            out,
            "To reach it by name, try routing {}.{} to '{}'.",
            sanitize_subdomain(app_name),
            cluster_hostname,
            app_name
        )
    }
}

/// Print why a deploy failed
pub fn write_failure(out: &mut dyn Write, app_name: &str, err: &CliError, theme: Theme) -> io::Result<()> {
    match err {
        CliError::GateRejected { reason, remedy } => {
            writeln!(out, "{} {}\n{}\n", theme.error("Error:"), reason, remedy)
        }
        CliError::DeploymentBlocked(lock) => write_blocked(out, lock, Utc::now(), theme),
        CliError::Cancelled => writeln!(out, "\n{} Deploy cancelled.", theme.cross()),
        CliError::BuildFailed { errors, logs } => {
            writeln!(out, "\n{} Build failed.", theme.cross())?;
            if !errors.is_empty() {
                writeln!(out, "\nErrors:")?;
                for error in errors {
                    writeln!(out, "  - {}", error)?;
                }
            }
            if !logs.is_empty() {
                writeln!(out, "\nBuild output:")?;
                for line in logs {
                    writeln!(out, "{}", line)?;
                }
            }
            Ok(())
        }
        CliError::MissingVersion => writeln!(
            out,
            "\n{} Error detected in building {}. No version returned.",
            theme.cross(),
            app_name
        ),
        CliError::StallTimeout(window) => writeln!(
            out,
            "\n{} The builder showed no progress within {}s. The deployment was marked failed.",
            theme.cross(),
            window.as_secs()
        ),
        other => writeln!(out, "\n{} {}", theme.cross(), other),
    }
}

/// Print the deployment holding the lock on the app
pub fn write_blocked(out: &mut dyn Write, lock: &LockInfo, now: DateTime<Utc>, theme: Theme) -> io::Result<()> {
    writeln!(out, "\n{} Deployment blocked:\n", theme.cross())?;
    writeln!(
        out,
        "Another deployment is already in progress for app '{}' on cluster '{}'.\n",
        lock.app_name, lock.cluster_id
    )?;
    writeln!(out, "Existing deployment details:")?;
    writeln!(out, "  • Deployment ID: {}", lock.blocking_deployment_id)?;
    writeln!(out, "  • Started by: {}", lock.started_by)?;
    if let Some(started_at) = lock.started_at {
        writeln!(
            out,
            "  • Started at: {} ({} ago)",
            started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_seconds((now - started_at).num_seconds())
        )?;
    }
    if let Some(phase) = &lock.current_phase {
        writeln!(out, "  • Current phase: {}", phase)?;
    }
    if let Some(expires_at) = lock.lock_expires_at {
        writeln!(
            out,
            "  • Lock expires in: {}",
            format_seconds((expires_at - now).num_seconds())
        )?;
    }
    writeln!(out)?;
    if lock.started_by.is_empty() || lock.started_by == "-" {
        writeln!(out, "Please wait for it to complete.")
    } else {
        writeln!(
            out,
            "Please wait for it to complete or contact {} to coordinate.",
            lock.started_by
        )
    }
}

/// Print what the builder would build
pub fn write_analysis(out: &mut dyn Write, analysis: &AppAnalysis, theme: Theme) -> io::Result<()> {
    writeln!(out, "{} {}", theme.phase_name("Stack:"), theme.highlight(&analysis.stack))?;
    if !analysis.app_name.is_empty() {
        writeln!(out, "{} {}", theme.phase_name("App Name:"), theme.highlight(&analysis.app_name))?;
    }
    writeln!(out, "{} {}", theme.phase_name("Directory:"), analysis.working_dir)?;
    if !analysis.entrypoint.is_empty() {
        writeln!(out, "{} {}", theme.phase_name("Entrypoint:"), theme.highlight(&analysis.entrypoint))?;
    }
    if !analysis.build_dockerfile.is_empty() {
        writeln!(out, "{} {}", theme.phase_name("Dockerfile:"), analysis.build_dockerfile)?;
    }

    if !analysis.services.is_empty() {
        writeln!(out, "\nServices")?;
        for service in &analysis.services {
            let command = if service.command.is_empty() {
                theme.faint("image default")
            } else {
                service.command.clone()
            };
            let source = if service.source.is_empty() {
                String::new()
            } else {
                theme.faint(&format!(" ({})", service.source))
            };
            writeln!(out, "  {}: {}{}", theme.highlight(&service.name), command, source)?;
        }
    }

    if !analysis.env_vars.is_empty() {
        writeln!(out, "\nEnvironment Variables")?;
        for key in &analysis.env_vars {
            writeln!(out, "  • {}", key)?;
        }
    }

    if !analysis.events.is_empty() {
        writeln!(out, "\nDetection")?;
        for event in &analysis.events {
            let badge = format!("[{}]", event.kind);
            if event.name.is_empty() {
                writeln!(out, "  {} {}", theme.faint(&badge), event.message)?;
            } else {
                writeln!(out, "  {} {}: {}", theme.faint(&badge), theme.highlight(&event.name), event.message)?;
            }
        }
    }
    Ok(())
}

fn format_seconds(seconds: i64) -> String {
    let seconds = seconds.max(0);
    match (seconds / 3600, seconds % 3600 / 60, seconds % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m{}s", m, s),
        (h, m, s) => format!("{}h{}m{}s", h, m, s),
    }
}

/// Turn an app name into a valid DNS label
pub fn sanitize_subdomain(name: &str) -> String {
    let mapped: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    let collapsed = mapped
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if collapsed.is_empty() {
        "app".to_string()
    } else {
        collapsed
    }
}

/// Remove a trailing port from a host, and any URL scheme or path around it
pub fn strip_port(address: &str) -> &str {
    let host = address
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(address);
    let host = host.split('/').next().unwrap_or(host);
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
