//! Line oriented rendering of build statuses

use std::collections::{HashMap, HashSet};

use deploy_api::models::SolveStatus;

use crate::progress::theme::Theme;
use crate::utils::format_bytes;

/// Output format of build statuses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExplainFormat {
    /// `tty` on a terminal, `plain` otherwise
    #[default]
    Auto,
    Plain,
    Tty,
    #[value(name = "rawjson")]
    RawJson,
}

impl ExplainFormat {
    /// Replace `Auto` with a concrete format
    pub fn resolve(self, is_terminal: bool) -> Self {
        match self {
            ExplainFormat::Auto if is_terminal => ExplainFormat::Tty,
            ExplainFormat::Auto => ExplainFormat::Plain,
            other => other,
        }
    }
}

/// Turns solve statuses into printable lines, remembering which steps were
/// already announced so repeated updates are not printed twice.
#[derive(Debug)]
pub struct StatusPrinter {
    format: ExplainFormat,
    theme: Theme,
    steps: HashMap<String, usize>,
    announced: HashSet<String>,
    finished: HashSet<String>,
    finished_transfers: HashSet<String>,
}

impl StatusPrinter {
    pub fn new(format: ExplainFormat, theme: Theme) -> Self {
        let theme = match format {
            ExplainFormat::Tty => theme,
            _ => Theme::plain(),
        };
        Self {
            format,
            theme,
            steps: HashMap::new(),
            announced: HashSet::new(),
            finished: HashSet::new(),
            finished_transfers: HashSet::new(),
        }
    }

    pub fn format(&self) -> ExplainFormat {
        self.format
    }

    /// Lines describing what changed in `status`
    pub fn render(&mut self, status: &SolveStatus) -> Vec<String> {
        if self.format == ExplainFormat::RawJson {
            return match serde_json::to_string(status) {
                Ok(line) => vec![line],
                Err(e) => vec![format!("unencodable status: {}", e)],
            };
        }

        let mut lines = Vec::new();

        for vertex in &status.vertexes {
            let tag = self.tag(&vertex.digest);
            if vertex.started.is_some() && self.announced.insert(vertex.digest.clone()) {
                lines.push(format!("{} {}", tag, vertex.name));
            }
            if self.finished.contains(&vertex.digest) {
                continue;
            }
            if !vertex.error.is_empty() {
                self.finished.insert(vertex.digest.clone());
                lines.push(format!("{} {}", tag, self.theme.error(&format!("ERROR: {}", vertex.error))));
            } else if vertex.cached {
                self.finished.insert(vertex.digest.clone());
                lines.push(format!("{} {}", tag, self.theme.faint("CACHED")));
            } else if let Some(completed) = vertex.completed {
                self.finished.insert(vertex.digest.clone());
                let took = vertex
                    .started
                    .map(|s| (completed - s).num_milliseconds().max(0) as f64 / 1000.0)
                    .unwrap_or_default();
                lines.push(format!("{} {}", tag, self.theme.faint(&format!("DONE {:.1}s", took))));
            }
        }

        for transfer in &status.statuses {
            if transfer.total == 0 || transfer.completed.is_none() {
                continue;
            }
            if !self.finished_transfers.insert(transfer.id.clone()) {
                continue;
            }
            let tag = self.tag(&transfer.vertex);
            let name = if transfer.name.is_empty() { &transfer.id } else { &transfer.name };
            lines.push(format!("{} {} {} done", tag, name, format_bytes(transfer.total)));
        }

        for log in &status.logs {
            let tag = self.tag(&log.vertex);
            for line in String::from_utf8_lossy(&log.data).lines() {
                let line = line.trim_end();
                if !line.trim().is_empty() {
                    lines.push(format!("{} {}", tag, line));
                }
            }
        }

        lines
    }

    fn tag(&mut self, digest: &str) -> String {
        let next = self.steps.len() + 1;
        let n = *self.steps.entry(digest.to_string()).or_insert(next);
        self.theme.prefix(&format!("#{}", n))
    }
}
