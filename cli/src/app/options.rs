//! Deploy command options

use std::path::PathBuf;
use std::time::Duration;

use crate::logs::LogLevel;
use crate::progress::printer::ExplainFormat;

/// Options of one `deploy` invocation, resolved from flags and settings
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// App name; falls back to the app config, then the directory name
    pub app_name: Option<String>,

    /// Directory holding the app source
    pub dir: PathBuf,

    /// Cluster name; falls back to the active cluster of the settings
    pub cluster: Option<String>,

    /// Print every build step instead of the live view
    pub explain: bool,

    /// Line format used in explain mode
    pub explain_format: ExplainFormat,

    /// Overrides the settings log level
    pub log_level: Option<LogLevel>,

    /// Overrides the settings stall window
    pub stall_window: Option<Duration>,

    /// Attach git metadata to the deployment record
    pub inspect_git: bool,

    /// Skip the confirmation prompt
    pub force: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            app_name: None,
            dir: PathBuf::from("."),
            cluster: None,
            explain: false,
            explain_format: ExplainFormat::Auto,
            log_level: None,
            stall_window: None,
            inspect_git: true,
            force: false,
        }
    }
}
