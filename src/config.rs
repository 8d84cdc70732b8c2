use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner::{CommandRunner, Flavor, Interpreter};

/// Global + per-project configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interpreter dialect commands and scripts run under.
    pub interpreter: Flavor,
    /// Interpreter binary; `None` uses the dialect's default (`powershell`, `sh`).
    pub program: Option<String>,
    /// Default per-run timeout, in seconds.
    pub timeout_secs: u64,
    /// Max hosts `gtm ping` probes at once.
    pub max_parallel: usize,
    /// Maximum lines of each output stream before truncation.
    pub max_lines: usize,
    /// Maximum characters per line.
    pub max_line_len: usize,
    /// Show timing footer after each run.
    pub show_footer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpreter: Flavor::platform_default(),
            program: None,
            timeout_secs: 300,
            max_parallel: 8,
            max_lines: 150,
            max_line_len: 300,
            show_footer: true,
        }
    }
}

impl Config {
    /// Load config with priority: .gtm.toml (project) > ~/.config/gtm/config.toml (global) > defaults.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(path) = global_config_path()
            && let Some(global) = load_file(&path)
        {
            config = merge(config, global);
        }

        if let Some(project) = load_file(Path::new(PROJECT_FILE)) {
            config = merge(config, project);
        }

        config
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interpreter(&self) -> Interpreter {
        let interp = Interpreter::new(self.interpreter);
        match &self.program {
            Some(program) => interp.with_program(program.clone()),
            None => interp,
        }
    }

    pub fn runner(&self) -> CommandRunner {
        CommandRunner::new(self.interpreter()).with_default_timeout(self.default_timeout())
    }

    /// Generate a default config file content.
    pub fn default_toml() -> &'static str {
        r#"# gtm configuration
# Place in ~/.config/gtm/config.toml (global) or .gtm.toml (per-project)

# Interpreter dialect: "powershell" or "sh"
# interpreter = "powershell"

# Override the interpreter binary (e.g. "pwsh")
# program = "pwsh"

# Default timeout per command or script, in seconds
timeout_secs = 300

# Hosts probed at once by `gtm ping`
max_parallel = 8

# Truncation limits for printed output
max_lines = 150
max_line_len = 300

# Show timing footer after each run
show_footer = true
"#
    }
}

pub const PROJECT_FILE: &str = ".gtm.toml";

/// Partial config for TOML deserialization (all fields optional).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    interpreter: Option<Flavor>,
    program: Option<String>,
    timeout_secs: Option<u64>,
    max_parallel: Option<usize>,
    max_lines: Option<usize>,
    max_line_len: Option<usize>,
    show_footer: Option<bool>,
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gtm").join("config.toml"))
}

fn load_file(path: &Path) -> Option<PartialConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(partial) => Some(partial),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring invalid config: {e}");
            None
        }
    }
}

fn merge(base: Config, partial: PartialConfig) -> Config {
    Config {
        interpreter: partial.interpreter.unwrap_or(base.interpreter),
        program: partial.program.or(base.program),
        timeout_secs: partial.timeout_secs.unwrap_or(base.timeout_secs),
        max_parallel: partial.max_parallel.unwrap_or(base.max_parallel).max(1),
        max_lines: partial.max_lines.unwrap_or(base.max_lines),
        max_line_len: partial.max_line_len.unwrap_or(base.max_line_len),
        show_footer: partial.show_footer.unwrap_or(base.show_footer),
    }
}
