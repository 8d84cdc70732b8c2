use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::runner::Flavor;

#[derive(Parser)]
#[command(
    name = "gtm",
    version,
    about = "Run table-fleet commands and scripts through PowerShell or sh, with timeouts"
)]
pub struct Cli {
    /// Interpreter to use (overrides config)
    #[arg(long, global = true, value_enum)]
    pub interpreter: Option<Flavor>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a command string in the interpreter
    Exec {
        /// Timeout in seconds (default: config `timeout_secs`)
        #[arg(short, long)]
        timeout: Option<u64>,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Run a script file with arguments, e.g. `gtm script NetworkDeploy.ps1 -TestMode`
    Script {
        /// Timeout in seconds (default: config `timeout_secs`)
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Path to the script
        path: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Check which tables answer a single ping
    Ping {
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Verify the interpreter starts and evaluates a command
    Check,

    /// Show interpreter and current config
    Info,

    /// Generate a default .gtm.toml config file
    Init {
        /// Generate in ~/.config/gtm/ instead of current directory
        #[arg(long)]
        global: bool,
    },
}
