use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported when the interpreter or script could not be started.
pub const EXIT_SPAWN_FAILURE: i32 = -1;
/// Exit code reported when the deadline elapsed before the process exited.
pub const EXIT_TIMEOUT: i32 = -2;

/// Ways a single run can fail before producing an exit status.
///
/// These never escape the runner: they are folded into a `RunResult`.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("script file not found: {}", path.display())]
    ScriptNotFound { path: PathBuf },

    #[error("execution failed: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("execution timed out")]
    Timeout { after: Duration },

    #[error("execution failed: could not wait for `{program}`: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Timeout { .. } => EXIT_TIMEOUT,
            Self::ScriptNotFound { .. } | Self::Spawn { .. } | Self::Wait { .. } => {
                EXIT_SPAWN_FAILURE
            }
        }
    }
}
