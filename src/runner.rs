use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::{Instrument, debug, warn};

use crate::error::{EXIT_SPAWN_FAILURE, EXIT_TIMEOUT, RunError};
use crate::quote;

/// Timeout applied when the caller does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Result of executing a command: captured output + metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}

/// Why a run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SpawnFailure,
    Timeout,
    NonZeroExit,
}

impl RunResult {
    fn from_exit(exit_code: i32, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            succeeded: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            elapsed,
        }
    }

    /// Fold a runner failure into a result record.
    pub fn from_error(err: &RunError, elapsed: Duration) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: err.to_string(),
            exit_code: err.exit_code(),
            elapsed,
        }
    }

    /// Classify a failed run. Reserved codes win over the raw exit status.
    pub fn failure(&self) -> Option<FailureKind> {
        if self.succeeded {
            return None;
        }
        Some(match self.exit_code {
            EXIT_TIMEOUT => FailureKind::Timeout,
            EXIT_SPAWN_FAILURE => FailureKind::SpawnFailure,
            _ => FailureKind::NonZeroExit,
        })
    }
}

/// Interpreter dialect: decides argument prefixes and quoting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[value(name = "powershell")]
    PowerShell,
    Sh,
}

impl Flavor {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Sh
        }
    }

    fn default_program(self) -> &'static str {
        match self {
            Self::PowerShell => "powershell",
            Self::Sh => "sh",
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PowerShell => write!(f, "powershell"),
            Self::Sh => write!(f, "sh"),
        }
    }
}

/// The external program commands and scripts are handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub flavor: Flavor,
    pub program: String,
}

impl Interpreter {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            program: flavor.default_program().to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments that make the interpreter evaluate `command`.
    pub fn command_args(&self, command: &str) -> Vec<String> {
        match self.flavor {
            Flavor::PowerShell => vec!["-NoProfile".into(), "-Command".into(), command.into()],
            Flavor::Sh => vec!["-c".into(), command.into()],
        }
    }

    /// Arguments that make the interpreter run the script at `path`.
    pub fn script_args(&self, path: &Path, args: &[String]) -> Vec<String> {
        let mut out: Vec<String> = match self.flavor {
            Flavor::PowerShell => vec![
                "-NoProfile".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-File".into(),
            ],
            Flavor::Sh => Vec::new(),
        };
        out.push(path.display().to_string());
        out.extend(args.iter().cloned());
        out
    }

    /// One-shot reachability probe that prints `True` or `False`.
    pub fn reachability_command(&self, hostname: &str) -> String {
        let host = quote::quote(self.flavor, hostname);
        match self.flavor {
            Flavor::PowerShell => format!("Test-Connection -ComputerName {host} -Count 1 -Quiet"),
            Flavor::Sh => {
                format!("ping -c 1 -W 1 {host} >/dev/null 2>&1 && echo True || echo False")
            }
        }
    }

    /// Cheap command proving the interpreter starts and evaluates input.
    pub fn self_test_command(&self) -> &'static str {
        match self.flavor {
            Flavor::PowerShell => "$PSVersionTable.PSVersion.ToString()",
            Flavor::Sh => "echo ok",
        }
    }

    /// Full command line, quoted for this interpreter. Used for logs and display.
    pub fn display(&self, args: &[String]) -> String {
        let mut line = quote::quote(self.flavor, &self.program);
        if !args.is_empty() {
            line.push(' ');
            line.push_str(&quote::join(self.flavor, args));
        }
        line
    }
}

/// Runs commands and scripts through an interpreter with a deadline.
///
/// Calls are independent: each owns its child process and drain tasks, so a
/// runner can be cloned and used from many tasks at once.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    interpreter: Interpreter,
    default_timeout: Duration,
}

struct Completed {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl CommandRunner {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Evaluate a command string in the interpreter.
    pub async fn execute_command(&self, command: &str, timeout: Option<Duration>) -> RunResult {
        let args = self.interpreter.command_args(command);
        self.run(args, timeout).await
    }

    /// Run a script file with arguments. A missing file fails without spawning.
    pub async fn execute_script(
        &self,
        path: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> RunResult {
        if !path.is_file() {
            let err = RunError::ScriptNotFound {
                path: path.to_path_buf(),
            };
            warn!(script = %path.display(), "{err}");
            return RunResult::from_error(&err, Duration::ZERO);
        }
        let args = self.interpreter.script_args(path, args);
        self.run(args, timeout).await
    }

    /// Probe a host once. True only when the probe ran and printed `True`.
    ///
    /// Names that are empty or start with `-` would reach the probe as an
    /// option, so they are refused without spawning.
    pub async fn test_connection(&self, hostname: &str) -> bool {
        if hostname.is_empty() || hostname.starts_with('-') {
            warn!(host = hostname, "refusing to probe host name that looks like an option");
            return false;
        }
        let command = self.interpreter.reachability_command(hostname);
        let result = self.execute_command(&command, None).await;
        result.succeeded && result.stdout.trim().eq_ignore_ascii_case("true")
    }

    async fn run(&self, args: Vec<String>, timeout: Option<Duration>) -> RunResult {
        let deadline = timeout.unwrap_or(self.default_timeout);
        let span = tracing::info_span!(
            "runner.exec",
            program = %self.interpreter.program,
            command_line = %self.interpreter.display(&args),
            exit_code = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let start = Instant::now();
        let outcome = self.spawn_and_wait(&args, deadline).instrument(span.clone()).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(done) => RunResult::from_exit(done.exit_code, done.stdout, done.stderr, elapsed),
            Err(err) => {
                let _enter = span.enter();
                match &err {
                    RunError::Timeout { after } => {
                        warn!(timeout_ms = after.as_millis() as u64, "{err}")
                    }
                    RunError::Spawn { program, .. } | RunError::Wait { program, .. } => {
                        warn!(%program, "{err}")
                    }
                    RunError::ScriptNotFound { .. } => warn!("{err}"),
                }
                RunResult::from_error(&err, elapsed)
            }
        };

        span.record("exit_code", result.exit_code);
        span.record("duration_ms", elapsed.as_millis() as u64);
        result
    }

    /// Spawn the interpreter, drain both pipes on their own tasks and race
    /// exit + drains against the deadline.
    async fn spawn_and_wait(&self, args: &[String], deadline: Duration) -> Result<Completed, RunError> {
        let program = &self.interpreter.program;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
        let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

        let finished = tokio::time::timeout(deadline, async {
            tokio::join!(child.wait(), &mut stdout_task, &mut stderr_task)
        })
        .await;

        match finished {
            Ok((status, stdout, stderr)) => {
                let status = status.map_err(|source| RunError::Wait {
                    program: program.clone(),
                    source,
                })?;
                debug!(status = %status, "process exited");
                Ok(Completed {
                    exit_code: exit_code_of(status),
                    stdout: into_text("stdout", stdout),
                    stderr: into_text("stderr", stderr),
                })
            }
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                if let Err(e) = child.kill().await {
                    debug!("kill after timeout failed: {e}");
                }
                Err(RunError::Timeout { after: deadline })
            }
        }
    }
}

/// Exit code of a process that ran. A signal death maps to `128 + signal`,
/// as shells report it, so it never collides with the reserved codes.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Read a pipe to EOF. A missing pipe yields no output.
async fn drain<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn into_text(stream: &str, joined: Result<std::io::Result<Vec<u8>>, JoinError>) -> String {
    match joined {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!(stream, "read failed: {e}");
            String::new()
        }
        Err(e) => {
            warn!(stream, "drain task failed: {e}");
            String::new()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;

    fn sh() -> CommandRunner {
        CommandRunner::new(Interpreter::new(Flavor::Sh))
    }

    /// An interpreter that answers `True` to anything it is asked.
    fn always_true(dir: &tempfile::TempDir) -> CommandRunner {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("always-true");
        std::fs::write(&path, "#!/bin/sh\necho True\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        CommandRunner::new(Interpreter::new(Flavor::Sh).with_program(path.display().to_string()))
    }

    #[tokio::test]
    async fn test_exit_zero_succeeds() {
        let result = sh().execute_command("echo hello", None).await;
        assert!(result.succeeded);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.stderr.is_empty());
        assert_eq!(result.failure(), None);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let result = sh().execute_command("echo oops >&2; exit 42", None).await;
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, 42);
        assert_eq!(result.stderr.trim(), "oops");
        assert_eq!(result.failure(), Some(FailureKind::NonZeroExit));
    }

    #[tokio::test]
    async fn test_signal_death_is_nonzero_exit() {
        let result = sh().execute_command("echo started; kill -9 $$", None).await;
        assert!(!result.succeeded);
        assert_eq!(result.stdout, "started\n");
        assert_eq!(result.exit_code, 128 + 9);
        assert_eq!(result.failure(), Some(FailureKind::NonZeroExit));
    }

    #[tokio::test]
    async fn test_timeout_returns_near_deadline() {
        let start = Instant::now();
        let result = sh()
            .execute_command("sleep 10", Some(Duration::from_millis(300)))
            .await;
        let took = start.elapsed();

        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
        assert!(result.stderr.contains("timed out"));
        assert_eq!(result.failure(), Some(FailureKind::Timeout));
        assert!(took >= Duration::from_millis(300));
        assert!(took < Duration::from_secs(5), "took {took:?}");
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let runner = sh().with_default_timeout(Duration::from_millis(200));
        let result = runner.execute_command("sleep 10", None).await;
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_script_does_not_spawn() {
        // A bogus interpreter proves nothing is spawned: a spawn would fail
        // with "execution failed" instead of the not-found message.
        let runner = CommandRunner::new(
            Interpreter::new(Flavor::Sh).with_program("/nonexistent/interpreter"),
        );
        let result = runner
            .execute_script(Path::new("/nonexistent/deploy.sh"), &[], None)
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_SPAWN_FAILURE);
        assert!(result.stderr.contains("script file not found"));
        assert_eq!(result.elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let runner = CommandRunner::new(
            Interpreter::new(Flavor::Sh).with_program("/nonexistent/interpreter"),
        );
        let result = runner.execute_command("echo hi", None).await;
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, EXIT_SPAWN_FAILURE);
        assert!(result.stderr.starts_with("execution failed"));
        assert_eq!(result.failure(), Some(FailureKind::SpawnFailure));
    }

    #[tokio::test]
    async fn test_script_receives_arguments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "echo \"mode=$1 tables=$2\"\nexit 3").unwrap();

        let args = vec!["-TestMode".to_string(), "t1 t2".to_string()];
        let result = sh().execute_script(file.path(), &args, None).await;
        assert_eq!(result.stdout.trim(), "mode=-TestMode tables=t1 t2");
        assert_eq!(result.exit_code, 3);
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams() {
        // 1 MiB on each stream, well past a 64 KiB pipe buffer.
        let cmd = "head -c 1048576 /dev/zero | tr '\\0' a; head -c 1048576 /dev/zero | tr '\\0' b >&2";
        let result = sh()
            .execute_command(cmd, Some(Duration::from_secs(30)))
            .await;
        assert!(result.succeeded, "{}", result.stderr);
        assert_eq!(result.stdout.len(), 1_048_576);
        assert_eq!(result.stderr.len(), 1_048_576);
        assert!(result.stdout.bytes().all(|b| b == b'a'));
        assert!(result.stderr.bytes().all(|b| b == b'b'));
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_interfere() {
        let runner = sh();
        let a = runner.execute_command("for i in 1 2 3; do echo a$i; sleep 0.05; done", None);
        let b = runner.execute_command("for i in 1 2 3; do echo b$i; sleep 0.05; done; exit 1", None);
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.stdout, "a1\na2\na3\n");
        assert!(a.succeeded);
        assert_eq!(b.stdout, "b1\nb2\nb3\n");
        assert_eq!(b.exit_code, 1);
    }

    #[tokio::test]
    async fn test_elapsed_measured() {
        let result = sh().execute_command("sleep 0.2", None).await;
        assert!(result.succeeded);
        assert!(result.elapsed >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_connection_false_when_interpreter_missing() {
        let runner = CommandRunner::new(
            Interpreter::new(Flavor::Sh).with_program("/nonexistent/interpreter"),
        );
        assert!(!runner.test_connection("table-01").await);
    }

    #[tokio::test]
    async fn test_connection_refuses_option_like_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = always_true(&dir);
        assert!(runner.test_connection("table-01").await);
        assert!(!runner.test_connection("-f").await);
        assert!(!runner.test_connection("").await);
    }

    #[test]
    fn test_powershell_args() {
        let ps = Interpreter::new(Flavor::PowerShell);
        assert_eq!(ps.program, "powershell");
        assert_eq!(ps.command_args("Get-Date"), vec!["-NoProfile", "-Command", "Get-Date"]);
        let args = ps.script_args(Path::new("NetworkDeploy.ps1"), &["-TestMode".into()]);
        assert_eq!(
            args,
            vec!["-NoProfile", "-ExecutionPolicy", "Bypass", "-File", "NetworkDeploy.ps1", "-TestMode"]
        );
    }

    #[test]
    fn test_reachability_command_quotes_host() {
        let ps = Interpreter::new(Flavor::PowerShell);
        assert_eq!(
            ps.reachability_command("table 01"),
            "Test-Connection -ComputerName 'table 01' -Count 1 -Quiet"
        );
        let sh = Interpreter::new(Flavor::Sh);
        assert!(sh.reachability_command("a;b").contains("'a;b'"));
    }

    #[test]
    fn test_display_quotes_args() {
        let sh = Interpreter::new(Flavor::Sh);
        assert_eq!(sh.display(&["-c".into(), "echo hi".into()]), "sh -c 'echo hi'");
    }
}
