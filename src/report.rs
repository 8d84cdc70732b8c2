//! Turning run results into what the user sees: truncated output, a footer
//! and one-line status messages.

use crate::config::Config;
use crate::runner::{FailureKind, RunResult};

/// Format a one-line footer with timing and exit code.
pub fn footer(label: &str, result: &RunResult) -> String {
    let status = match result.failure() {
        None => "ok",
        Some(FailureKind::NonZeroExit) => "FAIL",
        Some(FailureKind::Timeout) => "TIMEOUT",
        Some(FailureKind::SpawnFailure) => "SPAWN",
    };
    format!(
        "[{label}] {status} ({}ms, exit {})",
        result.elapsed.as_millis(),
        result.exit_code
    )
}

/// Status line for a caller action: `ok` on success, otherwise
/// `<failed>: <first stderr line>` (or the exit code when stderr is empty).
pub fn status_message(ok: &str, failed: &str, result: &RunResult) -> String {
    if result.succeeded {
        return ok.to_string();
    }
    let reason = first_line(&result.stderr)
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit code {}", result.exit_code));
    format!("{failed}: {reason}")
}

/// Full report for one run: stdout, stderr, then the footer.
pub fn render(label: &str, result: &RunResult, cfg: &Config) -> String {
    let mut sections = Vec::new();
    if !result.stdout.trim().is_empty() {
        sections.push(truncate_with(&result.stdout, cfg.max_lines, cfg.max_line_len));
    }
    if !result.stderr.trim().is_empty() {
        sections.push(truncate_with(&result.stderr, cfg.max_lines, cfg.max_line_len));
    }
    if cfg.show_footer {
        sections.push(footer(label, result));
    }
    sections.join("\n")
}

/// Cap total lines and per-line length (in characters).
pub fn truncate_with(raw: &str, max_lines: usize, max_line_len: usize) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let total = lines.len();
    let mut out = Vec::with_capacity(max_lines.min(total) + 1);

    for line in lines.iter().take(max_lines) {
        match line.char_indices().nth(max_line_len) {
            Some((cut, _)) => out.push(format!("{} …", &line[..cut])),
            None => out.push(line.to_string()),
        }
    }

    if total > max_lines {
        out.push(format!(
            "\n[gtm] … {total} lines total, showing first {max_lines}"
        ));
    }
    out.join("\n")
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_TIMEOUT, RunError};
    use std::time::Duration;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> RunResult {
        RunResult {
            succeeded: exit_code == 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_footer_ok() {
        assert_eq!(footer("exec", &result(0, "", "")), "[exec] ok (12ms, exit 0)");
    }

    #[test]
    fn test_footer_failure_kinds() {
        assert_eq!(footer("exec", &result(3, "", "")), "[exec] FAIL (12ms, exit 3)");
        let timeout = RunResult::from_error(
            &RunError::Timeout {
                after: Duration::from_secs(1),
            },
            Duration::from_secs(1),
        );
        assert_eq!(footer("script", &timeout), "[script] TIMEOUT (1000ms, exit -2)");
        assert_eq!(timeout.exit_code, EXIT_TIMEOUT);
    }

    const OK: &str = "interpreter is working";
    const FAILED: &str = "interpreter test failed";

    #[test]
    fn test_status_message_success() {
        assert_eq!(status_message(OK, FAILED, &result(0, "done", "")), "interpreter is working");
    }

    #[test]
    fn test_status_message_uses_first_stderr_line() {
        let r = result(1, "", "\n  access denied\nstack trace");
        assert_eq!(status_message(OK, FAILED, &r), "interpreter test failed: access denied");
    }

    #[test]
    fn test_status_message_falls_back_to_exit_code() {
        assert_eq!(
            status_message(OK, FAILED, &result(7, "", "")),
            "interpreter test failed: exit code 7"
        );
    }

    #[test]
    fn test_status_message_timeout() {
        let r = result(EXIT_TIMEOUT, "", "execution timed out");
        assert_eq!(
            status_message(OK, FAILED, &r),
            "interpreter test failed: execution timed out"
        );
    }

    #[test]
    fn test_render_without_footer() {
        let cfg = Config {
            show_footer: false,
            ..Config::default()
        };
        assert_eq!(render("exec", &result(0, "hi\n", ""), &cfg), "hi");
    }

    #[test]
    fn test_render_sections_in_order() {
        let cfg = Config::default();
        let text = render("exec", &result(2, "out\n", "err\n"), &cfg);
        assert_eq!(text, "out\nerr\n[exec] FAIL (12ms, exit 2)");
    }

    #[test]
    fn test_truncate_respects_max_lines() {
        let raw = (0..200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let out = truncate_with(&raw, 150, 300);
        assert!(out.contains("200 lines total, showing first 150"));
        assert!(!out.contains("line 150"));
    }

    #[test]
    fn test_truncate_exact_limit_no_notice() {
        let raw = (0..150).map(|i| format!("L{i}")).collect::<Vec<_>>().join("\n");
        assert!(!truncate_with(&raw, 150, 300).contains("lines total"));
    }

    #[test]
    fn test_truncate_caps_long_lines() {
        let out = truncate_with("short\nthis_line_is_way_too_long_for_the_cap", 100, 10);
        assert!(out.contains("short"));
        assert!(out.contains("this_line_ …"));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let out = truncate_with(&"é".repeat(20), 10, 5);
        assert_eq!(out, "ééééé …");
    }
}
