//! The record a worker writes back to the supervisor.
//!
//! The bootstrap script emits exactly one line `REPORT_MARKER{json}` on the
//! child's real stdout after the harness finishes. The parent reads the first
//! such line and ignores anything after it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::score::parse_score;
use crate::core::types::ExecutionResult;

/// Line prefix that marks the worker's report.
pub const REPORT_MARKER: &str = "@@sandbox-report@@ ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChildReport {
    /// The harness ran to completion; `text` is its combined stdout/stderr.
    Completed { text: String },
    /// The worker's own alarm fired before the harness finished.
    TimedOut,
    /// The harness raised; `reason` is the exception message.
    Failed { reason: String },
}

impl ChildReport {
    /// Convert into the caller-facing result, scoring completed output.
    pub fn into_result(self) -> ExecutionResult {
        match self {
            ChildReport::Completed { text } => match parse_score(&text) {
                Ok(score) => ExecutionResult::completed(score, text),
                Err(err) => ExecutionResult::failed(format!("{err:#}")),
            },
            ChildReport::TimedOut => ExecutionResult::timed_out(),
            ChildReport::Failed { reason } => ExecutionResult::failed(reason),
        }
    }
}

/// Find the first report line in captured worker stdout.
///
/// `None` means the worker never reported. `Some(Err(_))` means a marker line
/// was present but its payload did not parse.
pub fn find_report(stdout: &[u8]) -> Option<Result<ChildReport>> {
    let stdout = String::from_utf8_lossy(stdout);
    let payload = stdout
        .lines()
        .find_map(|line| line.strip_prefix(REPORT_MARKER))?;
    Some(serde_json::from_str(payload).context("malformed worker report"))
}

/// Resolve captured worker stdout into exactly one result.
///
/// A worker that exited or was killed without reporting is treated as timed
/// out, never left unresolved.
pub fn resolve_result(stdout: &[u8]) -> ExecutionResult {
    match find_report(stdout) {
        Some(Ok(report)) => report.into_result(),
        Some(Err(err)) => ExecutionResult::failed(format!("{err:#}")),
        None => ExecutionResult::timed_out(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecResult;

    fn line(json: &str) -> Vec<u8> {
        format!("{REPORT_MARKER}{json}\n").into_bytes()
    }

    #[test]
    fn nan_score_fails_the_task() {
        let stdout = line(r#"{"status":"completed","text":"Unit Test Returned: nan\n"}"#);
        let result = resolve_result(&stdout);
        assert!(matches!(
            result.exec_result,
            ExecResult::Failed(ref reason) if reason.contains("finite")
        ));
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn completed_report_is_scored() {
        let stdout = line(r#"{"status":"completed","text":"hi\nUnit Test Returned: 0.75\n"}"#);
        let result = resolve_result(&stdout);
        assert_eq!(result.exec_result, ExecResult::Completed);
        assert_eq!(result.score, 0.75);
        assert!(result.text.contains("Unit Test Returned: 0.75"));
    }

    #[test]
    fn unparseable_score_becomes_failure() {
        let stdout = line(r#"{"status":"completed","text":"Unit Test Returned: True\n"}"#);
        let result = resolve_result(&stdout);
        assert!(matches!(
            result.exec_result,
            ExecResult::Failed(ref reason) if reason.contains("True")
        ));
        assert_eq!(result.score, 0.0);
        assert!(result.text.is_empty());
    }

    #[test]
    fn failed_report_keeps_reason() {
        let stdout = line(r#"{"status":"failed","reason":"invalid syntax (harness.py, line 1)"}"#);
        let result = resolve_result(&stdout);
        assert_eq!(
            result.exec_result.to_string(),
            "failed: invalid syntax (harness.py, line 1)"
        );
    }

    #[test]
    fn missing_report_defaults_to_timed_out() {
        let result = resolve_result(b"Traceback (most recent call last):\n");
        assert_eq!(result, ExecutionResult::timed_out());
    }

    #[test]
    fn only_first_report_is_read() {
        let mut stdout = b"noise\n".to_vec();
        stdout.extend(line(r#"{"status":"timed_out"}"#));
        stdout.extend(line(r#"{"status":"completed","text":"Unit Test Returned: 1.0"}"#));
        assert_eq!(resolve_result(&stdout), ExecutionResult::timed_out());
    }

    #[test]
    fn malformed_report_is_a_failure() {
        let result = resolve_result(&line(r#"{"status":"completed","te"#));
        assert!(matches!(
            result.exec_result,
            ExecResult::Failed(ref reason) if reason.starts_with("malformed worker report")
        ));
    }
}
