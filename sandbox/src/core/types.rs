//! Task and result types exchanged with callers.
//!
//! The serialized shape of [`ExecutionResult`] is a stable contract with the
//! pipeline that consumes grades, so `exec_result` is always one of the strings
//! `"completed"`, `"timed out"` or `"failed: <message>"`.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// File stems the sandbox writes next to the candidate program.
pub const RESERVED_TASK_IDS: &[&str] = &["autograder", "harness", "bootstrap"];

/// One grading job: a candidate program and the harness it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Correlation key, also used as the candidate's file stem (`<id>.py`).
    pub id: String,
    /// Candidate program source.
    pub code: String,
    /// Harness source defining `test_passed()`.
    pub testcase: String,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        testcase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            testcase: testcase.into(),
        }
    }
}

/// Check that a task id can be used as an importable file stem.
pub fn validate_task_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("task id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("task id {id:?} must not contain path separators");
    }
    if id.contains("..") {
        bail!("task id {id:?} must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        bail!("task id {id:?} must use [A-Za-z0-9_-] only");
    }
    if RESERVED_TASK_IDS.contains(&id) {
        bail!("task id {id:?} collides with a sandbox file name");
    }
    Ok(())
}

/// How a task's execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ExecResult {
    Completed,
    TimedOut,
    Failed(String),
}

impl fmt::Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecResult::Completed => f.write_str("completed"),
            ExecResult::TimedOut => f.write_str("timed out"),
            ExecResult::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl FromStr for ExecResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(ExecResult::Completed),
            "timed out" => Ok(ExecResult::TimedOut),
            _ => match s.strip_prefix("failed:") {
                Some(reason) => Ok(ExecResult::Failed(
                    reason.strip_prefix(' ').unwrap_or(reason).to_string(),
                )),
                None => bail!("unknown exec_result {s:?}"),
            },
        }
    }
}

impl From<ExecResult> for String {
    fn from(value: ExecResult) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ExecResult {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// The single result produced for every task.
///
/// `text` carries the captured combined output only when the task completed;
/// every other outcome scores zero with empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exec_result: ExecResult,
    pub score: f64,
    pub text: String,
}

impl ExecutionResult {
    pub fn completed(score: f64, text: impl Into<String>) -> Self {
        Self {
            exec_result: ExecResult::Completed,
            score,
            text: text.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exec_result: ExecResult::TimedOut,
            score: 0.0,
            text: String::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            exec_result: ExecResult::Failed(reason.into()),
            score: 0.0,
            text: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_result_serializes_as_pipeline_strings() {
        let completed = serde_json::to_value(ExecutionResult::completed(1.0, "ok")).expect("json");
        assert_eq!(completed["exec_result"], "completed");

        let timed_out = serde_json::to_value(ExecutionResult::timed_out()).expect("json");
        assert_eq!(timed_out["exec_result"], "timed out");
        assert_eq!(timed_out["score"], 0.0);
        assert_eq!(timed_out["text"], "");

        let failed = serde_json::to_value(ExecutionResult::failed("boom")).expect("json");
        assert_eq!(failed["exec_result"], "failed: boom");
    }

    #[test]
    fn exec_result_parses_failed_reason() {
        let parsed: ExecResult = "failed: name 'x' is not defined".parse().expect("parse");
        assert_eq!(
            parsed,
            ExecResult::Failed("name 'x' is not defined".to_string())
        );
        let empty: ExecResult = "failed: ".parse().expect("parse");
        assert_eq!(empty, ExecResult::Failed(String::new()));
    }

    #[test]
    fn exec_result_rejects_unknown_strings() {
        let err = "crashed".parse::<ExecResult>().expect_err("unknown");
        assert!(err.to_string().contains("unknown exec_result"));
    }

    #[test]
    fn accepts_plain_task_ids() {
        validate_task_id("lsn25_contactlist").expect("valid");
        validate_task_id("Problem-7").expect("valid");
    }

    #[test]
    fn rejects_unsafe_task_ids() {
        assert!(validate_task_id("").is_err());
        assert!(validate_task_id("../etc").is_err());
        assert!(validate_task_id("a/b").is_err());
        assert!(validate_task_id("has space").is_err());
        assert!(validate_task_id("autograder").is_err());
    }
}
