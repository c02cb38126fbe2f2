//! Result records and their JSON Lines persistence.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sandbox::{ExecResult, ExecutionResult, Task};

/// One graded task, as written to a results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedTask {
    pub id: String,
    pub exec_result: ExecResult,
    pub score: f64,
    pub text: String,
    /// SHA-256 of the harness source, to spot results graded against a changed harness.
    pub testcase_sha256: String,
    pub duration_secs: f64,
    pub graded_at: String,
}

impl GradedTask {
    pub fn new(
        task: &Task,
        result: ExecutionResult,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration = finished_at - started_at;
        Self {
            id: task.id.clone(),
            exec_result: result.exec_result,
            score: result.score,
            text: result.text,
            testcase_sha256: testcase_sha256(&task.testcase),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            graded_at: finished_at.to_rfc3339(),
        }
    }
}

pub fn testcase_sha256(testcase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(testcase.as_bytes());
    hex::encode(hasher.finalize())
}

/// Write records as JSON Lines.
pub fn write_results<W: Write>(mut writer: W, records: &[GradedTask]) -> Result<()> {
    for record in records {
        let line = serde_json::to_string(record).context("serialize result")?;
        writeln!(writer, "{line}").context("write result")?;
    }
    writer.flush().context("flush results")?;
    Ok(())
}

/// Read a results file, collecting unparseable lines as warnings.
pub fn read_results(path: &Path) -> Result<(Vec<GradedTask>, Vec<String>)> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<GradedTask>(line) {
            Ok(record) => records.push(record),
            Err(err) => warnings.push(format!("skip line {}: {err}", index + 1)),
        }
    }
    Ok((records, warnings))
}
