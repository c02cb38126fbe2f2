//! Task file parsing and validation.
//!
//! Task files are JSON Lines: one `{id, code, testcase}` object per line.
//! Extra fields (prompt, model, ...) from upstream pipelines are ignored.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use sandbox::Task;
use sandbox::core::types::validate_task_id;
use serde_json::Value;

const TASK_SCHEMA: &str = include_str!("../../schemas/task/v1.schema.json");

/// Load and validate every task in a JSON Lines file.
///
/// Blank lines are skipped. Errors name the offending line. Duplicate ids are
/// rejected because ids correlate results with tasks.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tasks {}", path.display()))?;
    parse_tasks(&contents).with_context(|| format!("parse tasks {}", path.display()))
}

pub fn parse_tasks(contents: &str) -> Result<Vec<Task>> {
    let validator = task_validator()?;
    let mut tasks = Vec::new();
    let mut seen = BTreeSet::new();
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let task = parse_task_line(&validator, line).with_context(|| format!("line {line_no}"))?;
        if !seen.insert(task.id.clone()) {
            bail!("line {line_no}: duplicate task id {}", task.id);
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn parse_task_line(validator: &Validator, line: &str) -> Result<Task> {
    let value: Value = serde_json::from_str(line).context("parse task json")?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    let task: Task = serde_json::from_value(value).context("parse task fields")?;
    validate_task_id(&task.id)?;
    Ok(task)
}

fn task_validator() -> Result<Validator> {
    let schema: Value = serde_json::from_str(TASK_SCHEMA).context("parse task schema")?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile task schema")
}
