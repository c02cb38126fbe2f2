//! Orchestration for grading a single task.
//!
//! The supervisor is the failure boundary: whatever goes wrong while a task
//! runs, the caller gets back exactly one [`ExecutionResult`] and never an
//! error.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::harness::{HELPER_MODULE, compile_harness};
use crate::core::report::resolve_result;
use crate::core::state::TaskState;
use crate::core::types::{ExecutionResult, Task, validate_task_id};
use crate::io::config::SandboxConfig;
use crate::io::guard::{BootstrapParams, child_env, render_bootstrap};
use crate::io::interpreter::{Interpreter, PythonInterpreter, RunRequest};
use crate::io::workspace::Workspace;

const HELPER_SOURCE: &str = include_str!("io/python/autograder.py");

pub const HARNESS_FILE: &str = "harness.py";
pub const BOOTSTRAP_FILE: &str = "bootstrap.py";

/// Grade `task` with a fresh `python` worker, waiting at most
/// `timeout_secs + kill_grace_secs` seconds.
pub fn check_correctness(
    task: &Task,
    timeout_secs: f64,
    config: &SandboxConfig,
) -> ExecutionResult {
    let deadline = match deadline_from_secs(timeout_secs) {
        Ok(deadline) => deadline,
        Err(err) => return ExecutionResult::failed(format!("{err:#}")),
    };
    Supervisor::from_config(config.clone()).check(task, deadline)
}

/// Convert a caller-supplied timeout into a deadline.
pub fn deadline_from_secs(timeout_secs: f64) -> Result<Duration> {
    if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
        bail!("timeout must be a positive number of seconds, got {timeout_secs}");
    }
    Duration::try_from_secs_f64(timeout_secs).context("timeout out of range")
}

/// Runs tasks one worker process at a time.
///
/// A `Supervisor` holds no per-task state, so one value can be shared by
/// several threads grading different tasks concurrently.
#[derive(Debug, Clone)]
pub struct Supervisor<I: Interpreter> {
    interpreter: I,
    config: SandboxConfig,
}

impl Supervisor<PythonInterpreter> {
    pub fn from_config(config: SandboxConfig) -> Self {
        let interpreter = PythonInterpreter::new(config.python.clone());
        Self::new(interpreter, config)
    }
}

impl<I: Interpreter> Supervisor<I> {
    pub fn new(interpreter: I, config: SandboxConfig) -> Self {
        Self {
            interpreter,
            config,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Grade `task`, returning exactly one result.
    #[instrument(skip_all, fields(task_id = %task.id, deadline_ms = deadline.as_millis() as u64))]
    pub fn check(&self, task: &Task, deadline: Duration) -> ExecutionResult {
        let started = Instant::now();
        let mut state = TaskState::Pending;
        state = advance_or_stay(state, TaskState::Running);

        let result = match self.try_check(task, deadline) {
            Ok(result) => result,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "task could not be executed");
                ExecutionResult::failed(format!("{err:#}"))
            }
        };

        state = advance_or_stay(state, TaskState::from(&result.exec_result));
        info!(
            state = ?state,
            score = result.score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );
        result
    }

    fn try_check(&self, task: &Task, deadline: Duration) -> Result<ExecutionResult> {
        validate_task_id(&task.id)?;
        if deadline.is_zero() {
            bail!("deadline must be positive");
        }

        let grace = self.config.kill_grace()?;

        let workspace = Workspace::create(&self.config.workspace_base(), &task.id)
            .context("create workspace")?;
        self.materialize(&workspace, task, deadline)?;

        let request = RunRequest {
            workdir: workspace.path().to_path_buf(),
            script: BOOTSTRAP_FILE.to_string(),
            timeout: deadline.saturating_add(grace),
            output_limit_bytes: report_capture_limit(self.config.output_limit_bytes),
            env: child_env(std::env::var("PATH").ok().as_deref()),
        };
        let output = self.interpreter.run(&request).context("run worker")?;
        if output.timed_out {
            warn!("worker outlived its deadline and was killed");
        }
        if !output.stderr.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "worker stderr");
        }

        let result = resolve_result(&output.stdout);

        if let Err(err) = workspace.close() {
            warn!(err = %format!("{err:#}"), "workspace cleanup failed");
        }
        Ok(result)
    }

    fn materialize(&self, workspace: &Workspace, task: &Task, deadline: Duration) -> Result<()> {
        workspace.write_file(&candidate_file_name(&task.id), &task.code)?;
        workspace.write_file(&format!("{HELPER_MODULE}.py"), HELPER_SOURCE)?;
        workspace.write_file(HARNESS_FILE, &compile_harness(&task.testcase))?;
        let bootstrap = render_bootstrap(&BootstrapParams {
            policy: &self.config.guard,
            harness_file: HARNESS_FILE,
            deadline,
            text_limit_chars: self.config.output_limit_bytes / 4,
        })?;
        workspace.write_file(BOOTSTRAP_FILE, &bootstrap)?;
        debug!(workspace = %workspace.path().display(), "task files written");
        Ok(())
    }
}

pub fn candidate_file_name(task_id: &str) -> String {
    format!("{task_id}.py")
}

/// Stdout capture bound for the worker's report line.
///
/// The report carries up to `output_limit_bytes` of harness output as a JSON
/// string; escaping can grow it, so the pipe bound leaves room for that.
fn report_capture_limit(output_limit_bytes: usize) -> usize {
    output_limit_bytes.saturating_mul(6).saturating_add(64 * 1024)
}

fn advance_or_stay(state: TaskState, next: TaskState) -> TaskState {
    match state.advance(next) {
        Ok(next) => next,
        Err(err) => {
            warn!(err = %err, "unexpected task state transition");
            state
        }
    }
}
