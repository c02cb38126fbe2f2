//! Interpreter abstraction for worker processes.
//!
//! The [`Interpreter`] trait decouples the supervisor from the actual runtime
//! (currently a `python3` process). Tests use scripted interpreters that return
//! predetermined output without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for one worker run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Working directory of the worker (the task's workspace).
    pub workdir: PathBuf,
    /// Script to execute, relative to `workdir`.
    pub script: String,
    /// Supervisory deadline after which the worker is killed.
    pub timeout: Duration,
    /// Bound on captured stdout/stderr, per stream.
    pub output_limit_bytes: usize,
    /// Complete environment of the worker; nothing is inherited.
    pub env: Vec<(String, String)>,
}

/// Abstraction over worker runtimes.
pub trait Interpreter {
    /// Run `request.script` to completion or until `request.timeout` elapses.
    fn run(&self, request: &RunRequest) -> Result<CommandOutput>;
}

/// Runs workers with a CPython interpreter.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    program: String,
}

impl PythonInterpreter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Interpreter for PythonInterpreter {
    #[instrument(skip_all, fields(program = %self.program, workdir = %request.workdir.display()))]
    fn run(&self, request: &RunRequest) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        // -E/-s: ignore PYTHON* variables and user site-packages.
        // -B: no bytecode files in the workspace. -X utf8: stdio is UTF-8.
        cmd.arg("-E")
            .arg("-s")
            .arg("-B")
            .arg("-X")
            .arg("utf8")
            .arg(&request.script)
            .current_dir(&request.workdir)
            .env_clear()
            .envs(request.env.iter().map(|(key, value)| (key, value)));

        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {} {}", self.program, request.script))?;
        debug!(
            exit_code = ?output.exit_code,
            timed_out = output.timed_out,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "worker exited"
        );
        Ok(output)
    }
}
