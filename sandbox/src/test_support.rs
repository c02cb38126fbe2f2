//! Test-only helpers: task constructors and a scripted interpreter.

use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::Task;
use crate::io::config::SandboxConfig;
use crate::io::interpreter::{Interpreter, RunRequest};
use crate::io::process::CommandOutput;

/// Create a task with the given fields.
pub fn task(id: &str, code: &str, testcase: &str) -> Task {
    Task::new(id, code, testcase)
}

/// Default config whose workspaces live under a private temp dir.
///
/// Keep the returned `TempDir` alive for as long as the config is used.
pub fn scratch_config() -> (TempDir, SandboxConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = SandboxConfig {
        workspace_root: Some(temp.path().join("workspaces")),
        ..SandboxConfig::default()
    };
    (temp, config)
}

/// Interpreter that replays queued outputs and records every request.
#[derive(Default)]
pub struct ScriptedInterpreter {
    outputs: Mutex<VecDeque<Result<CommandOutput>>>,
    requests: Mutex<Vec<RunRequest>>,
    inspect_workspace: bool,
    seen_files: Mutex<Vec<String>>,
}

impl ScriptedInterpreter {
    pub fn new(outputs: Vec<Result<CommandOutput>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            ..Self::default()
        }
    }

    /// Also record the file names present in the workspace at run time.
    pub fn inspecting_workspace(mut self) -> Self {
        self.inspect_workspace = true;
        self
    }

    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn seen_files(&self) -> Vec<String> {
        self.seen_files.lock().expect("seen files lock").clone()
    }
}

impl Interpreter for ScriptedInterpreter {
    fn run(&self, request: &RunRequest) -> Result<CommandOutput> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if self.inspect_workspace {
            let mut seen = self.seen_files.lock().expect("seen files lock");
            for entry in fs::read_dir(&request.workdir)? {
                seen.push(entry?.file_name().to_string_lossy().to_string());
            }
        }
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted output left")))
    }
}
