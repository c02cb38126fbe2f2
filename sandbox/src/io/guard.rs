//! Capability guard for worker processes.
//!
//! The guard has two halves. The parent builds the worker's environment from
//! an allow-list ([`child_env`]); the worker's bootstrap script, rendered here
//! from a [`GuardPolicy`], disables destructive operations inside the fresh
//! interpreter before the harness is loaded. Both only ever affect the one
//! worker process they are applied to.

use std::time::Duration;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::report::REPORT_MARKER;
use crate::io::config::GuardPolicy;

const BOOTSTRAP_TEMPLATE: &str = include_str!("templates/bootstrap.py.j2");

/// Shortest in-process alarm. `setitimer` treats zero as "disarm".
const MIN_ALARM_SECS: f64 = 0.001;

/// Builtins replaced with a stub that raises `PermissionError`.
pub const DISABLED_BUILTINS: &[&str] = &["exit", "quit", "help"];

/// `os` functions that mutate the filesystem, change identity, or signal processes.
pub const DISABLED_OS_FUNCTIONS: &[&str] = &[
    "kill",
    "killpg",
    "system",
    "putenv",
    "remove",
    "removedirs",
    "rmdir",
    "unlink",
    "rename",
    "renames",
    "replace",
    "truncate",
    "chmod",
    "fchmod",
    "lchmod",
    "chown",
    "fchown",
    "lchown",
    "lchflags",
    "chroot",
    "chdir",
    "fchdir",
    "getcwd",
    "setuid",
    "fork",
    "forkpty",
];

pub const DISABLED_SHUTIL_FUNCTIONS: &[&str] = &["rmtree", "move", "chown"];

/// Process-spawning `os` functions, disabled unless subprocesses are allowed.
pub const DISABLED_SPAWN_FUNCTIONS: &[&str] = &[
    "posix_spawn",
    "posix_spawnp",
    "spawnv",
    "spawnve",
    "spawnvp",
    "spawnvpe",
    "execv",
    "execve",
    "execvp",
    "execvpe",
];

/// Inputs for one worker's bootstrap script.
#[derive(Debug, Clone)]
pub struct BootstrapParams<'a> {
    pub policy: &'a GuardPolicy,
    /// File name of the compiled harness inside the workspace.
    pub harness_file: &'a str,
    /// In-process alarm for the harness run.
    pub deadline: Duration,
    /// Captured output beyond this many characters keeps only its tail.
    pub text_limit_chars: usize,
}

/// Render the worker bootstrap script for `params`.
pub fn render_bootstrap(params: &BootstrapParams<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("bootstrap", BOOTSTRAP_TEMPLATE)
        .context("load bootstrap template")?;
    let template = env.get_template("bootstrap")?;
    let policy = params.policy;
    let rendered = template
        .render(context! {
            report_marker => py_literal(&REPORT_MARKER)?,
            harness_path => py_literal(&params.harness_file)?,
            deadline_secs => alarm_secs(params.deadline),
            text_limit_chars => params.text_limit_chars,
            memory_limit => policy
                .memory_limit_bytes
                .map_or_else(|| "None".to_string(), |bytes| bytes.to_string()),
            allow_subprocess => if policy.allow_subprocess { "True" } else { "False" },
            disabled_os => py_literal(&DISABLED_OS_FUNCTIONS)?,
            disabled_shutil => py_literal(&DISABLED_SHUTIL_FUNCTIONS)?,
            disabled_spawn => py_literal(&DISABLED_SPAWN_FUNCTIONS)?,
            disabled_builtins => py_literal(&DISABLED_BUILTINS)?,
            blocked_modules => py_literal(&policy.blocked_modules)?,
        })
        .context("render bootstrap template")?;
    Ok(rendered)
}

/// Alarm delay as a Python float literal, never rounded down to zero.
fn alarm_secs(deadline: Duration) -> String {
    format!("{:?}", deadline.as_secs_f64().max(MIN_ALARM_SECS))
}

/// JSON strings and arrays of strings are valid Python literals.
fn py_literal<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("encode python literal")
}

/// Environment for a worker, rebuilt from scratch rather than inherited.
///
/// Pins a single-thread compute budget so numeric libraries do not
/// oversubscribe the host when many workers run side by side.
pub fn child_env(parent_path: Option<&str>) -> Vec<(String, String)> {
    vec![
        (
            "PATH".to_string(),
            parent_path.unwrap_or("/usr/local/bin:/usr/bin:/bin").to_string(),
        ),
        ("LANG".to_string(), "C.UTF-8".to_string()),
        ("OMP_NUM_THREADS".to_string(), "1".to_string()),
    ]
}
