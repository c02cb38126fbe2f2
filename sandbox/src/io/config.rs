//! Sandbox configuration stored as TOML (e.g. `grade.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Sandbox configuration (TOML).
///
/// Missing fields default to values that work on a stock Linux host with
/// `python3` on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used for every worker process.
    pub python: String,

    /// Extra wall-clock seconds the supervisor waits past the task deadline
    /// before killing the worker.
    pub kill_grace_secs: f64,

    /// Bound on captured harness output, in bytes.
    pub output_limit_bytes: usize,

    /// Directory under which per-task workspaces are created. Defaults to the
    /// system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    pub guard: GuardPolicy,
}

/// What the capability guard removes inside each worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardPolicy {
    /// Address-space and data-segment ceiling for the worker. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<u64>,

    /// Keep `subprocess.Popen` and `os.posix_spawn*` usable.
    pub allow_subprocess: bool,

    /// Modules whose import raises `ImportError` inside the worker.
    pub blocked_modules: Vec<String>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            memory_limit_bytes: None,
            allow_subprocess: false,
            blocked_modules: ["ipdb", "joblib", "resource", "psutil", "tkinter"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            kill_grace_secs: 1.0,
            output_limit_bytes: 1_000_000,
            workspace_root: None,
            guard: GuardPolicy::default(),
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be non-empty"));
        }
        self.kill_grace()?;
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        self.guard.validate()
    }

    /// Grace period as a `Duration`; errors instead of panicking on values
    /// `Duration` cannot hold.
    pub fn kill_grace(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.kill_grace_secs).map_err(|_| {
            anyhow!(
                "kill_grace_secs must be a non-negative number of seconds, got {}",
                self.kill_grace_secs
            )
        })
    }

    /// Directory new workspaces are created in.
    pub fn workspace_base(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl GuardPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_bytes == Some(0) {
            return Err(anyhow!("guard.memory_limit_bytes must be > 0"));
        }
        for module in &self.blocked_modules {
            if !is_module_name(module) {
                return Err(anyhow!(
                    "guard.blocked_modules entry {module:?} is not a module name"
                ));
            }
        }
        Ok(())
    }
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        })
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SandboxConfig::default()`.
pub fn load_config(path: &Path) -> Result<SandboxConfig> {
    if !path.exists() {
        let cfg = SandboxConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SandboxConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SandboxConfig) -> Result<()> {
    cfg.validate()?;
    write_atomic(path, &to_toml_string(cfg)?)
}

/// Render config as pretty TOML with a trailing newline.
pub fn to_toml_string(cfg: &SandboxConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    Ok(buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
