//! Workspace creation and teardown.
//!
//! Each task gets its own uniquely named temporary directory. The directory is
//! removed recursively when the [`Workspace`] is dropped, so every exit path of
//! the supervisor (success, error, killed worker) cleans up after itself.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tempfile::TempDir;
use tracing::debug;

/// An isolated, self-deleting directory for one task.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    /// Directory name (includes task id, timestamp, and random suffix).
    pub name: String,
}

impl Workspace {
    /// Create a fresh workspace under `base_dir` for `task_id`.
    pub fn create(base_dir: &Path, task_id: &str) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("create workspace dir {}", base_dir.display()))?;

        let prefix = build_workspace_prefix(task_id, &generate_timestamp());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(base_dir)
            .with_context(|| format!("create workspace in {}", base_dir.display()))?;
        let name = dir
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!(workspace = %dir.path().display(), "workspace created");
        Ok(Self { dir, name })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `file_name` directly inside the workspace.
    pub fn write_file(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
            bail!("workspace file name {file_name:?} must be a plain file name");
        }
        let path = self.dir.path().join(file_name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Delete the workspace now, reporting any error instead of ignoring it.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove workspace {}", path.display()))?;
        debug!(workspace = %path.display(), "workspace removed");
        Ok(())
    }
}

pub fn build_workspace_prefix(task_id: &str, timestamp: &str) -> String {
    format!("{task_id}_{timestamp}_")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
