//! CLI command implementations.

use std::fs;
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use sandbox::core::harness::compile_harness;
use sandbox::core::types::validate_task_id;
use sandbox::io::config::{load_config, to_toml_string, write_config};
use sandbox::supervisor::deadline_from_secs;
use sandbox::{Supervisor, Task};

use crate::report::{ReportSummary, aggregate, summarize};
use crate::results::write_results;
use crate::run::{RunOptions, grade_tasks};
use crate::tasks::load_tasks;

/// Grade every task in a JSON Lines file.
pub fn run_tasks(
    tasks_path: &Path,
    timeout_secs: f64,
    jobs: usize,
    output: Option<&Path>,
    config_path: &Path,
) -> Result<()> {
    let timeout = deadline_from_secs(timeout_secs)?;
    let config = load_config(config_path).context("load config")?;
    let tasks = load_tasks(tasks_path)?;
    debug!(tasks = tasks.len(), "tasks loaded");

    let supervisor = Supervisor::from_config(config);
    let records = grade_tasks(&supervisor, &tasks, &RunOptions { timeout, jobs });

    match output {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("create results {}", path.display()))?;
            write_results(BufWriter::new(file), &records)?;
            info!(path = %path.display(), "results written");
        }
        None => write_results(io::stdout().lock(), &records)?,
    }

    let summary = summarize(&records);
    eprintln!("run: {}", summary_line(&summary));
    Ok(())
}

/// Grade a single task assembled from files.
pub fn grade_one(
    id: &str,
    code_path: &Path,
    testcase_path: &Path,
    timeout_secs: f64,
    config_path: &Path,
) -> Result<()> {
    validate_task_id(id)?;
    let timeout = deadline_from_secs(timeout_secs)?;
    let config = load_config(config_path).context("load config")?;
    let code = fs::read_to_string(code_path)
        .with_context(|| format!("read code {}", code_path.display()))?;
    let testcase = fs::read_to_string(testcase_path)
        .with_context(|| format!("read testcase {}", testcase_path.display()))?;

    let result = Supervisor::from_config(config).check(&Task::new(id, code, testcase), timeout);
    let json = serde_json::to_string_pretty(&result).context("serialize result")?;
    println!("{json}");
    Ok(())
}

/// Print the harness exactly as the worker would execute it.
pub fn compile_harness_file(harness_path: &Path) -> Result<()> {
    let raw = fs::read_to_string(harness_path)
        .with_context(|| format!("read harness {}", harness_path.display()))?;
    print!("{}", compile_harness(&raw));
    Ok(())
}

/// Show aggregated results for a results file.
pub fn report_results(results_path: &Path) -> Result<()> {
    let (summary, warnings) = aggregate(results_path)?;
    println!("report: {}", summary_line(&summary));
    println!("report: perfect={}/{}", summary.perfect, summary.tasks);
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={:.2}", avg);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Print the effective configuration as TOML, optionally writing it back.
pub fn show_config(config_path: &Path, write: bool) -> Result<()> {
    let config = load_config(config_path).context("load config")?;
    if write {
        write_config(config_path, &config)?;
        eprintln!("config: wrote {}", config_path.display());
    }
    print!("{}", to_toml_string(&config)?);
    Ok(())
}

fn summary_line(summary: &ReportSummary) -> String {
    let mean = summary
        .mean_score
        .map(|mean| format!("{mean:.3}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "tasks={} completed={} timed_out={} failed={} mean_score={}",
        summary.tasks, summary.completed, summary.timed_out, summary.failed, mean
    )
}
