use std::path::Path;

use anyhow::Result;

use sandbox::ExecResult;

use crate::results::{GradedTask, read_results};

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub tasks: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    /// Tasks scoring at least 1.0.
    pub perfect: usize,
    pub mean_score: Option<f64>,
    pub avg_duration_secs: Option<f64>,
}

pub fn summarize(records: &[GradedTask]) -> ReportSummary {
    let mut summary = ReportSummary::default();
    let mut score_total = 0.0;
    let mut duration_total = 0.0;

    for record in records {
        summary.tasks += 1;
        match record.exec_result {
            ExecResult::Completed => summary.completed += 1,
            ExecResult::TimedOut => summary.timed_out += 1,
            ExecResult::Failed(_) => summary.failed += 1,
        }
        if record.score >= 1.0 {
            summary.perfect += 1;
        }
        score_total += record.score;
        duration_total += record.duration_secs;
    }

    if summary.tasks > 0 {
        summary.mean_score = Some(score_total / summary.tasks as f64);
        summary.avg_duration_secs = Some(duration_total / summary.tasks as f64);
    }
    summary
}

pub fn aggregate(results_path: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let (records, warnings) = read_results(results_path)?;
    Ok((summarize(&records), warnings))
}
