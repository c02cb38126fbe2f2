//! Batch grading over a bounded pool of worker threads.
//!
//! Each pool thread pulls the next task index from a shared counter and calls
//! the supervisor synchronously, so at most `jobs` worker processes exist at
//! any time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument};

use sandbox::io::interpreter::Interpreter;
use sandbox::{Supervisor, Task};

use crate::results::GradedTask;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Per-task deadline.
    pub timeout: Duration,
    /// Maximum number of tasks graded concurrently.
    pub jobs: usize,
}

/// Grade every task, returning records in task order.
#[instrument(skip_all, fields(tasks = tasks.len(), jobs = options.jobs))]
pub fn grade_tasks<I: Interpreter + Sync>(
    supervisor: &Supervisor<I>,
    tasks: &[Task],
    options: &RunOptions,
) -> Vec<GradedTask> {
    let workers = options.jobs.max(1).min(tasks.len());
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    info!(workers, "grading started");
    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(index) else {
                        break;
                    };
                    debug!(worker, task_id = %task.id, "grading task");
                    let started_at = Utc::now();
                    let result = supervisor.check(task, options.timeout);
                    let finished_at = Utc::now();
                    if tx
                        .send((index, GradedTask::new(task, result, started_at, finished_at)))
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<GradedTask>> = vec![None; tasks.len()];
    for (index, record) in rx {
        slots[index] = Some(record);
    }
    let records: Vec<GradedTask> = slots.into_iter().flatten().collect();
    info!(graded = records.len(), "grading finished");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox::core::report::REPORT_MARKER;
    use sandbox::io::process::CommandOutput;
    use sandbox::test_support::{ScriptedInterpreter, scratch_config, task};

    fn completed(score: f64) -> anyhow::Result<CommandOutput> {
        let json = format!(
            r#"{{"status":"completed","text":"Unit Test Returned: {score}\n"}}"#
        );
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: format!("{REPORT_MARKER}{json}\n").into_bytes(),
            ..CommandOutput::default()
        })
    }

    #[test]
    fn grades_every_task_in_order() {
        let (_temp, config) = scratch_config();
        let interpreter = ScriptedInterpreter::new((0..5).map(|_| completed(1.0)).collect());
        let supervisor = Supervisor::new(interpreter, config);
        let tasks: Vec<Task> = (0..5)
            .map(|n| task(&format!("p{n}"), "", "def test_passed():\n    return 1.0\n"))
            .collect();

        let records = grade_tasks(
            &supervisor,
            &tasks,
            &RunOptions {
                timeout: Duration::from_secs(1),
                jobs: 3,
            },
        );

        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
        assert!(records.iter().all(|record| record.score == 1.0));
    }

    #[test]
    fn empty_task_list_spawns_nothing() {
        let (_temp, config) = scratch_config();
        let supervisor = Supervisor::new(ScriptedInterpreter::new(Vec::new()), config);
        let records = grade_tasks(
            &supervisor,
            &[],
            &RunOptions {
                timeout: Duration::from_secs(1),
                jobs: 4,
            },
        );
        assert!(records.is_empty());
    }
}
