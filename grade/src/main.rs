mod cli;
mod report;
mod results;
mod run;
mod tasks;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

const DEFAULT_CONFIG: &str = "grade.toml";

#[derive(Parser)]
#[command(name = "grade", version, about = "Grade candidate programs against test harnesses")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grade every task in a JSON Lines file.
    Run {
        tasks: PathBuf,
        /// Per-task deadline in seconds.
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,
        /// Tasks graded concurrently.
        #[arg(long, default_value_t = default_jobs(), value_parser = clap::value_parser!(u16).range(1..))]
        jobs: u16,
        /// Results file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Grade one task built from a code file and a harness file.
    One {
        #[arg(long)]
        id: String,
        #[arg(long)]
        code: PathBuf,
        #[arg(long)]
        testcase: PathBuf,
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print a compiled harness.
    Compile { harness: PathBuf },
    /// Summarize a results file.
    Report { results: PathBuf },
    /// Print the effective configuration.
    Config {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// Write the effective configuration back to `--config`.
        #[arg(long)]
        write: bool,
    },
}

fn default_jobs() -> u16 {
    std::thread::available_parallelism()
        .map(|n| u16::try_from(n.get()).unwrap_or(u16::MAX))
        .unwrap_or(1)
}

fn main() -> Result<()> {
    sandbox::logging::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            tasks,
            timeout,
            jobs,
            output,
            config,
        } => cli::run_tasks(&tasks, timeout, usize::from(jobs), output.as_deref(), &config),
        Command::One {
            id,
            code,
            testcase,
            timeout,
            config,
        } => cli::grade_one(&id, &code, &testcase, timeout, &config),
        Command::Compile { harness } => cli::compile_harness_file(&harness),
        Command::Report { results } => cli::report_results(&results),
        Command::Config { config, write } => cli::show_config(&config, write),
    }
}
