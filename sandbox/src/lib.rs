//! Execution sandbox for grading machine-generated candidate programs.
//!
//! A task pairs a candidate program with an instructor-authored harness. The
//! sandbox materializes both into a throwaway workspace, runs them in a fresh
//! interpreter process with a capability guard applied, and turns whatever the
//! child reports back into exactly one [`ExecutionResult`]. The layout keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure logic (harness compilation, score parsing, the child
//!   report protocol, task state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (workspaces, process spawning, guard
//!   rendering, configuration files).
//!
//! [`supervisor`] coordinates the two and is the only entry point callers need.

pub mod core;
pub mod io;
pub mod logging;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::types::{ExecResult, ExecutionResult, Task};
pub use crate::io::config::SandboxConfig;
pub use crate::supervisor::{Supervisor, check_correctness};
