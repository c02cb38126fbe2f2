//! I/O helpers for the sandbox supervisor.

pub mod config;
pub mod guard;
pub mod interpreter;
pub mod process;
pub mod workspace;
