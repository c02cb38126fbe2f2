//! Deterministic, pure logic shared by the sandbox.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod harness;
pub mod report;
pub mod score;
pub mod state;
pub mod types;
