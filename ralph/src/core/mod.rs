//! Deterministic, pure logic shared by the loop supervisor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod stale;
pub mod stats;
pub mod types;
