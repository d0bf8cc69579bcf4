//! Iteration supervisor for an autonomous coding agent.
//!
//! `ralph` runs an agent (the `claude` CLI by default) against a git working
//! tree over and over, until an iteration budget is spent, the agent stops
//! producing commits, or the user interrupts it. The crate is split the same
//! way throughout:
//!
//! - **[`core`]**: Pure state (stats, stale detection, run vocabulary).
//!   No I/O, fully testable in isolation.
//! - **[`stream`]**: Parsing and rendering of the agent's JSONL event stream.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution)
//!   behind traits so tests can substitute scripted collaborators.
//!
//! [`looping`] ties these together; [`render`] and [`status`] produce the
//! terminal output for `ralph loop` and `ralph status`.

pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod render;
pub mod status;
pub mod stream;
pub mod style;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
