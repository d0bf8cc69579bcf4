//! Stable exit codes for `ralph` commands.

/// The command finished (for `ralph loop`: max iterations or stale abort).
pub const OK: i32 = 0;
/// Invalid config or repository state, or the agent/stream failed.
pub const FAILED: i32 = 1;
/// `ralph loop` was interrupted (SIGINT). Matches the shell's `128 + SIGINT`.
pub const CANCELLED: i32 = 130;
