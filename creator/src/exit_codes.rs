//! Stable exit codes for creator CLI commands.

/// Command succeeded (approved or round budget exhausted).
pub const OK: i32 = 0;
/// Invalid config or input, or a failure during the run.
pub const FAILED: i32 = 1;
/// Command-line usage error (reported by clap).
pub const USAGE: i32 = 2;
