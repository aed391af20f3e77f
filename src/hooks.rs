//! Shell hooks run around every pass.
//!
//! A hook blocks until its command exits, under the pass lock. Its result
//! never affects the pass: failures are logged and the pass carries on.

use std::process::Command;
use tracing::{info, warn};

/// How a hook run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Empty command, nothing run.
    Skipped,
    /// Exit code, `None` when killed by a signal.
    Exited(Option<i32>),
    /// The shell could not be started.
    SpawnFailed(String),
}

/// Run `command` through `sh -c` and wait for it.
pub fn run_hook(label: &str, command: &str) -> HookOutcome {
    if command.trim().is_empty() {
        return HookOutcome::Skipped;
    }
    info!(hook = label, command, "running hook");
    match Command::new("sh").arg("-c").arg(command).status() {
        Ok(status) if status.success() => HookOutcome::Exited(status.code()),
        Ok(status) => {
            warn!(hook = label, status = %status, "hook exited unsuccessfully");
            HookOutcome::Exited(status.code())
        }
        Err(e) => {
            warn!(hook = label, error = %e, "failed to start hook");
            HookOutcome::SpawnFailed(e.to_string())
        }
    }
}
