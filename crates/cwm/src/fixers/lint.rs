//! `LintFailure` fixer: run the configured formatter command
//! list in order, each with a hard timeout; any non-zero exit short-
//! circuits to `Failed(tool)`.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::issue::{FixResult, Issue};

/// Default hard timeout per fixer subprocess.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One formatter invocation, e.g. `["ruff", "format", "."]`.
#[derive(Debug, Clone)]
pub struct FormatterCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub fn apply(
    _issue: &Issue,
    workspace_root: &Path,
    commands: &[FormatterCommand],
    timeout: Duration,
) -> Result<FixResult> {
    if commands.is_empty() {
        return Ok(FixResult::Skipped("no-formatters-configured".to_string()));
    }

    let before = git_status_snapshot(workspace_root);

    for cmd in commands {
        match run_with_timeout(workspace_root, cmd, timeout) {
            RunOutcome::Success => {}
            RunOutcome::NonZeroExit => return Ok(FixResult::Failed(cmd.program.clone())),
            RunOutcome::TimedOut => return Ok(FixResult::Failed("timeout".to_string())),
            RunOutcome::SpawnFailed => return Ok(FixResult::Failed(cmd.program.clone())),
        }
    }

    let after = git_status_snapshot(workspace_root);
    if before == after {
        Ok(FixResult::AlreadySatisfied)
    } else {
        Ok(FixResult::Applied)
    }
}

enum RunOutcome {
    Success,
    NonZeroExit,
    TimedOut,
    SpawnFailed,
}

fn run_with_timeout(workspace_root: &Path, cmd: &FormatterCommand, timeout: Duration) -> RunOutcome {
    let mut child = match Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(workspace_root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return RunOutcome::SpawnFailed,
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            return if status.success() {
                RunOutcome::Success
            } else {
                RunOutcome::NonZeroExit
            };
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return RunOutcome::TimedOut;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn git_status_snapshot(workspace_root: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(workspace_root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    Some(lines.join("\n"))
}
