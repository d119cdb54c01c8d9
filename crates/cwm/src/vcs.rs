//! `VcsDriver`: stage, commit with a deterministic
//! message, push to the remote tracking branch; detect no-op commits.
//!
//! Grounded in `crates/healer/src/ci/context.rs` and `dedup.rs`'s
//! `std::process::Command` shelling pattern — git is invoked the same way
//! those modules shell to `gh`/`kubectl`.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{CwmError, Result};

/// Outcome of [`VcsDriver::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Ok,
    UpToDate,
    Rejected(String),
    NetworkError(String),
}

pub struct VcsDriver {
    workspace_root: PathBuf,
}

impl VcsDriver {
    #[must_use]
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workspace_root)
            .output()
            .map_err(|e| CwmError::Vcs(format!("spawning git {args:?}: {e}")))
    }

    /// Stage every tracked+modified and every untracked path under the
    /// workspace, honoring the existing ignore file.
    pub fn stage_all(&self) -> Result<()> {
        let output = self.git(&["add", "-A"])?;
        if !output.status.success() {
            return Err(CwmError::Vcs(format!(
                "git add failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Create a commit iff the index differs from HEAD; otherwise `None`.
    /// Message is `"auto-fix(iter=<N>): <issueKindsCSV>"` with a UTC
    /// timestamp trailer.
    pub fn commit(&self, iteration: u32, issue_kinds_csv: &str) -> Result<Option<String>> {
        let diff = self.git(&["diff", "--cached", "--quiet"])?;
        if diff.status.success() {
            // Exit 0 means no staged changes.
            return Ok(None);
        }

        let message = format!(
            "auto-fix(iter={iteration}): {issue_kinds_csv}\n\nTimestamp: {}",
            Utc::now().to_rfc3339()
        );
        let output = self.git(&["commit", "-m", &message])?;
        if !output.status.success() {
            return Err(CwmError::Vcs(format!(
                "git commit failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let sha_output = self.git(&["rev-parse", "HEAD"])?;
        let sha = String::from_utf8_lossy(&sha_output.stdout).trim().to_string();
        info!(commit_sha = %sha, iteration, "created auto-fix commit");
        Ok(Some(sha))
    }

    /// Push HEAD to the tracked upstream.
    pub fn push(&self) -> Result<PushResult> {
        let output = match self.git(&["push"]) {
            Ok(o) => o,
            Err(e) => return Ok(PushResult::NetworkError(e.to_string())),
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains("Everything up-to-date") || stderr.contains("Everything up-to-date")
            {
                return Ok(PushResult::UpToDate);
            }
            return Ok(PushResult::Ok);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("[rejected]") || stderr.contains("non-fast-forward") {
            return Ok(PushResult::Rejected(stderr));
        }
        warn!(stderr = %stderr, "git push failed");
        Ok(PushResult::NetworkError(stderr))
    }

    /// Fetch the remote then rebase HEAD onto the tracked upstream, used
    /// to recover from one `Rejected` push.
    pub fn fetch_and_rebase(&self) -> Result<()> {
        let fetch = self.git(&["fetch"])?;
        if !fetch.status.success() {
            return Err(CwmError::Vcs(format!(
                "git fetch failed: {}",
                String::from_utf8_lossy(&fetch.stderr)
            )));
        }
        let rebase = self.git(&["rebase"])?;
        if !rebase.status.success() {
            return Err(CwmError::Vcs(format!(
                "git rebase failed: {}",
                String::from_utf8_lossy(&rebase.stderr)
            )));
        }
        debug!("fetch+rebase succeeded");
        Ok(())
    }
}

/// Check the configured workspace root is actually inside a git
/// repository; a corrupt or absent repository is fatal.
pub fn ensure_git_repo(workspace_root: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(workspace_root)
        .output()
        .map_err(|e| CwmError::Vcs(format!("checking git repo: {e}")))?;
    if !output.status.success() {
        return Err(CwmError::Vcs(format!(
            "{} is not a git working tree",
            workspace_root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "cwm@example.com"]);
        run(&["config", "user.name", "cwm"]);
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn commit_returns_none_when_nothing_staged() {
        let dir = init_repo();
        let driver = VcsDriver::new(dir.path().to_path_buf());
        let sha = driver.commit(1, "Unknown").unwrap();
        assert!(sha.is_none());
    }

    #[test]
    fn commit_returns_sha_when_changes_staged() {
        let dir = init_repo();
        std::fs::write(dir.path().join("new.txt"), "content\n").unwrap();
        let driver = VcsDriver::new(dir.path().to_path_buf());
        driver.stage_all().unwrap();
        let sha = driver.commit(1, "MissingDependency").unwrap();
        assert!(sha.is_some());
        assert_eq!(sha.unwrap().len(), 40);
    }

    #[test]
    fn ensure_git_repo_succeeds_on_real_repo() {
        let dir = init_repo();
        assert!(ensure_git_repo(dir.path()).is_ok());
    }

    #[test]
    fn ensure_git_repo_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_git_repo(dir.path()).is_err());
    }
}
