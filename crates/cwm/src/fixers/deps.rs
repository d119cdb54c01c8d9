//! `MissingDependency` fixer: append the captured package name
//! to the canonical dependency manifest, one line, newline-terminated, if
//! absent.

use std::path::Path;

use crate::error::Result;
use crate::issue::{FixResult, Issue};

use super::util::{atomic_write, resolve_in_workspace};

const MANIFEST_RELATIVE_PATH: &str = "requirements.txt";

pub fn apply(issue: &Issue, workspace_root: &Path) -> Result<FixResult> {
    let Some(package) = issue.file_hint.as_deref() else {
        return Ok(FixResult::Skipped("no-package-name".to_string()));
    };

    let manifest_path = match resolve_in_workspace(workspace_root, MANIFEST_RELATIVE_PATH) {
        Ok(p) => p,
        Err(e) => return Ok(FixResult::Failed(format!("path-escape: {e}"))),
    };

    let existing = std::fs::read_to_string(&manifest_path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == package) {
        return Ok(FixResult::AlreadySatisfied);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(package);
    updated.push('\n');

    atomic_write(&manifest_path, updated.as_bytes())?;
    Ok(FixResult::Applied)
}
