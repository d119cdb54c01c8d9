//! `YAMLSyntaxError` fixer: re-serialize the named file through
//! a safe YAML load+dump, which normalizes quoting/indentation.

use std::path::Path;

use crate::error::Result;
use crate::issue::{FixResult, Issue};

use super::util::{atomic_write, resolve_in_workspace};

pub fn apply(issue: &Issue, workspace_root: &Path) -> Result<FixResult> {
    let Some(relative_path) = issue.file_hint.as_deref() else {
        return Ok(FixResult::Skipped("no-file-path".to_string()));
    };

    let path = match resolve_in_workspace(workspace_root, relative_path) {
        Ok(p) => p,
        Err(e) => return Ok(FixResult::Failed(format!("path-escape: {e}"))),
    };

    if !path.exists() {
        return Ok(FixResult::Skipped("file-absent".to_string()));
    }

    let original = std::fs::read_to_string(&path)?;
    let value: serde_yaml::Value = match serde_yaml::from_str(&original) {
        Ok(v) => v,
        Err(_) => return Ok(FixResult::Failed("unparseable".to_string())),
    };

    let normalized = serde_yaml::to_string(&value)
        .map_err(|e| crate::error::CwmError::Other(format!("yaml dump failed: {e}")))?;

    // Idempotence: re-loading the original already yields the same
    // normalized form once the document has round-tripped once.
    if normalized == original {
        return Ok(FixResult::AlreadySatisfied);
    }
    let reparsed_equiv = serde_yaml::from_str::<serde_yaml::Value>(&normalized)
        .map(|reparsed| reparsed == value)
        .unwrap_or(false);
    if !reparsed_equiv {
        return Ok(FixResult::Failed("normalization-changed-semantics".to_string()));
    }

    atomic_write(&path, normalized.as_bytes())?;
    Ok(FixResult::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueKind;

    fn issue(path: &str) -> Issue {
        Issue {
            kind: IssueKind::YamlSyntaxError,
            fingerprint: "fp".to_string(),
            matched: "matched".to_string(),
            file_hint: Some(path.to_string()),
            run_id: "r".to_string(),
            job_id: "j".to_string(),
            first_seen_iter: 1,
            last_seen_iter: 1,
            retries: 0,
        }
    }

    #[test]
    fn normalizes_inconsistent_quoting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ci.yml"), "name:   'build'\non:\n  push: {}\n").unwrap();
        let result = apply(&issue("ci.yml"), dir.path()).unwrap();
        assert_eq!(result, FixResult::Applied);
        let normalized = std::fs::read_to_string(dir.path().join("ci.yml")).unwrap();
        let reparsed: serde_yaml::Value = serde_yaml::from_str(&normalized).unwrap();
        assert_eq!(reparsed["name"], serde_yaml::Value::from("build"));
    }

    #[test]
    fn unparseable_file_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yml"), "key: [unterminated\n").unwrap();
        let result = apply(&issue("broken.yml"), dir.path()).unwrap();
        assert_eq!(result, FixResult::Failed("unparseable".to_string()));
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let result = apply(&issue("missing.yml"), dir.path()).unwrap();
        assert_eq!(result, FixResult::Skipped("file-absent".to_string()));
    }
}
