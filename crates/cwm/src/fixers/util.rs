//! Shared fixer plumbing: bounded blast radius and all-or-nothing writes
//! (applies to every handler).

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CwmError, Result};

/// Resolve `relative` against `workspace_root`, refusing any path that
/// would escape the root (`..`, absolute paths outside root). Returns
/// `Err(CwmError::PathEscape)` rather than a `FixResult` so callers can
/// map it to `Failed("path-escape")` uniformly.
pub fn resolve_in_workspace(workspace_root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        let canon_root = workspace_root
            .canonicalize()
            .map_err(|e| CwmError::Io(e))?;
        if !candidate.starts_with(&canon_root) {
            return Err(CwmError::PathEscape(relative.to_string()));
        }
    }
    if relative
        .split(['/', '\\'])
        .any(|component| component == "..")
    {
        return Err(CwmError::PathEscape(relative.to_string()));
    }

    let joined = workspace_root.join(candidate);
    Ok(joined)
}

/// Write `contents` to `path` via a temp-file-plus-rename so partial
/// writes are never observable ("all-or-nothing").
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| CwmError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_traversal() {
        let root = std::env::temp_dir();
        let result = resolve_in_workspace(&root, "../../etc/passwd");
        assert!(matches!(result, Err(CwmError::PathEscape(_))));
    }

    #[test]
    fn accepts_plain_relative_path() {
        let root = std::env::temp_dir();
        let result = resolve_in_workspace(&root, "requirements.txt");
        assert!(result.is_ok());
    }

    #[test]
    fn atomic_write_creates_file_with_exact_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn atomic_write_never_leaves_partial_file_on_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
