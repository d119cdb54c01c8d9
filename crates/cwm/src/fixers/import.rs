//! `ImportError` fixer: append a stub definition to the named
//! module only if the module file already exists and the symbol is absent.

use std::path::Path;

use crate::error::Result;
use crate::issue::{FixResult, Issue};

use super::util::{atomic_write, resolve_in_workspace};

pub fn apply(issue: &Issue, workspace_root: &Path) -> Result<FixResult> {
    let Some(hint) = issue.file_hint.as_deref() else {
        return Ok(FixResult::Skipped("no-symbol-name".to_string()));
    };
    // `fn_name` captured from `classifier::rules` (group 1); the module the
    // symbol belongs to isn't carried in `file_hint`, so it's re-derived
    // from the matched line instead.
    let (fn_name, module) = match split_symbol_and_module(hint, &issue.matched) {
        Some(pair) => pair,
        None => return Ok(FixResult::Skipped("unresolvable-target".to_string())),
    };

    let module_relative = format!("{}.py", module.replace('.', "/"));
    let module_path = match resolve_in_workspace(workspace_root, &module_relative) {
        Ok(p) => p,
        Err(e) => return Ok(FixResult::Failed(format!("path-escape: {e}"))),
    };

    if !module_path.exists() {
        return Ok(FixResult::Skipped("module-absent".to_string()));
    }

    let contents = std::fs::read_to_string(&module_path)?;
    if contents.contains(&format!("def {fn_name}(")) {
        return Ok(FixResult::AlreadySatisfied);
    }

    let mut updated = contents;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&format!(
        "\ndef {fn_name}(*a, **kw):\n    raise NotImplementedError\n"
    ));

    atomic_write(&module_path, updated.as_bytes())?;
    Ok(FixResult::Applied)
}

/// `file_hint` holds the captured function name; the module is the second
/// capture group, preserved in `matched` (the full matched substring,
/// e.g. `ImportError: cannot import name 'helper' from 'pkg.utils'`).
fn split_symbol_and_module(fn_name: &str, matched: &str) -> Option<(String, String)> {
    let from_idx = matched.find("from '")?;
    let rest = &matched[from_idx + "from '".len()..];
    let end = rest.find('\'')?;
    let module = rest[..end].to_string();
    Some((fn_name.to_string(), module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueKind;

    fn issue(fn_name: &str, matched: &str) -> Issue {
        Issue {
            kind: IssueKind::ImportError,
            fingerprint: "fp".to_string(),
            matched: matched.to_string(),
            file_hint: Some(fn_name.to_string()),
            run_id: "r".to_string(),
            job_id: "j".to_string(),
            first_seen_iter: 1,
            last_seen_iter: 1,
            retries: 0,
        }
    }

    #[test]
    fn missing_module_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let result = apply(
            &issue("helper", "ImportError: cannot import name 'helper' from 'pkg.utils'"),
            dir.path(),
        )
        .unwrap();
        assert_eq!(result, FixResult::Skipped("module-absent".to_string()));
    }

    #[test]
    fn appends_stub_when_symbol_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/utils.py"), "x = 1\n").unwrap();

        let result = apply(
            &issue("helper", "ImportError: cannot import name 'helper' from 'pkg.utils'"),
            dir.path(),
        )
        .unwrap();
        assert_eq!(result, FixResult::Applied);
        let contents = std::fs::read_to_string(dir.path().join("pkg/utils.py")).unwrap();
        assert!(contents.contains("def helper(*a, **kw):"));
    }

    #[test]
    fn idempotent_when_symbol_already_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(
            dir.path().join("pkg/utils.py"),
            "def helper(*a, **kw):\n    raise NotImplementedError\n",
        )
        .unwrap();

        let result = apply(
            &issue("helper", "ImportError: cannot import name 'helper' from 'pkg.utils'"),
            dir.path(),
        )
        .unwrap();
        assert_eq!(result, FixResult::AlreadySatisfied);
    }
}
