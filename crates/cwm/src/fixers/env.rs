//! `MissingEnvVar` fixer: append `NAME=<generated>` to
//! `.env.example` (and to `.env` if `writeDotEnv=true`). Never overwrites
//! an existing key.

use std::path::Path;

use base64::Engine;
use rand::RngCore;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::Result;
use crate::issue::{FixResult, Issue};

use super::util::{atomic_write, resolve_in_workspace};

static SECRET_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(KEY|SECRET|TOKEN|SALT)$").unwrap());

pub fn apply(issue: &Issue, workspace_root: &Path, write_dotenv: bool) -> Result<FixResult> {
    let Some(name) = issue.file_hint.as_deref() else {
        return Ok(FixResult::Skipped("no-variable-name".to_string()));
    };
    let name = name.trim();

    let example_path = match resolve_in_workspace(workspace_root, ".env.example") {
        Ok(p) => p,
        Err(e) => return Ok(FixResult::Failed(format!("path-escape: {e}"))),
    };

    if key_present(&example_path, name)? {
        return Ok(FixResult::AlreadySatisfied);
    }

    let value = generate_value(name);
    append_line(&example_path, name, &value)?;

    if write_dotenv {
        let dotenv_path = match resolve_in_workspace(workspace_root, ".env") {
            Ok(p) => p,
            Err(e) => return Ok(FixResult::Failed(format!("path-escape: {e}"))),
        };
        if !key_present(&dotenv_path, name)? {
            append_line(&dotenv_path, name, &value)?;
        }
    }

    Ok(FixResult::Applied)
}

fn key_present(path: &Path, name: &str) -> Result<bool> {
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    Ok(contents
        .lines()
        .any(|line| line.split('=').next().is_some_and(|k| k == name)))
}

fn append_line(path: &Path, name: &str, value: &str) -> Result<()> {
    let mut contents = std::fs::read_to_string(path).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{name}={value}\n"));
    atomic_write(path, contents.as_bytes())
}

/// Cryptographic random 32-byte URL-safe base64 for secret-shaped names,
/// empty string otherwise.
fn generate_value(name: &str) -> String {
    if SECRET_LIKE.is_match(name) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    } else {
        String::new()
    }
}
