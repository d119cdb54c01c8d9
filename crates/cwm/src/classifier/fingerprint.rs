//! Fingerprint computation: a stable 16-hex-char identifier
//! for a class of observed failure, used for dedup and retry accounting.
//!
//! Uses sha256 per the fingerprint formula; follows `golemcloud-golem`'s
//! plain `sha2` usage instead of hand-rolling a hash.

use sha2::{Digest, Sha256};

use crate::issue::IssueKind;

/// `sha256(kind || "\x00" || normalizedFileHint || "\x00" ||
/// firstMatchedLine[:128])` truncated to 16 hex chars.
#[must_use]
pub fn compute(kind: IssueKind, file_hint: Option<&str>, first_matched_line: &str) -> String {
    let normalized_hint = file_hint.map(normalize).unwrap_or_default();
    let truncated_line: String = first_matched_line.chars().take(128).collect();

    let mut hasher = Sha256::new();
    hasher.update(kind.short_name().as_bytes());
    hasher.update(b"\x00");
    hasher.update(normalized_hint.as_bytes());
    hasher.update(b"\x00");
    hasher.update(truncated_line.as_bytes());

    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Lowercase and collapse whitespace.
fn normalize(hint: &str) -> String {
    hint.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let a = compute(IssueKind::MissingDependency, Some("requests"), "ModuleNotFoundError: No module named 'requests'");
        let b = compute(IssueKind::MissingDependency, Some("requests"), "ModuleNotFoundError: No module named 'requests'");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn normalization_ignores_case_and_whitespace_variance() {
        let a = compute(IssueKind::MissingEnvVar, Some("  API_KEY  "), "line");
        let b = compute(IssueKind::MissingEnvVar, Some("api_key"), "line");
        assert_eq!(a, b);
    }

    #[test]
    fn different_kind_yields_different_fingerprint() {
        let a = compute(IssueKind::MissingDependency, Some("x"), "line");
        let b = compute(IssueKind::ImportError, Some("x"), "line");
        assert_ne!(a, b);
    }

    #[test]
    fn line_truncated_at_128_chars() {
        let long_line = "x".repeat(500);
        let short_line = "x".repeat(128);
        let a = compute(IssueKind::Unknown, None, &long_line);
        let b = compute(IssueKind::Unknown, None, &short_line);
        assert_eq!(a, b);
    }
}
