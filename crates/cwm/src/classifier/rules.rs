//! Rule table: ordered `(regex, kind, fileHintExtractor)`
//! tuples. Grounded in `crates/healer/src/ci/router.rs`'s
//! `static ...PATTERNS: LazyLock<Vec<Regex>>` tables, but kept
//! pattern-directed and deterministic rather than a confidence-scored
//! multi-signal router ("does not
//! analyze code semantically").

use std::sync::LazyLock;

use regex::Regex;

use crate::issue::IssueKind;

/// One rule: a compiled pattern, the `IssueKind` it maps to, and which
/// capture group (if any) holds the file hint.
pub struct Rule {
    pub regex: Regex,
    pub kind: IssueKind,
    pub hint_group: Option<usize>,
}

/// Minimum required rules, in severity-unrelated
/// declaration order — application order is computed later from
/// `IssueKind::severity`, not from this table's order.
pub static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            regex: Regex::new(r"ModuleNotFoundError: No module named '([^']+)'").unwrap(),
            kind: IssueKind::MissingDependency,
            hint_group: Some(1),
        },
        Rule {
            regex: Regex::new(
                r"ImportError: cannot import name '([^']+)' from '([^']+)'",
            )
            .unwrap(),
            kind: IssueKind::ImportError,
            hint_group: Some(1),
        },
        Rule {
            regex: Regex::new(r"Missing required environment variable\(?s?\)?:\s*([A-Za-z0-9_, ]+)").unwrap(),
            kind: IssueKind::MissingEnvVar,
            hint_group: Some(1),
        },
        Rule {
            regex: Regex::new(r"(?i)yaml.*(parse|syntax) error").unwrap(),
            kind: IssueKind::YamlSyntaxError,
            hint_group: None,
        },
        Rule {
            regex: Regex::new(r"(?i)\b(black|ruff|isort|flake8)\b.*(would reformat|error|E[0-9]{3})").unwrap(),
            kind: IssueKind::LintFailure,
            hint_group: None,
        },
        Rule {
            regex: Regex::new(r"(===\s*FAILED|(\d+)\s+failed)").unwrap(),
            kind: IssueKind::TestFailure,
            hint_group: None,
        },
        Rule {
            regex: Regex::new(r"(?i)(docker build|error:\s*compil|compilation failed)").unwrap(),
            kind: IssueKind::BuildFailure,
            hint_group: None,
        },
        Rule {
            regex: Regex::new(r"Permission denied(?:\s*[:@]\s*(\S+))?").unwrap(),
            kind: IssueKind::PermissionError,
            hint_group: Some(1),
        },
        Rule {
            regex: Regex::new(r"(?i)(connection (timed out|refused)|could not resolve host|tls handshake)").unwrap(),
            kind: IssueKind::NetworkError,
            hint_group: None,
        },
        Rule {
            regex: Regex::new(r"timed out after (\d+)").unwrap(),
            kind: IssueKind::Timeout,
            hint_group: None,
        },
    ]
});

/// The YAML file-path hint lives on the *next* line after the parse error
/// ("YAML parse error with file path in next line"); this
/// helper extracts it instead of a capture group.
pub fn yaml_file_hint_after(lines: &[&str], matched_idx: usize) -> Option<String> {
    lines.get(matched_idx + 1).map(|s| s.trim().to_string())
}
