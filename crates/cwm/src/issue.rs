//! The data model shared by the classifier, fixer registry, retry budget,
//! and reporter: `IssueKind`, `Issue`, `IssueSet`, and `FixResult`.
//!
//! Modeled on `crates/healer/src/ci/types.rs`'s closed-enum-plus-struct
//! style (`CiFailureType`, `CiFailure`) rather than a class-per-issue-type
//! hierarchy with dynamic dispatch — `IssueKind` is a flat, exhaustively
//! matched enum so adding a new failure kind is a compile error everywhere
//! it isn't handled.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Relative urgency of an issue kind. Ordered so `Critical > High > Medium >
/// Low` under the derived `Ord` (declaration order, highest variant last
/// is wrong for us — we implement `Ord` explicitly below instead of relying
/// on declaration order, to keep this independent of enum member order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Closed set of classifiable failure kinds. Each has a fixed
/// severity and fixed auto-fixability, queried via [`IssueKind::severity`]
/// and [`IssueKind::auto_fixable`] rather than stored per-instance, so the
/// classifier's rule table is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    MissingDependency,
    ImportError,
    MissingEnvVar,
    YamlSyntaxError,
    LintFailure,
    TestFailure,
    BuildFailure,
    PermissionError,
    NetworkError,
    Timeout,
    Unknown,
}

impl IssueKind {
    /// Fixed severity for this kind, per the minimum rule table.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::MissingEnvVar | IssueKind::YamlSyntaxError => Severity::Critical,
            IssueKind::MissingDependency
            | IssueKind::ImportError
            | IssueKind::TestFailure
            | IssueKind::BuildFailure => Severity::High,
            IssueKind::PermissionError => Severity::Medium,
            IssueKind::LintFailure | IssueKind::NetworkError | IssueKind::Timeout => {
                Severity::Low
            }
            IssueKind::Unknown => Severity::Medium,
        }
    }

    /// Whether the registry has a handler that can resolve this kind
    /// without human input.
    #[must_use]
    pub fn auto_fixable(self) -> bool {
        matches!(
            self,
            IssueKind::MissingDependency
                | IssueKind::ImportError
                | IssueKind::MissingEnvVar
                | IssueKind::YamlSyntaxError
                | IssueKind::LintFailure
        )
    }

    /// Short, stable name used in commit messages and fingerprints.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            IssueKind::MissingDependency => "MissingDependency",
            IssueKind::ImportError => "ImportError",
            IssueKind::MissingEnvVar => "MissingEnvVar",
            IssueKind::YamlSyntaxError => "YAMLSyntaxError",
            IssueKind::LintFailure => "LintFailure",
            IssueKind::TestFailure => "TestFailure",
            IssueKind::BuildFailure => "BuildFailure",
            IssueKind::PermissionError => "PermissionError",
            IssueKind::NetworkError => "NetworkError",
            IssueKind::Timeout => "Timeout",
            IssueKind::Unknown => "Unknown",
        }
    }
}

/// One observed, deduplicated failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Stable hash of `(kind, normalized file hint, first matched line)`;
    /// see `classifier::fingerprint`.
    pub fingerprint: String,
    /// The literal matched substring; diagnostic only, never parsed back.
    #[serde(rename = "match")]
    pub matched: String,
    pub file_hint: Option<String>,
    pub run_id: String,
    pub job_id: String,
    pub first_seen_iter: u32,
    pub last_seen_iter: u32,
    pub retries: u32,
}

impl Issue {
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    #[must_use]
    pub fn auto_fixable(&self) -> bool {
        self.kind.auto_fixable()
    }
}

/// Total order used for fix-application order and deterministic report
/// ordering: severity-desc, then fingerprint lexicographic-asc.
pub fn application_order(a: &Issue, b: &Issue) -> Ordering {
    b.severity()
        .cmp(&a.severity())
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
}

/// `fingerprint -> Issue` map; insertion order is not observable.
/// Invariant upheld by callers: `retries <= maxRetries` for every entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSet {
    issues: std::collections::HashMap<String, Issue>,
}

impl IssueSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a freshly classified issue into the set. If the fingerprint is
    /// already present, updates `last_seen_iter` only (retries advance
    /// separately, once per fix attempt, not per observation).
    pub fn observe(&mut self, mut issue: Issue, iteration: u32) {
        match self.issues.get_mut(&issue.fingerprint) {
            Some(existing) => {
                existing.last_seen_iter = iteration;
            }
            None => {
                issue.first_seen_iter = iteration;
                issue.last_seen_iter = iteration;
                self.issues.insert(issue.fingerprint.clone(), issue);
            }
        }
    }

    /// Drop every issue not re-observed this iteration: an issue leaves the
    /// set the first iteration its fingerprint is not seen in any failed
    /// run's logs.
    pub fn retire_stale(&mut self, current_iteration: u32) {
        self.issues
            .retain(|_, issue| issue.last_seen_iter == current_iteration);
    }

    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<&Issue> {
        self.issues.get(fingerprint)
    }

    pub fn get_mut(&mut self, fingerprint: &str) -> Option<&mut Issue> {
        self.issues.get_mut(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues eligible for a fix attempt this tick, in application order.
    #[must_use]
    pub fn applyable(&self, is_eligible: impl Fn(&Issue) -> bool) -> Vec<Issue> {
        let mut out: Vec<Issue> = self
            .issues
            .values()
            .filter(|i| i.auto_fixable() && is_eligible(i))
            .cloned()
            .collect();
        out.sort_by(application_order);
        out
    }
}

/// Outcome of one fixer invocation. Only `Applied` counts toward
/// "mutation happened this iteration".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail")]
pub enum FixResult {
    Applied,
    AlreadySatisfied,
    Skipped(String),
    Failed(String),
}

impl FixResult {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, FixResult::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: IssueKind, fingerprint: &str) -> Issue {
        Issue {
            kind,
            fingerprint: fingerprint.to_string(),
            matched: "match".to_string(),
            file_hint: None,
            run_id: "r1".to_string(),
            job_id: "j1".to_string(),
            first_seen_iter: 1,
            last_seen_iter: 1,
            retries: 0,
        }
    }

    #[test]
    fn severity_desc_then_fingerprint_asc() {
        let mut issues = vec![
            issue(IssueKind::LintFailure, "bbb"), // Low
            issue(IssueKind::MissingEnvVar, "zzz"), // Critical
            issue(IssueKind::MissingEnvVar, "aaa"), // Critical
            issue(IssueKind::MissingDependency, "ccc"), // High
        ];
        issues.sort_by(application_order);
        let fingerprints: Vec<&str> = issues.iter().map(|i| i.fingerprint.as_str()).collect();
        assert_eq!(fingerprints, vec!["aaa", "zzz", "ccc", "bbb"]);
    }

    #[test]
    fn observe_updates_last_seen_not_first_seen() {
        let mut set = IssueSet::new();
        set.observe(issue(IssueKind::MissingDependency, "fp1"), 1);
        let mut later = issue(IssueKind::MissingDependency, "fp1");
        later.first_seen_iter = 5;
        set.observe(later, 5);

        let stored = set.get("fp1").unwrap();
        assert_eq!(stored.first_seen_iter, 1);
        assert_eq!(stored.last_seen_iter, 5);
    }

    #[test]
    fn retire_stale_drops_unobserved_fingerprints() {
        let mut set = IssueSet::new();
        set.observe(issue(IssueKind::MissingDependency, "fp1"), 1);
        set.observe(issue(IssueKind::ImportError, "fp2"), 2);
        set.retire_stale(2);
        assert!(set.get("fp1").is_none());
        assert!(set.get("fp2").is_some());
    }

    #[test]
    fn kind_severity_and_auto_fixable_match_rule_table() {
        assert_eq!(IssueKind::MissingEnvVar.severity(), Severity::Critical);
        assert_eq!(IssueKind::YamlSyntaxError.severity(), Severity::Critical);
        assert!(IssueKind::MissingDependency.auto_fixable());
        assert!(!IssueKind::TestFailure.auto_fixable());
        assert!(!IssueKind::NetworkError.auto_fixable());
    }
}
