//! `LogClassifier`: turns raw job logs into typed `Issue` records via
//! pattern rules. A pure function: identical `(log, context)` always
//! yields a byte-identical `List<Issue>`.

pub mod fingerprint;
pub mod rules;

use crate::issue::{application_order, Issue, IssueKind};

/// Everything about the job the classifier needs beyond the raw log text.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: String,
    pub job_id: String,
}

/// Classify one job's log into zero or more deduplicated-within-this-call
/// issues, ordered severity-desc / fingerprint-lex-asc.
#[must_use]
pub fn classify(log: &str, context: &JobContext) -> Vec<Issue> {
    let lines: Vec<&str> = log.lines().collect();
    let mut issues = Vec::new();

    for rule in rules::RULES.iter() {
        let Some((line_idx, line)) = lines
            .iter()
            .enumerate()
            .find(|(_, l)| rule.regex.is_match(l))
        else {
            continue;
        };

        let captures = rule.regex.captures(line);
        let file_hint = if rule.kind == IssueKind::YamlSyntaxError {
            rules::yaml_file_hint_after(&lines, line_idx)
        } else {
            rule.hint_group
                .zip(captures.as_ref())
                .and_then(|(group, caps)| caps.get(group))
                .map(|m| m.as_str().to_string())
        };

        let matched = captures
            .as_ref()
            .and_then(|c| c.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| (*line).to_string());

        let fp = fingerprint::compute(rule.kind, file_hint.as_deref(), line);

        issues.push(Issue {
            kind: rule.kind,
            fingerprint: fp,
            matched,
            file_hint,
            run_id: context.run_id.clone(),
            job_id: context.job_id.clone(),
            first_seen_iter: 0,
            last_seen_iter: 0,
            retries: 0,
        });
    }

    if issues.is_empty() {
        issues.push(unknown_issue(log, context));
    }

    issues.sort_by(application_order);
    issues
}

/// Recoverable classification failure: the log matches no rule. Emitted as
/// an `Unknown`, non-auto-fixable issue so the loop keeps going.
fn unknown_issue(log: &str, context: &JobContext) -> Issue {
    let first_line = log.lines().next().unwrap_or("").to_string();
    let fp = fingerprint::compute(IssueKind::Unknown, None, &first_line);
    Issue {
        kind: IssueKind::Unknown,
        fingerprint: fp,
        matched: first_line,
        file_hint: None,
        run_id: context.run_id.clone(),
        job_id: context.job_id.clone(),
        first_seen_iter: 0,
        last_seen_iter: 0,
        retries: 0,
    }
}
