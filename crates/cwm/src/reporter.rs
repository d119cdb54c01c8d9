//! `Reporter`: structured log sink + per-iteration and
//! final JSON report writer. Reports are written via temp-file-plus-
//! rename; partial files are never observed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fixers::util::atomic_write;
use crate::issue::IssueKind;

/// Outcome of one tick, recorded for the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    Continue,
    StopPassed,
    StopBudget,
    StopFatal,
    StopCancelled,
}

/// Per-tick snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub counts_by_kind: std::collections::BTreeMap<String, u32>,
    pub fixes_applied: u32,
    pub commit_sha: Option<String>,
    pub next_action: NextAction,
}

impl IterationRecord {
    #[must_use]
    pub fn new(
        iteration: u32,
        counts_by_kind: &std::collections::HashMap<IssueKind, u32>,
        fixes_applied: u32,
        commit_sha: Option<String>,
        next_action: NextAction,
    ) -> Self {
        let counts_by_kind = counts_by_kind
            .iter()
            .map(|(k, v)| (k.short_name().to_string(), *v))
            .collect();
        Self {
            iteration,
            timestamp: Utc::now(),
            counts_by_kind,
            fixes_applied,
            commit_sha,
            next_action,
        }
    }
}

/// Aggregate of all `IterationRecord`s plus summary counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_issues_found: u32,
    pub total_fixes_applied: u32,
    pub success: bool,
    /// Short per-fingerprint history for any fingerprint that was marked
    /// `Exhausted`.
    pub exhausted_fingerprints: Vec<ExhaustedSummary>,
    pub iterations: Vec<IterationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustedSummary {
    pub fingerprint: String,
    pub kind: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub struct Reporter {
    reports_dir: PathBuf,
    iterations: Vec<IterationRecord>,
    started_at: DateTime<Utc>,
}

impl Reporter {
    #[must_use]
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            reports_dir: workspace_root.join("reports"),
            iterations: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Write `reports/iter-<N>-<timestamp>.json` for this tick.
    pub fn write_iteration(&mut self, record: IterationRecord) -> Result<()> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let filename = format!(
            "iter-{}-{}.json",
            record.iteration,
            record.timestamp.format("%Y%m%dT%H%M%SZ")
        );
        let path = self.reports_dir.join(filename);
        let body = serde_json::to_vec_pretty(&record)?;
        atomic_write(&path, &body)?;
        self.iterations.push(record);
        Ok(())
    }

    /// Write `reports/final-<timestamp>.json`: all iterations plus
    /// aggregate counters, keeping the last 100 iterations verbatim
    ///
    pub fn write_final(
        &self,
        success: bool,
        exhausted_fingerprints: Vec<ExhaustedSummary>,
    ) -> Result<FinalReport> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let ended_at = Utc::now();
        let total_issues_found = self
            .iterations
            .iter()
            .map(|i| i.counts_by_kind.values().sum::<u32>())
            .sum();
        let total_fixes_applied = self.iterations.iter().map(|i| i.fixes_applied).sum();

        let last_100: Vec<IterationRecord> = self
            .iterations
            .iter()
            .rev()
            .take(100)
            .rev()
            .cloned()
            .collect();

        let report = FinalReport {
            started_at: self.started_at,
            ended_at,
            total_issues_found,
            total_fixes_applied,
            success,
            exhausted_fingerprints,
            iterations: last_100,
        };

        let filename = format!("final-{}.json", ended_at.format("%Y%m%dT%H%M%SZ"));
        let path = self.reports_dir.join(filename);
        let body = serde_json::to_vec_pretty(&report)?;
        atomic_write(&path, &body)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_iteration_persists_file_and_tracks_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = Reporter::new(dir.path());
        let record = IterationRecord::new(1, &std::collections::HashMap::new(), 0, None, NextAction::Continue);
        reporter.write_iteration(record).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("reports")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn final_report_aggregates_fixes_and_caps_history_at_100() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = Reporter::new(dir.path());
        for i in 1..=120 {
            let record = IterationRecord::new(i, &std::collections::HashMap::new(), 1, None, NextAction::Continue);
            reporter.write_iteration(record).unwrap();
        }
        let report = reporter.write_final(true, vec![]).unwrap();
        assert_eq!(report.total_fixes_applied, 120);
        assert_eq!(report.iterations.len(), 100);
        assert_eq!(report.iterations.first().unwrap().iteration, 21);
    }
}
