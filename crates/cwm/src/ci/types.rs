//! Wire-level types for the CI provider adapter.
//!
//! Grounded in `crates/healer/src/sensors/github_actions.rs`'s
//! `WorkflowFailure` struct: a small, serde-derived snapshot of a workflow
//! run translated from the provider's JSON shape.

use serde::{Deserialize, Serialize};

/// Opaque run identifier from the CI provider; unique per workflow run.
pub type RunId = String;

/// Opaque job identifier; a run has at least one job.
pub type JobId = String;

/// Status of a workflow run. Only `Failure` triggers classification;
/// `Success` contributes to the pass-streak counter; all others are
/// neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Success,
    Failure,
    Cancelled,
    Skipped,
    Unknown,
}

impl RunStatus {
    /// Map a GitHub Actions `status`/`conclusion` pair onto [`RunStatus`].
    #[must_use]
    pub fn from_github(status: &str, conclusion: Option<&str>) -> Self {
        match status {
            "queued" | "waiting" | "pending" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => match conclusion {
                Some("success") => RunStatus::Success,
                Some("failure") | Some("timed_out") | Some("action_required") => {
                    RunStatus::Failure
                }
                Some("cancelled") => RunStatus::Cancelled,
                Some("skipped") | Some("neutral") => RunStatus::Skipped,
                _ => RunStatus::Unknown,
            },
            _ => RunStatus::Unknown,
        }
    }
}

/// One workflow run as returned by `listRecentRuns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: RunId,
    pub workflow_name: String,
    pub status: RunStatus,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub job_ids: Vec<JobId>,
}

/// Opaque, monotone cursor into the provider's run history; persisted only
/// in memory. We use the highest `completed_at` timestamp
/// observed so far, which is naturally monotone for a REST provider that
/// returns runs newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cursor(pub Option<chrono::DateTime<chrono::Utc>>);

impl Cursor {
    #[must_use]
    pub fn advance(&self, candidate: chrono::DateTime<chrono::Utc>) -> Self {
        match self.0 {
            Some(current) if current >= candidate => self.clone(),
            _ => Cursor(Some(candidate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_status_mapping_covers_conclusions() {
        assert_eq!(
            RunStatus::from_github("completed", Some("success")),
            RunStatus::Success
        );
        assert_eq!(
            RunStatus::from_github("completed", Some("failure")),
            RunStatus::Failure
        );
        assert_eq!(RunStatus::from_github("queued", None), RunStatus::Queued);
        assert_eq!(
            RunStatus::from_github("completed", Some("cancelled")),
            RunStatus::Cancelled
        );
    }

    #[test]
    fn cursor_only_advances_forward() {
        let c0 = Cursor::default();
        let t1 = chrono::Utc::now();
        let c1 = c0.advance(t1);
        let t0_earlier = t1 - chrono::Duration::seconds(10);
        let c2 = c1.advance(t0_earlier);
        assert_eq!(c1.0, c2.0, "cursor must not move backward");
    }
}
