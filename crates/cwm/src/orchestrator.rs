//! `Orchestrator`: the control loop. Owns `IssueSet`,
//! `RetryBudget`, `cursor`, pass-streak counter, iteration index.
//!
//! Grounded in `crates/healer/src/sensors/github_actions.rs`'s `run()`
//! infinite-loop-plus-`tokio::time::sleep` shape, generalized from a
//! webhook-triggered sensor into a poll-classify-fix-commit loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::ci::{CiProvider, Cursor, RunStatus};
use crate::classifier::{self, JobContext};
use crate::config::Config;
use crate::error::{CwmError, Result};
use crate::fixers::FixerRegistry;
use crate::issue::{FixResult, IssueKind, IssueSet};
use crate::reporter::{ExhaustedSummary, FinalReport, IterationRecord, NextAction, Reporter};
use crate::retry::{BudgetStatus, RetryBudget};
use crate::vcs::{PushResult, VcsDriver};

/// Final exit condition, mapped to a process exit code in `bin/cwm.rs`
/// (`0` all-pass, `2` budget, `3` fatal, `130` cancelled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Passed,
    Budget,
    Fatal(String),
    Cancelled,
}

/// Shared flag a signal handler or test harness can flip to request a
/// graceful stop.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

pub struct Orchestrator {
    ci: Arc<dyn CiProvider>,
    config: Config,
    issue_set: IssueSet,
    retry_budget: RetryBudget,
    cursor: Cursor,
    pass_streak: u32,
    iteration: u32,
    fixers: FixerRegistry,
    vcs: VcsDriver,
    reporter: Reporter,
    cancellation: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(ci: Arc<dyn CiProvider>, config: Config, cancellation: CancellationToken) -> Self {
        let retry_budget = RetryBudget::new(
            config.max_retries,
            config.max_iterations,
            Duration::from_secs(config.max_wall_clock_secs),
        );
        let fixers = FixerRegistry::new(config.workspace_root.clone(), config.write_dotenv);
        let vcs = VcsDriver::new(config.workspace_root.clone());
        let reporter = Reporter::new(&config.workspace_root);

        Self {
            ci,
            config,
            issue_set: IssueSet::new(),
            retry_budget,
            cursor: Cursor::default(),
            pass_streak: 0,
            iteration: 0,
            fixers,
            vcs,
            reporter,
            cancellation,
        }
    }

    /// Run ticks until a termination predicate holds.
    pub async fn run(&mut self) -> Result<(StopReason, FinalReport)> {
        if !self.config.dry_run {
            crate::vcs::ensure_git_repo(&self.config.workspace_root)?;
        }

        loop {
            self.iteration += 1;
            let (mut action, stop) = self.tick().await?;

            if stop.is_none() && self.cancellation.is_cancelled() {
                action.next_action = NextAction::StopCancelled;
                self.reporter.write_iteration(action)?;
                let exhausted = self.exhausted_summaries();
                let report = self.reporter.write_final(false, exhausted)?;
                return Ok((StopReason::Cancelled, report));
            }

            self.reporter.write_iteration(action)?;

            if let Some(reason) = stop {
                let success = matches!(reason, StopReason::Passed);
                let exhausted = self.exhausted_summaries();
                let report = self.reporter.write_final(success, exhausted)?;
                return Ok((reason, report));
            }

            tokio::time::sleep(Duration::from_secs(self.config.check_interval_secs)).await;
        }
    }

    /// One tick of the control loop. Returns the `IterationRecord` to
    /// persist and, if the loop should stop, the reason.
    async fn tick(&mut self) -> Result<(IterationRecord, Option<StopReason>)> {
        // Step 1: list recent runs, update cursor.
        let runs = match self
            .ci
            .list_recent_runs(&self.config.branch, &self.cursor)
            .await
        {
            Ok((runs, cursor)) => {
                self.cursor = cursor;
                runs
            }
            Err(CwmError::Auth(msg)) => {
                return Ok((
                    self.record(0, None, NextAction::StopFatal),
                    Some(StopReason::Fatal(format!("auth failure: {msg}"))),
                ));
            }
            Err(CwmError::RateLimited { .. }) => {
                // Second rate-limit within CIClient already bubbled up past
                // its own one-retry discipline; this tick aborts and the
                // orchestrator sleeps a full checkInterval before the next.
                warn!("tick aborted after rate limit, sleeping full interval");
                return Ok((self.record(0, None, NextAction::Continue), None));
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient error listing runs, continuing");
                return Ok((self.record(0, None, NextAction::Continue), None));
            }
            Err(e) if e.is_fatal() => {
                return Ok((
                    self.record(0, None, NextAction::StopFatal),
                    Some(StopReason::Fatal(e.to_string())),
                ));
            }
            Err(e) => {
                // A generic 4xx (`CwmError::Other`) surfaces per spec §4.1 as
                // an Unknown-severity issue, never fatal; the tick continues.
                warn!(error = %e, "non-fatal error listing runs, continuing");
                return Ok((self.record(0, None, NextAction::Continue), None));
            }
        };

        // Step 2: partition by status, update pass streak.
        let failed_runs: Vec<_> = runs
            .iter()
            .filter(|r| r.status == RunStatus::Failure)
            .collect();
        let all_succeeded = !runs.is_empty() && runs.iter().all(|r| r.status == RunStatus::Success);
        if failed_runs.is_empty() && all_succeeded {
            self.pass_streak += 1;
        } else if !runs.is_empty() {
            self.pass_streak = 0;
        }

        // Step 3: pass-streak termination.
        if self.pass_streak >= self.config.required_pass_streak {
            return Ok((
                self.record(0, None, NextAction::StopPassed),
                Some(StopReason::Passed),
            ));
        }

        // Step 4: fetch + classify failed runs' jobs, merge into IssueSet.
        let fan_out = self.config.max_inflight_fetches.max(1);
        let max_log_bytes = self.config.max_log_bytes;
        let iteration = self.iteration;

        let mut fetches = Vec::new();
        for run in &failed_runs {
            for job_id in &run.job_ids {
                fetches.push((run.run_id.clone(), job_id.clone()));
            }
        }

        let ci = Arc::clone(&self.ci);
        let results: Vec<Result<(String, String, String)>> = stream::iter(fetches.into_iter())
            .map(|(run_id, job_id)| {
                let ci = Arc::clone(&ci);
                async move {
                    let log = ci
                        .fetch_job_logs(&run_id, &job_id, max_log_bytes)
                        .await?;
                    Ok((run_id, job_id, log))
                }
            })
            .buffer_unordered(fan_out)
            .collect()
            .await;

        let mut counts_by_kind: HashMap<IssueKind, u32> = HashMap::new();
        for result in results {
            match result {
                Ok((run_id, job_id, log)) => {
                    let context = JobContext { run_id, job_id };
                    for issue in classifier::classify(&log, &context) {
                        *counts_by_kind.entry(issue.kind).or_insert(0) += 1;
                        self.issue_set.observe(issue, iteration);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "transient error fetching job logs, skipping job this tick");
                }
                Err(e) if e.is_fatal() => {
                    return Ok((
                        self.record(0, None, NextAction::StopFatal),
                        Some(StopReason::Fatal(e.to_string())),
                    ));
                }
                Err(e) => {
                    // A generic 4xx (`CwmError::Other`) surfaces per spec
                    // §4.1 as an Unknown-severity issue, never fatal; skip
                    // this job's log for the tick and continue.
                    warn!(error = %e, "non-fatal error fetching job logs, skipping job this tick");
                }
            }
        }
        self.issue_set.retire_stale(iteration);

        // Step 5: select applyable issues, ordered by severity.
        let retry_budget = &self.retry_budget;
        let applyable = self
            .issue_set
            .applyable(|issue| retry_budget.eligible_now(&issue.fingerprint));

        // Step 6: apply fixes in order; increment retry counters regardless
        // of outcome.
        let mut fixes_applied = 0u32;
        if !self.config.dry_run {
            for issue in &applyable {
                let result = self.fixers.apply(issue)?;
                self.retry_budget.record_attempt(&issue.fingerprint);
                if let Some(stored) = self.issue_set.get_mut(&issue.fingerprint) {
                    stored.retries = self.retry_budget.attempts(&issue.fingerprint);
                }
                if result.is_applied() {
                    fixes_applied += 1;
                }
                log_fix_outcome(issue.kind, &issue.fingerprint, iteration, &result);
            }
        }

        // Step 7: commit and push if anything changed.
        let mut commit_sha = None;
        if fixes_applied > 0 && !self.config.dry_run {
            self.vcs.stage_all()?;
            let kinds_csv = applied_kinds_csv(&applyable);
            commit_sha = self.vcs.commit(iteration, &kinds_csv)?;
            if commit_sha.is_some() {
                match self.vcs.push()? {
                    PushResult::Ok | PushResult::UpToDate => {}
                    PushResult::Rejected(_) => {
                        self.vcs.fetch_and_rebase()?;
                        match self.vcs.push()? {
                            PushResult::Ok | PushResult::UpToDate => {}
                            PushResult::Rejected(reason) => {
                                return Ok((
                                    self.record(fixes_applied, commit_sha, NextAction::StopFatal),
                                    Some(StopReason::Fatal(format!(
                                        "push rejected twice: {reason}"
                                    ))),
                                ));
                            }
                            PushResult::NetworkError(e) => {
                                warn!(error = %e, "push network error after rebase, will retry next tick");
                            }
                        }
                    }
                    PushResult::NetworkError(e) => {
                        warn!(error = %e, "push network error, will retry next tick");
                    }
                }
            }
        }

        // Step 9 (budget check folded in before the sleep happens in run()).
        let status = self.retry_budget.status(self.iteration);
        let next_action = if status != BudgetStatus::Continue {
            NextAction::StopBudget
        } else {
            NextAction::Continue
        };
        let stop = match status {
            BudgetStatus::Continue => None,
            BudgetStatus::IterationsExhausted | BudgetStatus::WallClockExhausted => {
                Some(StopReason::Budget)
            }
        };

        Ok((
            self.record_with_counts(counts_by_kind, fixes_applied, commit_sha, next_action),
            stop,
        ))
    }

    fn record(
        &self,
        fixes_applied: u32,
        commit_sha: Option<String>,
        next_action: NextAction,
    ) -> IterationRecord {
        IterationRecord::new(self.iteration, &HashMap::new(), fixes_applied, commit_sha, next_action)
    }

    fn record_with_counts(
        &self,
        counts_by_kind: HashMap<IssueKind, u32>,
        fixes_applied: u32,
        commit_sha: Option<String>,
        next_action: NextAction,
    ) -> IterationRecord {
        IterationRecord::new(self.iteration, &counts_by_kind, fixes_applied, commit_sha, next_action)
    }

    fn exhausted_summaries(&self) -> Vec<ExhaustedSummary> {
        self.issue_set
            .iter()
            .filter(|issue| self.retry_budget.is_exhausted(&issue.fingerprint))
            .map(|issue| ExhaustedSummary {
                fingerprint: issue.fingerprint.clone(),
                kind: issue.kind.short_name().to_string(),
                attempts: self.retry_budget.attempts(&issue.fingerprint),
                last_error: None,
            })
            .collect()
    }
}

fn applied_kinds_csv(issues: &[crate::issue::Issue]) -> String {
    let mut kinds: Vec<&str> = issues.iter().map(|i| i.kind.short_name()).collect();
    kinds.sort_unstable();
    kinds.dedup();
    kinds.join(",")
}

fn log_fix_outcome(kind: IssueKind, fingerprint: &str, iteration: u32, result: &FixResult) {
    match result {
        FixResult::Applied => info!(fingerprint, iteration, kind = kind.short_name(), "fix applied"),
        FixResult::AlreadySatisfied => {
            info!(fingerprint, iteration, kind = kind.short_name(), "already satisfied")
        }
        FixResult::Skipped(reason) => {
            info!(fingerprint, iteration, kind = kind.short_name(), reason, "fix skipped")
        }
        FixResult::Failed(reason) => {
            error!(fingerprint, iteration, kind = kind.short_name(), reason, "fix failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::{MockCiProvider, WorkflowRun};

    fn base_config(workspace: &std::path::Path) -> Config {
        Config {
            ci_token: "tok".to_string(),
            repo_owner: "5dlabs".to_string(),
            repo_name: "cto".to_string(),
            branch: "main".to_string(),
            check_interval_secs: 0,
            max_retries: 5,
            max_iterations: 10,
            max_wall_clock_secs: 7200,
            required_pass_streak: 3,
            max_inflight_fetches: 4,
            max_log_bytes: 1024,
            workspace_root: workspace.to_path_buf(),
            write_dotenv: false,
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn three_consecutive_success_ticks_stop_passed() {
        let dir = tempfile::tempdir().unwrap();
        let mut ci = MockCiProvider::new();
        ci.expect_list_recent_runs().returning(|_, cursor| {
            Ok((
                vec![WorkflowRun {
                    run_id: "1".to_string(),
                    workflow_name: "ci".to_string(),
                    status: RunStatus::Success,
                    completed_at: Some(chrono::Utc::now()),
                    job_ids: vec![],
                }],
                cursor.clone(),
            ))
        });

        let config = base_config(dir.path());
        let mut orchestrator = Orchestrator::new(Arc::new(ci), config, CancellationToken::new());

        let (reason, report) = orchestrator.run().await.unwrap();
        assert_eq!(reason, StopReason::Passed);
        assert!(report.success);
        assert_eq!(report.total_fixes_applied, 0);
    }

    #[tokio::test]
    async fn dry_run_applies_no_fixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut ci = MockCiProvider::new();
        let mut call_count = 0;
        ci.expect_list_recent_runs().returning(move |_, cursor| {
            call_count += 1;
            Ok((
                vec![WorkflowRun {
                    run_id: format!("run-{call_count}"),
                    workflow_name: "ci".to_string(),
                    status: RunStatus::Failure,
                    completed_at: Some(chrono::Utc::now()),
                    job_ids: vec!["job-1".to_string()],
                }],
                cursor.clone(),
            ))
        });
        ci.expect_fetch_job_logs().returning(|_, _, _| {
            Ok("ModuleNotFoundError: No module named 'requests'".to_string())
        });

        let mut config = base_config(dir.path());
        config.max_iterations = 1;
        let mut orchestrator = Orchestrator::new(Arc::new(ci), config, CancellationToken::new());

        let (reason, report) = orchestrator.run().await.unwrap();
        assert_eq!(reason, StopReason::Budget);
        assert_eq!(report.total_fixes_applied, 0);
        assert!(!dir.path().join("requirements.txt").exists());
    }

    #[tokio::test]
    async fn cancellation_between_ticks_stops_loop_with_cancelled_reason() {
        let dir = tempfile::tempdir().unwrap();
        let mut ci = MockCiProvider::new();
        ci.expect_list_recent_runs().returning(|_, cursor| {
            Ok((
                vec![WorkflowRun {
                    run_id: "1".to_string(),
                    workflow_name: "ci".to_string(),
                    status: RunStatus::Failure,
                    completed_at: Some(chrono::Utc::now()),
                    job_ids: vec![],
                }],
                cursor.clone(),
            ))
        });

        let config = base_config(dir.path());
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let mut orchestrator = Orchestrator::new(Arc::new(ci), config, cancellation);

        let (reason, report) = orchestrator.run().await.unwrap();
        assert_eq!(reason, StopReason::Cancelled);
        assert!(!report.success);
    }
}
