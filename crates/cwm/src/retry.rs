//! `RetryBudget`: per-fingerprint retry counter with
//! exponential backoff, plus global iteration and wall-clock caps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-fingerprint retry bookkeeping.
#[derive(Debug, Clone)]
struct Entry {
    attempts: u32,
    last_attempt: Option<Instant>,
    exhausted: bool,
}

pub struct RetryBudget {
    max_retries: u32,
    base_spacing: Duration,
    spacing_cap: Duration,
    max_iterations: u32,
    max_wall_clock: Duration,
    started_at: Instant,
    entries: HashMap<String, Entry>,
}

/// Why the orchestrator loop should stop, if it should.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Continue,
    IterationsExhausted,
    WallClockExhausted,
}

impl RetryBudget {
    #[must_use]
    pub fn new(max_retries: u32, max_iterations: u32, max_wall_clock: Duration) -> Self {
        Self {
            max_retries,
            base_spacing: Duration::from_secs(30),
            spacing_cap: Duration::from_secs(600),
            max_iterations,
            max_wall_clock,
            started_at: Instant::now(),
            entries: HashMap::new(),
        }
    }

    /// Whether `fingerprint` is eligible for another fix attempt right now:
    /// not yet `Exhausted`, and enough time has elapsed since its previous
    /// attempt (`base * 2^(i-1)`, capped per step).
    #[must_use]
    pub fn eligible_now(&self, fingerprint: &str) -> bool {
        match self.entries.get(fingerprint) {
            None => true,
            Some(entry) if entry.exhausted => false,
            Some(entry) => match entry.last_attempt {
                None => true,
                Some(last) => {
                    let required = self.spacing_for_attempt(entry.attempts);
                    last.elapsed() >= required
                }
            },
        }
    }

    #[must_use]
    pub fn is_exhausted(&self, fingerprint: &str) -> bool {
        self.entries
            .get(fingerprint)
            .is_some_and(|e| e.exhausted)
    }

    fn spacing_for_attempt(&self, attempt_index: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt_index.saturating_sub(1));
        let secs = self.base_spacing.as_secs().saturating_mul(exp);
        Duration::from_secs(secs).min(self.spacing_cap)
    }

    /// Record one fix attempt for `fingerprint`, regardless of its outcome
    /// ("increment that fingerprint's retry counter
    /// regardless of outcome"). Marks the fingerprint `Exhausted` once
    /// `max_retries` is reached.
    pub fn record_attempt(&mut self, fingerprint: &str) {
        let entry = self.entries.entry(fingerprint.to_string()).or_insert(Entry {
            attempts: 0,
            last_attempt: None,
            exhausted: false,
        });
        entry.attempts += 1;
        entry.last_attempt = Some(Instant::now());
        if entry.attempts >= self.max_retries {
            entry.exhausted = true;
        }
    }

    #[must_use]
    pub fn attempts(&self, fingerprint: &str) -> u32 {
        self.entries.get(fingerprint).map_or(0, |e| e.attempts)
    }

    /// Global caps: `maxIterations` and `maxWallClock`.
    #[must_use]
    pub fn status(&self, current_iteration: u32) -> BudgetStatus {
        if current_iteration >= self.max_iterations {
            return BudgetStatus::IterationsExhausted;
        }
        if self.started_at.elapsed() >= self.max_wall_clock {
            return BudgetStatus::WallClockExhausted;
        }
        BudgetStatus::Continue
    }
}
