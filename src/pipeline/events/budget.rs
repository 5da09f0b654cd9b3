//! Time budget for the model call.
//!
//! `BudgetTimer` cancels a token once the budget elapses. Dropping the
//! timer aborts it, so every exit path clears the pending timer.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MIN_BUDGET_MS: u64 = 1_000;
pub const MAX_BUDGET_MS: u64 = 20_000;

/// Clamp a requested budget into `[MIN_BUDGET_MS, MAX_BUDGET_MS]`.
/// Out-of-range values are corrected silently.
pub fn clamp_budget(requested: Option<u64>, default_ms: u64) -> Duration {
    let ms = requested.unwrap_or(default_ms).clamp(MIN_BUDGET_MS, MAX_BUDGET_MS);
    Duration::from_millis(ms)
}

pub struct BudgetTimer {
    budget: Duration,
    started: Instant,
    handle: JoinHandle<()>,
}

impl BudgetTimer {
    /// Start the timer. Must be called inside a tokio runtime.
    pub fn start(budget: Duration, token: CancellationToken) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            token.cancel();
        });
        Self {
            budget,
            started: Instant::now(),
            handle,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for BudgetTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
