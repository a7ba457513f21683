//! Loop controller: runs the contract action a fixed number of times.
//!
//! ```text
//! for i in 1..=N:
//!     cancel requested? ──► Stopped { at_iteration: i }
//!     action.perform()
//!     success? ──► wallet.refresh()
//!     i < N ──► sleep(random 30..=60s), woken early by cancel
//! ```
//!
//! A failed iteration never ends the run. The session guarantees a single
//! active run and is reset to idle whichever way the run ends.

use std::{fmt, sync::Arc, time::Duration};

use rand::Rng;
use thiserror::Error;

use crate::ext::{ContractAction, LoopSession, WalletRefresh};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

// ============================================================================
// DelayPolicy
// ============================================================================

/// Bounds for the random wait between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl DelayPolicy {
    /// Bounds are reordered if given backwards.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Uniform draw in `[min, max]` with millisecond resolution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every requested iteration was attempted
    Completed,
    /// Cancelled before `at_iteration` started
    Stopped { at_iteration: u32 },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Stopped { at_iteration } => {
                write!(f, "stopped at iteration {at_iteration}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub success: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub requested: u32,
    pub iterations: Vec<IterationRecord>,
    pub status: RunStatus,
}

impl RunReport {
    fn new(requested: u32) -> Self {
        Self {
            requested,
            iterations: Vec::with_capacity(requested as usize),
            status: RunStatus::Completed,
        }
    }

    fn record(&mut self, iteration: u32, success: bool) {
        self.iterations.push(IterationRecord { iteration, success });
    }

    pub fn attempted(&self) -> usize {
        self.iterations.len()
    }

    pub fn succeeded(&self) -> usize {
        self.iterations.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("iteration count must be at least 1")]
    NoIterations,
}

// ============================================================================
// LoopController
// ============================================================================

pub struct LoopController {
    action: Arc<dyn ContractAction>,
    wallet: Arc<dyn WalletRefresh>,
    session: Arc<LoopSession>,
    delay: DelayPolicy,
}

impl LoopController {
    pub fn new(
        action: Arc<dyn ContractAction>,
        wallet: Arc<dyn WalletRefresh>,
        session: Arc<LoopSession>,
    ) -> Self {
        Self {
            action,
            wallet,
            session,
            delay: DelayPolicy::default(),
        }
    }

    pub fn with_delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }

    pub fn session(&self) -> &Arc<LoopSession> {
        &self.session
    }

    /// Run the action `iterations` times, sequentially.
    pub async fn run(&self, iterations: u32) -> Result<RunReport, RunError> {
        if iterations == 0 {
            return Err(RunError::NoIterations);
        }
        let _guard = self.session.begin().ok_or(RunError::AlreadyRunning)?;

        tracing::info!(iterations, "starting run");
        let mut report = RunReport::new(iterations);

        for iteration in 1..=iterations {
            if self.session.is_cancel_requested() {
                report.status = RunStatus::Stopped {
                    at_iteration: iteration,
                };
                break;
            }

            tracing::info!(iteration, total = iterations, "starting iteration");
            let success = match self.action.perform().await {
                Ok(outcome) => outcome.is_success(),
                Err(e) => {
                    tracing::error!(iteration, error = %e, "action failed");
                    false
                }
            };
            report.record(iteration, success);

            if success {
                if let Err(e) = self.wallet.refresh().await {
                    tracing::warn!(iteration, error = %e, "wallet refresh failed");
                }
            }

            if iteration < iterations && !self.session.is_cancel_requested() {
                let delay = self.delay.sample(&mut rand::thread_rng());
                tracing::info!(
                    iteration,
                    "iteration finished, next in {}m {}s",
                    delay.as_secs() / 60,
                    delay.as_secs() % 60
                );
                if !self.wait(delay).await {
                    tracing::info!(iteration, "wait interrupted by cancellation");
                    report.status = RunStatus::Stopped {
                        at_iteration: iteration + 1,
                    };
                    break;
                }
            }
        }

        tracing::info!(
            status = %report.status,
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }

    /// Sleep for `delay`. Returns `false` when cancelled first.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.session.cancelled() => false,
        }
    }
}
