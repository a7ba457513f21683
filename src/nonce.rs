//! Nonce-refreshing retry executor for single chain writes.
//!
//! A write can fail because its nonce went stale between reading it and the node
//! accepting the transaction, or because the transaction was mined and reverted.
//! Both are transient for this workload, so the executor re-reads the pending
//! nonce and submits again, up to a fixed number of attempts.
//!
//! ## Attempt Flow
//!
//! ```text
//!   pending_nonce() ──► build_and_send(nonce) ──► await_confirmation()
//!         ▲                    │                          │
//!         │                    └──── error ───┐     status == false
//!         │                                   ▼           │
//!         └──── retryable && attempts left ◄── classify ◄─┘
//!                              │
//!                              ├── not retryable ──► Rejected
//!                              └── no attempts left ──► Exhausted
//! ```
//!
//! The nonce is never cached across attempts: a failed attempt may still have
//! consumed it.

use std::{future::Future, sync::Arc};

use alloy::primitives::B256;
use thiserror::Error;

use crate::ext::{ChainError, ChainErrorKind, ChainPort, PendingWrite, WriteReceipt};

/// Default number of attempts for one write.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// Attempt records
// ============================================================================

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Write confirmed with a successful status
    Confirmed { tx_hash: B256 },
    /// Failed with an error the executor retries on
    Retryable { kind: ChainErrorKind, error: String },
    /// Failed with an error that ends the execution
    Fatal { error: String },
}

/// One attempt made by [`NonceRetryExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt index
    pub attempt: u32,
    /// Nonce used, `None` when reading the nonce itself failed
    pub nonce: Option<u64>,
    pub outcome: AttemptOutcome,
}

/// Successful execution: the receipt plus every attempt that led to it.
#[derive(Debug, Clone)]
pub struct Execution {
    pub receipt: WriteReceipt,
    pub attempts: Vec<RetryAttempt>,
}

impl Execution {
    pub fn tx_hash(&self) -> B256 {
        self.receipt.tx_hash
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Every attempt failed with a retryable error.
    #[error("failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: ChainError },

    /// An attempt failed with an error that is not retried.
    #[error("write rejected on attempt {attempt}: {source}")]
    Rejected { attempt: u32, source: ChainError },
}

impl ExecutorError {
    /// The chain error that ended the execution.
    pub fn chain_error(&self) -> &ChainError {
        match self {
            ExecutorError::Exhausted { last_error, .. } => last_error,
            ExecutorError::Rejected { source, .. } => source,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::Exhausted { attempts, .. } => *attempts,
            ExecutorError::Rejected { attempt, .. } => *attempt,
        }
    }
}

// ============================================================================
// NonceRetryExecutor
// ============================================================================

/// Runs one chain write with a fresh pending nonce per attempt.
#[derive(Clone)]
pub struct NonceRetryExecutor {
    chain: Arc<dyn ChainPort>,
    max_retries: u32,
}

impl NonceRetryExecutor {
    pub fn new(chain: Arc<dyn ChainPort>) -> Self {
        Self {
            chain,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the attempt ceiling. Values below 1 still make one attempt.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Execute a write built by `build_and_send` for each attempt's nonce.
    ///
    /// Returns once a write is confirmed with a successful status. Retryable
    /// failures (stale or used nonce, revert) trigger another attempt with a
    /// freshly read nonce; anything else is returned immediately.
    pub async fn execute<F, Fut>(&self, mut build_and_send: F) -> Result<Execution, ExecutorError>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<Box<dyn PendingWrite>, ChainError>>,
    {
        let address = self.chain.address();
        let max_attempts = self.max_retries();
        let mut attempts = Vec::with_capacity(max_attempts as usize);

        loop {
            let attempt = attempts.len() as u32 + 1;

            let (nonce, result) = match self.chain.pending_nonce().await {
                Ok(nonce) => (Some(nonce), submit_and_confirm(&mut build_and_send, nonce).await),
                Err(e) => (None, Err(e)),
            };

            match result {
                Ok(receipt) => {
                    tracing::debug!(
                        %address, attempt, ?nonce, tx_hash = %receipt.tx_hash,
                        "write confirmed"
                    );
                    attempts.push(RetryAttempt {
                        attempt,
                        nonce,
                        outcome: AttemptOutcome::Confirmed {
                            tx_hash: receipt.tx_hash,
                        },
                    });
                    return Ok(Execution { receipt, attempts });
                }

                Err(error) if !error.is_retryable() => {
                    tracing::warn!(
                        %address, attempt, ?nonce, error = %error,
                        "write failed with non-retryable error"
                    );
                    return Err(ExecutorError::Rejected {
                        attempt,
                        source: error,
                    });
                }

                Err(error) => {
                    tracing::warn!(
                        %address, attempt, max_attempts, ?nonce, kind = ?error.kind(), error = %error,
                        "write failed, refreshing nonce"
                    );
                    attempts.push(RetryAttempt {
                        attempt,
                        nonce,
                        outcome: AttemptOutcome::Retryable {
                            kind: error.kind(),
                            error: error.to_string(),
                        },
                    });

                    if attempt >= max_attempts {
                        return Err(ExecutorError::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                }
            }
        }
    }
}

/// One attempt: send with `nonce`, wait for the receipt, reject failed status.
async fn submit_and_confirm<F, Fut>(build_and_send: &mut F, nonce: u64) -> Result<WriteReceipt, ChainError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Box<dyn PendingWrite>, ChainError>>,
{
    let pending = build_and_send(nonce).await?;
    let receipt = pending.await_confirmation().await?;
    if !receipt.status {
        return Err(ChainError::reverted(receipt.tx_hash));
    }
    Ok(receipt)
}
