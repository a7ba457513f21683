//! The paid `addFun` write, gated by on-chain and local preconditions.
//!
//! [`FunAction::send_fun`] walks a fixed sequence of gates before it spends
//! anything:
//!
//! ```text
//! paused? ──► fee <= budget? ──► balance >= budget? ──► pick message
//!                                                          │
//!    notify ◄── confirmed ◄── NonceRetryExecutor ◄── estimate gas (or fallback)
//! ```
//!
//! Every failure is logged and turned into an [`ActionOutcome`]; nothing escapes
//! to the caller, so a run can always continue with its next iteration.

use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address, B256, U256};
use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tracing::Level;

use crate::ext::{
    ChainError, ChainPort, ExecutorError, GasLimit, GasPolicy, NonceRetryExecutor, Notifier,
    WalletSnapshot,
};

/// Messages sent with `addFun`, one picked at random per call.
pub const FUN_MESSAGES: [&str; 10] = [
    "hallo",
    "gm",
    "Have a great day!",
    "Sending some fun your way!",
    "Keep smiling!",
    "You're awesome!",
    "Stay positive!",
    "Make today amazing!",
    "Believe in yourself!",
    "You got this!",
];

// ============================================================================
// FunRequest
// ============================================================================

/// Immutable description of one `addFun` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunRequest {
    message: String,
    value: U256,
    gas_limit: u64,
}

impl FunRequest {
    pub fn new(message: impl Into<String>, value: U256, gas_limit: u64) -> Self {
        Self {
            message: message.into(),
            value,
            gas_limit,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Native value attached to the call, in wei.
    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

// ============================================================================
// MessageCatalog
// ============================================================================

/// Non-empty, ordered set of payload messages.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    messages: Arc<[String]>,
}

impl MessageCatalog {
    /// Returns `None` for an empty list.
    pub fn new<I, S>(messages: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let messages: Arc<[String]> = messages.into_iter().map(Into::into).collect();
        if messages.is_empty() {
            return None;
        }
        Some(Self { messages })
    }

    /// Uniformly random message; repeats across calls are allowed.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.messages[rng.gen_range(0..self.messages.len())]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.iter().any(|m| m == message)
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            messages: FUN_MESSAGES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// A gate that stopped the action before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionFailure {
    #[error("contract is paused")]
    Paused,

    #[error("contract fee {} exceeds spend amount {}", format_ether(*.fee), format_ether(*.budget))]
    FeeTooHigh { fee: U256, budget: U256 },

    #[error("insufficient balance: {} < {}", format_ether(*.balance), format_ether(*.required))]
    InsufficientBalance { balance: U256, required: U256 },
}

impl PreconditionFailure {
    /// Severity the failure is logged at. A low balance only warns.
    pub fn level(&self) -> Level {
        match self {
            PreconditionFailure::InsufficientBalance { .. } => Level::WARN,
            _ => Level::ERROR,
        }
    }
}

/// Failure after the gates were passed, or while reading them.
#[derive(Debug, Error)]
pub enum ActionFailure {
    #[error("failed to read {what}: {source}")]
    Read {
        what: &'static str,
        source: ChainError,
    },

    #[error(transparent)]
    Execution(#[from] ExecutorError),
}

/// Result of one action.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Write confirmed on-chain
    Sent {
        tx_hash: B256,
        message: String,
        gas: GasLimit,
        attempts: usize,
        notified: bool,
    },
    /// A precondition gate stopped the action
    Skipped(PreconditionFailure),
    /// A chain read or the write itself failed
    Failed(ActionFailure),
}

impl ActionOutcome {
    /// `true` only for a confirmed write; callers refresh the wallet on it.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Sent { .. })
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            ActionOutcome::Sent { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

// ============================================================================
// ContractAction
// ============================================================================

/// One unit of work driven by the loop controller.
#[async_trait]
pub trait ContractAction: Send + Sync {
    /// Perform the action once. An `Err` is treated as a failed iteration.
    async fn perform(&self) -> anyhow::Result<ActionOutcome>;
}

// ============================================================================
// FunAction
// ============================================================================

/// Sends `addFun(message)` paying a fixed amount, then notifies the mint API.
pub struct FunAction {
    chain: Arc<dyn ChainPort>,
    executor: NonceRetryExecutor,
    notifier: Arc<dyn Notifier>,
    wallet: watch::Receiver<WalletSnapshot>,
    catalog: MessageCatalog,
    spend_amount: U256,
    gas: GasPolicy,
}

impl FunAction {
    pub fn new(
        chain: Arc<dyn ChainPort>,
        notifier: Arc<dyn Notifier>,
        wallet: watch::Receiver<WalletSnapshot>,
        spend_amount: U256,
    ) -> Self {
        Self {
            executor: NonceRetryExecutor::new(Arc::clone(&chain)),
            chain,
            notifier,
            wallet,
            catalog: MessageCatalog::default(),
            spend_amount,
            gas: GasPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.executor = self.executor.with_max_retries(max);
        self
    }

    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_catalog(mut self, catalog: MessageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn address(&self) -> Address {
        self.chain.address()
    }

    /// Run the gates, send the write and notify. Logs the outcome.
    pub async fn send_fun(&self) -> ActionOutcome {
        let outcome = match self.try_send_fun().await {
            Ok(outcome) => outcome,
            Err(failure) => ActionOutcome::Failed(failure),
        };
        self.log_outcome(&outcome);
        outcome
    }

    async fn try_send_fun(&self) -> Result<ActionOutcome, ActionFailure> {
        let address = self.chain.address();

        // 1. Contract must be live
        let paused = self.chain.is_paused().await.map_err(|source| ActionFailure::Read {
            what: "paused flag",
            source,
        })?;
        if paused {
            return Ok(ActionOutcome::Skipped(PreconditionFailure::Paused));
        }

        // 2. Never pay more than the configured budget
        let fee = self.chain.required_fee().await.map_err(|source| ActionFailure::Read {
            what: "contract fee",
            source,
        })?;
        if fee > self.spend_amount {
            return Ok(ActionOutcome::Skipped(PreconditionFailure::FeeTooHigh {
                fee,
                budget: self.spend_amount,
            }));
        }

        // 3. Local snapshot, not a fresh read
        let balance = self.wallet.borrow().balance;
        if balance < self.spend_amount {
            return Ok(ActionOutcome::Skipped(
                PreconditionFailure::InsufficientBalance {
                    balance,
                    required: self.spend_amount,
                },
            ));
        }

        // 4. Payload
        let message = self.catalog.choose(&mut rand::thread_rng()).to_owned();
        tracing::info!(
            %address,
            message = %message,
            value = %format_ether(self.spend_amount),
            "sending fun"
        );

        // 5. Gas limit
        let estimate = self.chain.estimate_gas(&message, self.spend_amount).await;
        let gas = self.gas.resolve(estimate);
        if let GasLimit::Buffered { estimate, limit } = &gas {
            tracing::info!(estimate, limit, "estimated gas");
        }
        let request = FunRequest::new(message, self.spend_amount, gas.limit());

        // 6. Submit with nonce refresh
        let chain = &self.chain;
        let req = &request;
        let execution = self
            .executor
            .execute(move |nonce| chain.submit_write(req, nonce))
            .await?;

        // 7. Confirmed
        tracing::info!(
            %address,
            tx_hash = %execution.tx_hash(),
            attempts = execution.attempt_count(),
            "fun sent"
        );
        let notified = self.notify(address, request.message()).await;

        Ok(ActionOutcome::Sent {
            tx_hash: execution.tx_hash(),
            message: request.message,
            gas,
            attempts: execution.attempt_count(),
            notified,
        })
    }

    /// Failures here are reported but never undo the write.
    async fn notify(&self, address: Address, message: &str) -> bool {
        match self.notifier.notify(address, message).await {
            Ok(response) if response.success => {
                tracing::info!(%address, message, "mint notification accepted");
                true
            }
            Ok(response) => {
                tracing::warn!(
                    %address,
                    reason = response.message.as_deref().unwrap_or("unknown"),
                    "mint notification rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "mint notification failed");
                false
            }
        }
    }

    fn log_outcome(&self, outcome: &ActionOutcome) {
        match outcome {
            ActionOutcome::Sent { .. } => {}
            ActionOutcome::Skipped(reason) if reason.level() == Level::WARN => {
                tracing::warn!(reason = %reason, "fun skipped");
            }
            ActionOutcome::Skipped(reason) => {
                tracing::error!(reason = %reason, "fun skipped");
            }
            ActionOutcome::Failed(failure) => {
                tracing::error!(error = %failure, "fun failed");
            }
        }
    }
}

#[async_trait]
impl ContractAction for FunAction {
    async fn perform(&self) -> anyhow::Result<ActionOutcome> {
        Ok(self.send_fun().await)
    }
}
