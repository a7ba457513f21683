//! # quill-fun
//!
//! Cancellable auto sender for the Quill Fun contract, built on Alloy.
//!
//! ## Core Features
//!
//! - **Nonce-Retry Execution**: Fresh pending nonce per attempt, retries on stale nonce or revert
//! - **Gas Policy**: 20% buffer over the node estimate, fixed fallback when estimation fails
//! - **Gated Action**: Paused / fee / balance checks before any value is spent
//! - **Loop Control**: N iterations, random inter-iteration delay, cooperative cancellation
//! - **Mint Notification**: Cookie-authenticated Quills API client
//!
//! ## Usage
//!
//! ```ignore
//! use quill_fun::ext::*;
//!
//! let chain: Arc<dyn ChainPort> = Arc::new(AlloyChain::connect(&rpc_url, DEFAULT_CONTRACT, signer, None)?);
//! let wallet = Arc::new(WalletMonitor::new(chain.clone(), "Somnia Testnet"));
//! let action = FunAction::new(chain, notifier, wallet.subscribe(), spend);
//! let report = LoopController::new(Arc::new(action), wallet, session).run(5).await?;
//! ```

// ============================================================================
// Internal Module Declarations
// ============================================================================

/// The gated `addFun` action, its payload catalog and outcomes
mod action;

/// Command line and environment configuration
mod config;

/// Chain error classification
mod error;

/// Gas limit policy
mod gas;

/// Nonce-refreshing retry executor
mod nonce;

/// Quills API client used for mint notification
mod notifier;

/// Pending writes and receipts
mod pending_tx;

/// Chain port and the alloy-backed adapter
mod provider;

/// Loop controller and inter-iteration delay
mod runner;

/// Single-run state and cancellation
mod session;

/// Wallet snapshot and refresh
mod wallet;

/// Test harness module (compiled only in test mode)
#[cfg(test)]
pub mod test_harness;

// ============================================================================
// Public Exports
// ============================================================================

/// Re-export all public APIs from the alloy crate.
pub use alloy::*;

/// Everything this crate adds on top of alloy:
///
/// - `ChainPort` / `AlloyChain` - Chain access for one signing account
/// - `NonceRetryExecutor` - Write execution with nonce refresh
/// - `FunAction` - The gated paid write
/// - `LoopController` / `LoopSession` - Iteration driver and its cancellable run state
/// - `WalletMonitor` - Balance snapshot publisher
/// - `QuillsApi` - Mint notifier
pub mod ext {
    pub use super::action::*;
    pub use super::config::*;
    pub use super::error::*;
    pub use super::gas::*;
    pub use super::nonce::*;
    pub use super::notifier::*;
    pub use super::pending_tx::*;
    pub use super::provider::*;
    pub use super::runner::*;
    pub use super::session::*;
    pub use super::wallet::*;
}
