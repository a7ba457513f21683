//! Chain error classification for nonce-aware retries.
//!
//! Every failure coming out of the chain port carries a [`ChainErrorKind`] so the
//! executor can decide between "refresh the nonce and try again" and "give up now"
//! without looking at message text. Adapters that only get a string back from the
//! node build their errors through [`ChainError::classify`], which is the one place
//! where message matching still happens.

use std::fmt;

use alloy::primitives::B256;

// ============================================================================
// Error Classification Types
// ============================================================================

/// Classified chain error types for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    /// Nonce is lower than the account's pending count.
    /// Recovery: re-read the pending nonce, then retry
    NonceTooLow,

    /// Nonce was consumed by another transaction in the meantime.
    /// Recovery: re-read the pending nonce, then retry
    NonceAlreadyUsed,

    /// Transaction was mined but did not succeed (or the node reported a revert).
    /// Recovery: retry with a fresh nonce
    Reverted,

    /// Anything else: transport failures, bad input, insufficient funds...
    /// Recovery: none
    Other,
}

impl ChainErrorKind {
    /// Check if this error type is handled by refreshing the nonce and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainErrorKind::NonceTooLow | ChainErrorKind::NonceAlreadyUsed | ChainErrorKind::Reverted
        )
    }
}

// ============================================================================
// ChainError
// ============================================================================

/// Error returned by every chain port operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainError {
    kind: ChainErrorKind,
    message: String,
}

impl ChainError {
    pub fn new(kind: ChainErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error for anything that is not worth retrying.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ChainErrorKind::Other, message)
    }

    /// Error for a transaction whose receipt reports failure.
    pub fn reverted(tx_hash: B256) -> Self {
        Self::new(
            ChainErrorKind::Reverted,
            format!("transaction {tx_hash} reverted"),
        )
    }

    /// Build an error from a raw node/transport message.
    ///
    /// Matching is case-sensitive and substring based, which makes it fragile:
    /// it only recognises the wording used by geth-style nodes. Adapters should
    /// construct a [`ChainError`] with an explicit kind whenever they can.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_message(&message), message)
    }

    pub fn kind(&self) -> ChainErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ChainError {}

// ============================================================================
// Error Classification Functions
// ============================================================================

/// Classify a node error message into a known kind.
pub fn classify_message(message: &str) -> ChainErrorKind {
    if message.contains("nonce too low") {
        return ChainErrorKind::NonceTooLow;
    }

    if message.contains("nonce has already been used") {
        return ChainErrorKind::NonceAlreadyUsed;
    }

    if message.contains("reverted") {
        return ChainErrorKind::Reverted;
    }

    ChainErrorKind::Other
}
