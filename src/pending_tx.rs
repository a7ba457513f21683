//! Pending writes and their confirmation.
//!
//! A [`PendingWrite`] is a transaction that has been accepted by the node but not
//! yet settled. Awaiting it yields a [`WriteReceipt`]; whether the receipt counts
//! as success is decided by the executor, not here.
//!
//! ```ignore
//! let pending = chain.submit_write(&request, nonce).await?;
//! let receipt = pending.await_confirmation().await?;
//! if !receipt.status {
//!     // mined, but reverted
//! }
//! ```

use std::time::Duration;

use alloy::{network::Ethereum, primitives::B256, providers::PendingTransactionBuilder};
use async_trait::async_trait;

use crate::ext::ChainError;

// ============================================================================
// WriteReceipt
// ============================================================================

/// Final state of a settled write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// `true` when the transaction executed successfully on-chain
    pub status: bool,
    /// Block the transaction was included in, if the node reported it
    pub block_number: Option<u64>,
}

// ============================================================================
// PendingWrite
// ============================================================================

/// A submitted, not yet settled chain write.
#[async_trait]
pub trait PendingWrite: Send {
    /// Hash the node assigned to the submitted transaction.
    fn tx_hash(&self) -> B256;

    /// Wait until the write is mined and return its receipt.
    async fn await_confirmation(self: Box<Self>) -> Result<WriteReceipt, ChainError>;
}

/// [`PendingWrite`] backed by alloy's `PendingTransactionBuilder`.
pub struct AlloyPendingWrite {
    inner: PendingTransactionBuilder<Ethereum>,
}

impl AlloyPendingWrite {
    pub fn new(inner: PendingTransactionBuilder<Ethereum>, receipt_timeout: Option<Duration>) -> Self {
        Self {
            inner: inner.with_timeout(receipt_timeout),
        }
    }
}

#[async_trait]
impl PendingWrite for AlloyPendingWrite {
    fn tx_hash(&self) -> B256 {
        *self.inner.tx_hash()
    }

    async fn await_confirmation(self: Box<Self>) -> Result<WriteReceipt, ChainError> {
        let tx_hash = self.tx_hash();
        let receipt = self.inner.get_receipt().await.map_err(|e| {
            tracing::warn!(%tx_hash, error = %e, "failed to get receipt");
            ChainError::classify(e.to_string())
        })?;

        tracing::debug!(
            %tx_hash,
            status = receipt.status(),
            block = ?receipt.block_number,
            "receipt received"
        );

        Ok(WriteReceipt {
            tx_hash: receipt.transaction_hash,
            status: receipt.status(),
            block_number: receipt.block_number,
        })
    }
}
