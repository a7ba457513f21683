//! Chain port and its alloy-backed implementation.
//!
//! The core never talks to a provider directly. Everything it needs from the
//! chain goes through [`ChainPort`], which is bound to a single signing account:
//!
//! ```text
//! ChainPort
//! ├── reads:  pending_nonce, balance, is_paused, required_fee, estimate_gas
//! └── writes: submit_write ──► PendingWrite::await_confirmation ──► WriteReceipt
//! ```
//!
//! [`AlloyChain`] implements the port over HTTP with a wallet-enabled alloy
//! provider and the `sol!` binding of the fun contract.

use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use crate::ext::{AlloyPendingWrite, ChainError, FunRequest, PendingWrite};

alloy::sol! {
    #[sol(rpc)]
    contract FunContract {
        function addFun(string message) external payable;
        function paused() external view returns (bool);
        function funFee() external view returns (uint256);
    }
}

// ============================================================================
// ChainPort
// ============================================================================

/// Read/write access to the chain for exactly one account.
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Address of the account that signs every write.
    fn address(&self) -> Address;

    /// Transaction count of the account including pending transactions.
    async fn pending_nonce(&self) -> Result<u64, ChainError>;

    /// Native balance of the account, in wei.
    async fn balance(&self) -> Result<U256, ChainError>;

    /// Whether the target contract is paused.
    async fn is_paused(&self) -> Result<bool, ChainError>;

    /// Fee the target contract requires per call, in wei.
    async fn required_fee(&self) -> Result<U256, ChainError>;

    /// Estimate gas for `addFun(message)` sent with `value`.
    async fn estimate_gas(&self, message: &str, value: U256) -> Result<u64, ChainError>;

    /// Sign and broadcast the write with an explicit nonce.
    async fn submit_write(
        &self,
        request: &FunRequest,
        nonce: u64,
    ) -> Result<Box<dyn PendingWrite>, ChainError>;
}

// ============================================================================
// AlloyChain
// ============================================================================

/// [`ChainPort`] over an alloy HTTP provider with a local signer.
#[derive(Clone)]
pub struct AlloyChain {
    address: Address,
    provider: DynProvider,
    contract: FunContract::FunContractInstance<DynProvider>,
    receipt_timeout: Option<Duration>,
}

impl AlloyChain {
    /// Connect to `rpc_url` with `signer` as the only sending account.
    pub fn connect(
        rpc_url: &str,
        contract: Address,
        signer: PrivateKeySigner,
        receipt_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::new(signer))
            .connect_http(rpc_url.parse()?)
            .erased();
        let contract = FunContract::new(contract, provider.clone());

        tracing::debug!(%address, contract = %contract.address(), "connected chain provider");

        Ok(Self {
            address,
            provider,
            contract,
            receipt_timeout,
        })
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }
}

#[async_trait]
impl ChainPort for AlloyChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        let nonce = self
            .provider
            .get_transaction_count(self.address)
            .pending()
            .await
            .map_err(|e| ChainError::classify(e.to_string()))?;
        tracing::trace!(address = %self.address, nonce, "fetched pending nonce");
        Ok(nonce)
    }

    async fn balance(&self) -> Result<U256, ChainError> {
        self.provider
            .get_balance(self.address)
            .await
            .map_err(|e| ChainError::other(e.to_string()))
    }

    async fn is_paused(&self) -> Result<bool, ChainError> {
        self.contract
            .paused()
            .call()
            .await
            .map_err(|e| ChainError::other(e.to_string()))
    }

    async fn required_fee(&self) -> Result<U256, ChainError> {
        self.contract
            .funFee()
            .call()
            .await
            .map_err(|e| ChainError::other(e.to_string()))
    }

    async fn estimate_gas(&self, message: &str, value: U256) -> Result<u64, ChainError> {
        self.contract
            .addFun(message.to_string())
            .value(value)
            .estimate_gas()
            .await
            .map_err(|e| ChainError::classify(e.to_string()))
    }

    async fn submit_write(
        &self,
        request: &FunRequest,
        nonce: u64,
    ) -> Result<Box<dyn PendingWrite>, ChainError> {
        let pending = self
            .contract
            .addFun(request.message().to_string())
            .value(request.value())
            .gas(request.gas_limit())
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| ChainError::classify(e.to_string()))?;

        tracing::debug!(
            address = %self.address,
            nonce,
            tx_hash = %pending.tx_hash(),
            gas_limit = request.gas_limit(),
            "submitted addFun"
        );

        Ok(Box::new(AlloyPendingWrite::new(pending, self.receipt_timeout)))
    }
}
