//! Wallet snapshot published to the rest of the process.
//!
//! The monitor owns the only writer of the snapshot; the action and the CLI
//! read it through `watch` receivers, so a balance shown or checked is always
//! the last one the monitor loaded.

use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address, U256};
use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::ext::{ChainError, ChainPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    /// No balance loaded yet
    Initializing,
    Ready,
    /// Last refresh failed, balance is stale
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub address: Address,
    /// Native balance in wei
    pub balance: U256,
    pub network: String,
    pub status: WalletStatus,
}

impl WalletSnapshot {
    pub fn balance_ether(&self) -> String {
        format_ether(self.balance)
    }
}

/// Something the loop can ask to reload wallet state.
#[async_trait]
pub trait WalletRefresh: Send + Sync {
    async fn refresh(&self) -> anyhow::Result<()>;
}

pub struct WalletMonitor {
    chain: Arc<dyn ChainPort>,
    snapshot: watch::Sender<WalletSnapshot>,
}

impl WalletMonitor {
    pub fn new(chain: Arc<dyn ChainPort>, network: impl Into<String>) -> Self {
        let (snapshot, _) = watch::channel(WalletSnapshot {
            address: chain.address(),
            balance: U256::ZERO,
            network: network.into(),
            status: WalletStatus::Initializing,
        });
        Self { chain, snapshot }
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Read the balance and publish it. On failure the old balance is kept and
    /// the status becomes [`WalletStatus::Error`].
    pub async fn reload(&self) -> Result<WalletSnapshot, ChainError> {
        match self.chain.balance().await {
            Ok(balance) => {
                self.snapshot.send_modify(|s| {
                    s.balance = balance;
                    s.status = WalletStatus::Ready;
                });
                let snapshot = self.snapshot();
                tracing::info!(
                    address = %snapshot.address,
                    network = %snapshot.network,
                    balance = %snapshot.balance_ether(),
                    "wallet updated"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.snapshot.send_modify(|s| s.status = WalletStatus::Error);
                tracing::error!(address = %self.chain.address(), error = %e, "failed to load wallet balance");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl WalletRefresh for WalletMonitor {
    async fn refresh(&self) -> anyhow::Result<()> {
        self.reload().await.context("failed to refresh wallet")?;
        Ok(())
    }
}
