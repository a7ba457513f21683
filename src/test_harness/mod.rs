//! In-memory test doubles for the chain, the notifier and the loop collaborators.
//!
//! [`ScriptedChain`] plays the node: each submitted write consumes the next
//! [`WriteScript`] entry (an empty script confirms), and confirmed or mined
//! writes advance the pending nonce the way a real node would.
//!
//! # Example
//!
//! ```ignore
//! let chain = Arc::new(
//!     ScriptedChain::new()
//!         .with_nonce(10)
//!         .script(WriteScript::SubmitError(ChainError::classify("nonce too low"))),
//! );
//! let executor = NonceRetryExecutor::new(chain.clone());
//! ```

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy::primitives::{address, Address, B256, U256};
use anyhow::anyhow;
use async_trait::async_trait;

use crate::ext::{
    ActionOutcome, ChainError, ChainPort, ContractAction, FunRequest, GasLimit, LoopSession,
    Notifier, NotifyResponse, PendingWrite, PreconditionFailure, WalletRefresh, WriteReceipt,
};


/// Sender used by every scripted chain.
pub const TEST_ADDRESS: Address = address!("0x00000000000000000000000000000000000a11ce");

// ============================================================================
// WriteScript
// ============================================================================

/// What happens to the next submitted write
#[derive(Debug, Clone)]
pub enum WriteScript {
    /// Mined with a successful status
    Confirm,
    /// Mined with a failed status (consumes the nonce)
    MinedFailed,
    /// Rejected by the node at submission
    SubmitError(ChainError),
    /// Accepted, but waiting for the receipt fails
    ConfirmError(ChainError),
}

/// A write the chain accepted for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedWrite {
    pub nonce: u64,
    pub message: String,
    pub value: U256,
    pub gas_limit: u64,
}

// ============================================================================
// ScriptedChain
// ============================================================================

struct ChainState {
    next_nonce: u64,
    nonce_error: Option<ChainError>,
    balance: U256,
    balance_error: Option<ChainError>,
    paused: bool,
    fee: U256,
    fee_error: Option<ChainError>,
    estimate: Result<u64, ChainError>,
    writes: VecDeque<WriteScript>,
    nonce_fetches: usize,
    estimates: usize,
    submits: usize,
    submitted: Vec<SubmittedWrite>,
    tx_counter: u64,
}

/// [`ChainPort`] whose answers are configured up front.
pub struct ScriptedChain {
    state: Mutex<ChainState>,
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChain {
    /// Live contract, fee of 0.1 ether, 10 ether balance, estimate of 100,000.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                next_nonce: 0,
                nonce_error: None,
                balance: U256::from(10_000_000_000_000_000_000u128),
                balance_error: None,
                paused: false,
                fee: U256::from(100_000_000_000_000_000u64),
                fee_error: None,
                estimate: Ok(100_000),
                writes: VecDeque::new(),
                nonce_fetches: 0,
                estimates: 0,
                submits: 0,
                submitted: Vec::new(),
                tx_counter: 0,
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut ChainState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.with_state(|s| s.next_nonce = nonce)
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.with_state(|s| s.balance = balance)
    }

    pub fn with_fee(self, fee: U256) -> Self {
        self.with_state(|s| s.fee = fee)
    }

    pub fn with_estimate(self, gas: u64) -> Self {
        self.with_state(|s| s.estimate = Ok(gas))
    }

    pub fn paused(self, paused: bool) -> Self {
        self.with_state(|s| s.paused = paused)
    }

    pub fn estimate_fails(self, message: &str) -> Self {
        let error = ChainError::classify(message);
        self.with_state(|s| s.estimate = Err(error))
    }

    pub fn fail_nonce_reads(self, message: &str) -> Self {
        let error = ChainError::classify(message);
        self.with_state(|s| s.nonce_error = Some(error))
    }

    pub fn fail_fee_reads(self, message: &str) -> Self {
        let error = ChainError::other(message);
        self.with_state(|s| s.fee_error = Some(error))
    }

    pub fn fail_balance_reads(self, message: &str) -> Self {
        let error = ChainError::other(message);
        self.with_state(|s| s.balance_error = Some(error))
    }

    /// Queue the fate of the next submitted write.
    pub fn script(self, write: WriteScript) -> Self {
        self.with_state(|s| s.writes.push_back(write))
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn nonce_fetches(&self) -> usize {
        self.state.lock().unwrap().nonce_fetches
    }

    pub fn estimate_count(&self) -> usize {
        self.state.lock().unwrap().estimates
    }

    /// Submissions including the ones the node rejected.
    pub fn submit_count(&self) -> usize {
        self.state.lock().unwrap().submits
    }

    /// Writes recorded through [`ChainPort::submit_write`].
    pub fn submitted(&self) -> Vec<SubmittedWrite> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn current_nonce(&self) -> u64 {
        self.state.lock().unwrap().next_nonce
    }

    /// Submit a write without a request, for executor-only tests.
    pub async fn send_scripted(&self, nonce: u64) -> Result<Box<dyn PendingWrite>, ChainError> {
        self.submit(nonce, None)
    }

    fn submit(
        &self,
        nonce: u64,
        request: Option<&FunRequest>,
    ) -> Result<Box<dyn PendingWrite>, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.submits += 1;
        let status = match state.writes.pop_front().unwrap_or(WriteScript::Confirm) {
            WriteScript::SubmitError(e) => return Err(e),
            WriteScript::Confirm => Ok(true),
            WriteScript::MinedFailed => Ok(false),
            WriteScript::ConfirmError(e) => Err(e),
        };

        if let Some(request) = request {
            state.submitted.push(SubmittedWrite {
                nonce,
                message: request.message().to_string(),
                value: request.value(),
                gas_limit: request.gas_limit(),
            });
        }

        state.tx_counter += 1;
        let block = state.tx_counter;
        let tx_hash = B256::left_padding_from(&block.to_be_bytes());

        if let Ok(status) = status {
            state.next_nonce = nonce + 1;
            if let (true, Some(request)) = (status, request) {
                state.balance = state.balance.saturating_sub(request.value());
            }
        }

        let result = status.map(|status| WriteReceipt {
            tx_hash,
            status,
            block_number: Some(block),
        });
        Ok(Box::new(ScriptedPending { tx_hash, result }))
    }
}

#[async_trait]
impl ChainPort for ScriptedChain {
    fn address(&self) -> Address {
        TEST_ADDRESS
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.nonce_fetches += 1;
        match &state.nonce_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.next_nonce),
        }
    }

    async fn balance(&self) -> Result<U256, ChainError> {
        let state = self.state.lock().unwrap();
        match &state.balance_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.balance),
        }
    }

    async fn is_paused(&self) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().paused)
    }

    async fn required_fee(&self) -> Result<U256, ChainError> {
        let state = self.state.lock().unwrap();
        match &state.fee_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.fee),
        }
    }

    async fn estimate_gas(&self, _message: &str, _value: U256) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.estimates += 1;
        state.estimate.clone()
    }

    async fn submit_write(
        &self,
        request: &FunRequest,
        nonce: u64,
    ) -> Result<Box<dyn PendingWrite>, ChainError> {
        self.submit(nonce, Some(request))
    }
}

/// Pending write with a predetermined result.
pub struct ScriptedPending {
    tx_hash: B256,
    result: Result<WriteReceipt, ChainError>,
}

#[async_trait]
impl PendingWrite for ScriptedPending {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn await_confirmation(self: Box<Self>) -> Result<WriteReceipt, ChainError> {
        self.result
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// `{ success: true }`
    Accept,
    /// `{ success: false, message }`
    Reject,
    /// Transport error
    Fail,
}

/// [`Notifier`] that records every call.
pub struct RecordingNotifier {
    mode: NotifyMode,
    calls: Mutex<Vec<(Address, String)>>,
}

impl RecordingNotifier {
    pub fn new(mode: NotifyMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Address, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, address: Address, message: &str) -> anyhow::Result<NotifyResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((address, message.to_string()));
        match self.mode {
            NotifyMode::Accept => Ok(NotifyResponse {
                success: true,
                message: None,
            }),
            NotifyMode::Reject => Ok(NotifyResponse {
                success: false,
                message: Some("mint limit reached".to_string()),
            }),
            NotifyMode::Fail => Err(anyhow!("connection reset by peer")),
        }
    }
}

// ============================================================================
// Loop collaborators
// ============================================================================

/// [`WalletRefresh`] that only counts calls.
#[derive(Default)]
pub struct CountingRefresh {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingRefresh {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletRefresh for CountingRefresh {
    async fn refresh(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("balance read failed"));
        }
        Ok(())
    }
}

/// [`ContractAction`] returning queued results (default: success).
///
/// Can request cancellation on a session from inside a given call, which is how
/// a Ctrl-C arriving mid-iteration looks to the loop.
#[derive(Default)]
pub struct ScriptedAction {
    results: Mutex<VecDeque<anyhow::Result<bool>>>,
    calls: AtomicU32,
    cancel_on: Option<(u32, Arc<LoopSession>)>,
}

impl ScriptedAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result: `Ok(true)` succeeds, `Ok(false)` is skipped.
    pub fn then(self, result: anyhow::Result<bool>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    /// Request cancellation during the `call`-th perform (1-based).
    pub fn cancel_on(mut self, call: u32, session: Arc<LoopSession>) -> Self {
        self.cancel_on = Some((call, session));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractAction for ScriptedAction {
    async fn perform(&self) -> anyhow::Result<ActionOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((on, session)) = &self.cancel_on {
            if *on == call {
                session.request_cancel();
            }
        }

        let result = self.results.lock().unwrap().pop_front().unwrap_or(Ok(true));
        result.map(|sent| {
            if sent {
                ActionOutcome::Sent {
                    tx_hash: B256::with_last_byte(call as u8),
                    message: "gm".to_string(),
                    gas: GasLimit::Buffered {
                        estimate: 100_000,
                        limit: 120_000,
                    },
                    attempts: 1,
                    notified: true,
                }
            } else {
                ActionOutcome::Skipped(PreconditionFailure::Paused)
            }
        })
    }
}
