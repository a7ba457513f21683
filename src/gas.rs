//! Gas limit policy for the paid write.
//!
//! The estimate returned by the node is boosted by a fixed percentage (integer
//! math, rounding down) before it is used as the gas limit. When estimation
//! fails the policy falls back to a fixed, conservative limit instead of
//! aborting the action.

use crate::ext::ChainError;

/// Percentage added on top of the node's gas estimate.
pub const GAS_BUFFER_PERCENT: u64 = 20;

/// Gas limit used when the node cannot estimate the call.
pub const FALLBACK_GAS_LIMIT: u64 = 2_000_000;

/// Where the final gas limit came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasLimit {
    /// Node estimate with the safety buffer applied
    Buffered { estimate: u64, limit: u64 },
    /// Estimation failed, fixed fallback used
    Fallback { limit: u64, reason: String },
}

impl GasLimit {
    pub fn limit(&self) -> u64 {
        match self {
            GasLimit::Buffered { limit, .. } => *limit,
            GasLimit::Fallback { limit, .. } => *limit,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GasLimit::Fallback { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Buffer added to estimates, in percent (default: 20)
    pub buffer_percent: u64,
    /// Limit used when estimation fails (default: 2,000,000)
    pub fallback_limit: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            buffer_percent: GAS_BUFFER_PERCENT,
            fallback_limit: FALLBACK_GAS_LIMIT,
        }
    }
}

impl GasPolicy {
    pub fn with_buffer_percent(mut self, percent: u64) -> Self {
        self.buffer_percent = percent;
        self
    }

    pub fn with_fallback_limit(mut self, limit: u64) -> Self {
        self.fallback_limit = limit;
        self
    }

    /// Apply the buffer to an estimate: `estimate * (100 + buffer) / 100`.
    pub fn buffered(&self, estimate: u64) -> u64 {
        estimate.saturating_mul(self.buffer_percent.saturating_add(100)) / 100
    }

    /// Turn the outcome of a gas estimation into the limit to submit with.
    pub fn resolve(&self, estimate: Result<u64, ChainError>) -> GasLimit {
        match estimate {
            Ok(estimate) => {
                let limit = self.buffered(estimate);
                tracing::debug!(
                    estimate,
                    limit,
                    buffer_percent = self.buffer_percent,
                    "applied gas buffer"
                );
                GasLimit::Buffered { estimate, limit }
            }
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    fallback = self.fallback_limit,
                    "gas estimation failed, using fallback limit"
                );
                GasLimit::Fallback {
                    limit: self.fallback_limit,
                    reason: e.to_string(),
                }
            }
        }
    }
}
