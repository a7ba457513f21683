//! Run state shared between the loop controller and whoever may stop it.
//!
//! A [`LoopSession`] is either idle or running exactly one run. While running,
//! a cancellation can be requested at any time; the loop observes it between
//! iterations and during its inter-iteration wait, never in the middle of an
//! action.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Result of [`LoopSession::request_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRequest {
    /// First request for the current run
    Requested,
    /// The current run was already asked to stop
    AlreadyRequested,
    /// No run in progress, nothing to cancel
    NotRunning,
}

#[derive(Debug, Default)]
pub struct LoopSession {
    running: AtomicBool,
    cancelled: AtomicBool,
    wake: Notify,
}

impl LoopSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Ask the current run to stop. Idempotent.
    pub fn request_cancel(&self) -> CancelRequest {
        if !self.is_running() {
            return CancelRequest::NotRunning;
        }
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return CancelRequest::AlreadyRequested;
        }
        tracing::info!("cancellation requested, stopping after the current step");
        self.wake.notify_waiters();
        CancelRequest::Requested
    }

    /// Mark the session as running. Returns `None` when a run is already active.
    ///
    /// The returned guard puts the session back to idle when dropped.
    pub(crate) fn begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RunGuard { session: self })
    }

    /// Resolves once cancellation has been requested for the current run.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent request is not lost.
            notified.as_mut().enable();
            if self.is_cancel_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Holds the running flag for one run.
pub(crate) struct RunGuard<'a> {
    session: &'a LoopSession,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.session.cancelled.store(false, Ordering::Release);
        self.session.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[test]
    fn test_cancel_when_idle() {
        let session = LoopSession::new();
        assert_eq!(session.request_cancel(), CancelRequest::NotRunning);
        assert!(!session.is_cancel_requested());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let session = LoopSession::new();
        let _guard = session.begin().unwrap();

        assert_eq!(session.request_cancel(), CancelRequest::Requested);
        assert_eq!(session.request_cancel(), CancelRequest::AlreadyRequested);
        assert!(session.is_cancel_requested());
    }

    #[test]
    fn test_single_active_run() {
        let session = LoopSession::new();
        let guard = session.begin().unwrap();
        assert!(session.begin().is_none());

        drop(guard);
        assert!(!session.is_running());
        assert!(session.begin().is_some());
    }

    #[test]
    fn test_guard_resets_cancellation() {
        let session = LoopSession::new();
        {
            let _guard = session.begin().unwrap();
            session.request_cancel();
        }
        assert!(!session.is_cancel_requested());

        let _guard = session.begin().unwrap();
        assert!(!session.is_cancel_requested());
    }

    #[test]
    fn test_begin_leaves_cancel_flag_alone() {
        // stands in for a request landing between the running store and the
        // return of begin; only the guard may clear the flag
        let session = LoopSession::new();
        session.cancelled.store(true, Ordering::Release);

        let guard = session.begin().unwrap();
        assert!(session.is_cancel_requested());
        assert_eq!(session.request_cancel(), CancelRequest::AlreadyRequested);

        drop(guard);
        assert!(!session.is_cancel_requested());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let session = Arc::new(LoopSession::new());
        let _guard = session.begin().unwrap();

        let waiter = tokio::spawn({
            let session = session.clone();
            async move { session.cancelled().await }
        });
        tokio::task::yield_now().await;
        session.request_cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_if_already_requested() {
        let session = LoopSession::new();
        let _guard = session.begin().unwrap();
        session.request_cancel();

        tokio::time::timeout(Duration::from_millis(100), session.cancelled())
            .await
            .unwrap();
    }
}
