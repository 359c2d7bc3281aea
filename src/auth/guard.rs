//! Single-flight guard for the interactive login flow.

extern crate alloc;

use alloc::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

/// Ensures at most one login server runs per process.
///
/// The decision lock serializes "is a login needed?" checks, which may await
/// a validation call. The active flag records a running login server and is
/// cleared when its [`FlowLease`] drops.
#[derive(Debug, Default)]
pub(crate) struct AuthFlowGuard {
    /// Held while deciding whether to start a flow.
    decision: AsyncMutex<()>,
    /// Whether a login server is running.
    active: parking_lot::Mutex<bool>,
}

/// Proof that the holder started the one login flow. Releases on drop.
#[derive(Debug)]
pub(crate) struct FlowLease {
    /// Guard to release.
    guard: Arc<AuthFlowGuard>,
}

impl AuthFlowGuard {
    /// Creates an idle guard.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits for exclusive use of the decision phase.
    pub(crate) async fn decide(&self) -> AsyncMutexGuard<'_, ()> {
        self.decision.lock().await
    }

    /// Whether a login server is currently running.
    pub(crate) fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Marks a flow active, or returns `None` if one already is.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<FlowLease> {
        let mut active = self.active.lock();
        if *active {
            return None;
        }
        *active = true;
        drop(active);
        tracing::debug!("login flow guard acquired");
        Some(FlowLease {
            guard: Arc::clone(self),
        })
    }
}

impl Drop for FlowLease {
    fn drop(&mut self) {
        *self.guard.active.lock() = false;
        tracing::debug!("login flow guard released");
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use super::AuthFlowGuard;

    #[test]
    fn second_acquire_fails_until_release() {
        let guard = AuthFlowGuard::new();
        let lease = guard.try_acquire().expect("first acquire succeeds");
        assert!(guard.is_active());
        assert!(guard.try_acquire().is_none());
        drop(lease);
        assert!(!guard.is_active());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    #[allow(clippy::panic, reason = "simulates a crashing login server")]
    async fn lease_is_released_when_its_task_panics() {
        let guard = AuthFlowGuard::new();
        let lease = guard.try_acquire().expect("first acquire succeeds");
        let task: tokio::task::JoinHandle<()> = tokio::spawn(async move {
            let _held = lease;
            panic!("login server crashed");
        });
        assert!(task.await.is_err());
        assert!(!guard.is_active());
    }
}
