use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How a wait on [`UpdateNotifier::updated`] resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateSignal {
    /// A mutation happened since the wait was attached.
    Updated,
    /// The series is sealed; no further updates will ever arrive.
    Sealed,
    /// The caller's token fired; series state is untouched.
    Cancelled,
}

/// Single-consumer edge trigger for streaming cursors.
///
/// Each mutation completes at most one pending wait; callers reattach after
/// every wakeup. A mutation that lands between waits is not lost: the next
/// wait resolves immediately. Sealing wakes everything a final time, and any
/// wait attached afterwards resolves as [`UpdateSignal::Sealed`] without
/// suspending.
pub struct UpdateNotifier {
    notify: Notify,
    sealed: AtomicBool,
}

impl UpdateNotifier {
    pub(crate) fn new() -> Self {
        Self {
            notify: Notify::new(),
            sealed: AtomicBool::new(false),
        }
    }

    pub(crate) fn new_sealed() -> Self {
        Self {
            notify: Notify::new(),
            sealed: AtomicBool::new(true),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub(crate) fn notify(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // Leave a permit for a consumer that attaches between the flag store
        // and its first wait.
        self.notify.notify_one();
    }

    /// Waits for the next mutation or the seal.
    pub async fn updated(&self) -> UpdateSignal {
        if self.is_sealed() {
            return UpdateSignal::Sealed;
        }
        self.notify.notified().await;
        if self.is_sealed() {
            UpdateSignal::Sealed
        } else {
            UpdateSignal::Updated
        }
    }

    /// As [`updated`](Self::updated), but resolves as `Cancelled` when the
    /// token fires first.
    pub async fn updated_cancellable(&self, cancel: &CancellationToken) -> UpdateSignal {
        if self.is_sealed() {
            return UpdateSignal::Sealed;
        }
        tokio::select! {
            _ = self.notify.notified() => {
                if self.is_sealed() {
                    UpdateSignal::Sealed
                } else {
                    UpdateSignal::Updated
                }
            }
            _ = cancel.cancelled() => UpdateSignal::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn update_between_waits_is_not_lost() {
        let notifier = Arc::new(UpdateNotifier::new());
        notifier.notify();
        assert_eq!(notifier.updated().await, UpdateSignal::Updated);
    }

    #[tokio::test]
    async fn wait_wakes_on_notify() {
        let notifier = Arc::new(UpdateNotifier::new());
        let waiter = {
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move { notifier.updated().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.notify();
        assert_eq!(waiter.await.unwrap(), UpdateSignal::Updated);
    }

    #[tokio::test]
    async fn seal_resolves_current_and_future_waits() {
        let notifier = Arc::new(UpdateNotifier::new());
        let waiter = {
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move { notifier.updated().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.seal();
        assert_eq!(waiter.await.unwrap(), UpdateSignal::Sealed);
        assert_eq!(notifier.updated().await, UpdateSignal::Sealed);
    }

    #[tokio::test]
    async fn cancellation_resolves_without_update() {
        let notifier = UpdateNotifier::new();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            notifier.updated_cancellable(&token).await,
            UpdateSignal::Cancelled
        );
    }
}
