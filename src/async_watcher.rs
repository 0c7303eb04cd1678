//! An async counterpart to [`crate::watcher::WatcherTable`]: a single
//! version counter plus a `tokio::sync::Notify`, so callers can await a
//! change instead of blocking a thread on a condition variable.
//!
//! Built on tokio primitives instead of a mutex and condition variable:
//! the version counter is an `AtomicU64`, and the condition variable is
//! a `Notify`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

#[derive(Default)]
pub struct AsyncWatcher {
    version: AtomicU64,
    notify: Notify,
}

impl AsyncWatcher {
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Bumps the version and wakes every waiter. Waiters that call
    /// `watch_for_change` concurrently with this may miss the
    /// notification itself but will still observe the new version on
    /// their next read, since `Notify::notified()` is armed before the
    /// version check in `watch_for_change`.
    pub fn notify(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Current version. Pair with `watch_for_change` to detect the next
    /// change after this read.
    pub fn watch(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Resolves once the version differs from `old`, returning the new
    /// version. Arms the notification before checking the version so a
    /// `notify()` racing with this call is never lost.
    pub async fn watch_for_change(&self, old: u64) -> u64 {
        loop {
            let notified = self.notify.notified();
            let current = self.watch();
            if current != old {
                return current;
            }
            notified.await;
        }
    }

    /// Polls `pred` after every version change until it returns true.
    pub async fn wait<Pred>(&self, mut pred: Pred)
    where
        Pred: FnMut() -> bool,
    {
        let mut atom = self.watch();
        while !pred() {
            atom = self.watch_for_change(atom).await;
        }
    }

    /// Like `wait`, but gives up after `timeout_dur` and returns whether
    /// `pred` was satisfied.
    pub async fn wait_timeout<Pred>(&self, timeout_dur: Duration, mut pred: Pred) -> bool
    where
        Pred: FnMut() -> bool,
    {
        if pred() {
            return true;
        }
        let mut atom = self.watch();
        let deadline = tokio::time::Instant::now() + timeout_dur;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return pred();
            }
            match timeout(remaining, self.watch_for_change(atom)).await {
                Ok(next) => {
                    atom = next;
                    if pred() {
                        return true;
                    }
                }
                Err(_) => return pred(),
            }
        }
    }

    /// Returns a future equivalent to `watch_for_change(self.watch())`,
    /// for callers that want to arm a watch point without immediately
    /// awaiting it.
    pub fn arm(&self) -> (u64, impl Future<Output = u64> + '_) {
        let atom = self.watch();
        (atom, self.watch_for_change(atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn watch_for_change_resolves_after_notify() {
        let watcher = Arc::new(AsyncWatcher::new());
        let atom = watcher.watch();

        let waiter = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_for_change(atom).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        watcher.notify();

        let new_version = waiter.await.unwrap();
        assert_eq!(new_version, atom + 1);
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_predicate_already_true() {
        let watcher = AsyncWatcher::new();
        watcher.wait(|| true).await;
    }

    #[tokio::test]
    async fn wait_timeout_gives_up_when_predicate_never_becomes_true() {
        let watcher = AsyncWatcher::new();
        let satisfied = watcher
            .wait_timeout(Duration::from_millis(20), || false)
            .await;
        assert!(!satisfied);
    }

    #[tokio::test]
    async fn wait_timeout_succeeds_once_notified_state_satisfies_predicate() {
        let watcher = Arc::new(AsyncWatcher::new());
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let setter = {
            let watcher = watcher.clone();
            let flag = flag.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                flag.store(true, Ordering::SeqCst);
                watcher.notify();
            })
        };

        let satisfied = watcher
            .wait_timeout(Duration::from_millis(500), || flag.load(Ordering::SeqCst))
            .await;
        setter.await.unwrap();
        assert!(satisfied);
    }
}
