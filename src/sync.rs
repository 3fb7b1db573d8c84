//! Wait group used to drain in-flight work before teardown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts outstanding operations and lets a closer wait for them to finish.
///
/// Connections register every write with it so `close` can let a reply
/// finish; the server registers every handler task so shutdown returns only
/// once they have all ended.
#[derive(Debug)]
pub struct Wait {
    count: watch::Sender<usize>,
}

impl Default for Wait {
    fn default() -> Self {
        Self::new()
    }
}

impl Wait {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Registers one outstanding operation.
    pub fn add(&self) {
        self.count.send_modify(|n| *n += 1);
    }

    /// Marks one operation as finished.
    pub fn done(&self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Registers an operation that finishes when the guard is dropped.
    pub fn guard(&self) -> WaitGuard<'_> {
        self.add();
        WaitGuard { wait: self }
    }

    /// Like [`Wait::guard`], but the guard can be moved into a spawned task.
    pub fn guard_owned(self: &Arc<Self>) -> OwnedWaitGuard {
        self.add();
        OwnedWaitGuard {
            wait: Arc::clone(self),
        }
    }

    /// Number of operations still outstanding.
    pub fn pending(&self) -> usize {
        *self.count.borrow()
    }

    /// Waits until no operations are outstanding.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in self, so this cannot fail while we borrow it
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Waits at most `timeout`; returns true if it timed out.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_err()
    }
}

/// Finishes its operation on drop, including during unwinding.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    wait: &'a Wait,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.wait.done();
    }
}

/// Owned counterpart of [`WaitGuard`].
#[derive(Debug)]
pub struct OwnedWaitGuard {
    wait: Arc<Wait>,
}

impl Drop for OwnedWaitGuard {
    fn drop(&mut self) {
        self.wait.done();
    }
}
