//! Per-key operation ordering.
//!
//! Operations for the same key must never interleave: a read racing a write
//! to the same file could observe a half-finished rename. Each key carries a
//! chain of completions; a new operation waits on the previous operation's
//! completion before running. Different keys are fully independent.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

struct Tail {
    id: u64,
    done: oneshot::Receiver<()>,
}

/// Chains operations per key in submission order.
#[derive(Default)]
pub(crate) struct KeyQueue {
    tails: Arc<Mutex<HashMap<String, Tail>>>,
    next_id: AtomicU64,
}

impl KeyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Chain `op` behind the previous operation for `key`.
    ///
    /// The chain link is established synchronously in this call, so
    /// operations submitted in order run in order no matter how the
    /// returned futures are awaited. A predecessor whose future was dropped
    /// unblocks its successor immediately.
    pub(crate) fn enqueue<F, T>(
        &self,
        key: &str,
        op: F,
    ) -> impl Future<Output = T> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let prev = self.tails.lock().insert(
            key.to_string(),
            Tail { id, done: done_rx },
        );

        let tails = Arc::clone(&self.tails);
        let key = key.to_string();
        async move {
            if let Some(prev) = prev {
                let _ = prev.done.await;
            }
            let out = op.await;
            let _ = done_tx.send(());

            // Drop our tail entry if no successor replaced it
            let mut tails = tails.lock();
            if tails.get(&key).is_some_and(|t| t.id == id) {
                tails.remove(&key);
            }
            out
        }
    }

    /// Number of keys with a pending tail. Used by tests.
    #[cfg(test)]
    pub(crate) fn pending_keys(&self) -> usize {
        self.tails.lock().len()
    }
}
