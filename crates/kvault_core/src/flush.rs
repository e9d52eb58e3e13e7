//! Debounced flush scheduling.
//!
//! Every mutation pokes the scheduler; the flush task runs only once a full
//! quiet window has elapsed since the last poke. A newer poke supersedes the
//! pending timer, but an in-flight flush always runs to completion. Flush
//! completions are counted and observable, which is what makes the debounce
//! behavior testable under tokio's paused clock.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The flush work itself, supplied at construction.
pub(crate) type FlushFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A debounced, replaceable scheduled task owned by a store.
pub(crate) struct FlushScheduler {
    debounce: Duration,
    generation: Arc<AtomicU64>,
    completed: Arc<watch::Sender<u64>>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    task: FlushFn,
}

impl FlushScheduler {
    pub(crate) fn new(debounce: Duration, task: FlushFn) -> Self {
        let (completed, _) = watch::channel(0u64);
        Self {
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
            completed: Arc::new(completed),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            task,
        }
    }

    /// Restart the debounce window.
    ///
    /// The flush runs only if no further poke arrives for the whole window.
    pub(crate) fn poke(&self) {
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let completed = Arc::clone(&self.completed);
        let run_lock = Arc::clone(&self.run_lock);
        let task = Arc::clone(&self.task);
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if generation.load(Ordering::SeqCst) != gen {
                // Superseded by a newer mutation
                return;
            }
            let _running = run_lock.lock().await;
            task().await;
            completed.send_modify(|n| *n += 1);
        });
    }

    /// Run the flush immediately, cancelling any pending debounce timer.
    pub(crate) async fn flush_now(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _running = self.run_lock.lock().await;
        (self.task)().await;
        self.completed.send_modify(|n| *n += 1);
    }

    /// Number of flushes that have run to completion.
    pub(crate) fn completed(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Wait until at least `n` flushes have completed.
    pub(crate) async fn wait_for(&self, n: u64) {
        let mut rx = self.completed.subscribe();
        while *rx.borrow_and_update() < n {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
