//! Two debounce shapes used across the pipeline: per-key action debounce
//! (cancel-and-replace) for raw watcher events, and bulk batch debounce
//! (accumulate-then-flush-once) for content-change batching.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-key action debounce: the last `debounce(key, action)` call within the
/// window wins; any earlier pending action for that key is cancelled before
/// it fires. Cancellation never surfaces an error to the caller.
///
/// Holds a [`tokio::runtime::Handle`] captured at construction time rather
/// than spawning via the ambient `tokio::spawn`, so `debounce` can be called
/// from threads notify-debouncer-full owns (not themselves running inside
/// the async executor) as well as from async callers.
pub struct Debouncer<K> {
    window: Duration,
    pending: DashMap<K, JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Must be called from within a tokio runtime context.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: DashMap::new(),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Schedule `action` to run after `window` elapses. If a task is already
    /// pending for `key`, it is aborted first.
    pub fn debounce<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some((_, handle)) = self.pending.remove(&key) {
            handle.abort();
        }

        let window = self.window;
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            action.await;
        });
        self.pending.insert(key, handle);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Bulk batch debounce: `submit(key, value)` accumulates values, one per
/// key (later submissions overwrite earlier ones); after `window` elapses
/// with no further submissions, `flush` is invoked once with everything
/// accumulated so far.
pub struct BatchDebouncer<K, V> {
    window: Duration,
    buffer: Arc<Mutex<HashMap<K, V>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    runtime: tokio::runtime::Handle,
}

impl<K, V> BatchDebouncer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Must be called from within a tokio runtime context.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: Arc::new(Mutex::new(HashMap::new())),
            timer: Mutex::new(None),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Accumulate `value` under `key`, (re)starting the flush timer.
    pub async fn submit<F, Fut>(&self, key: K, value: V, flush: F)
    where
        F: FnOnce(Vec<(K, V)>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut buffer = self.buffer.lock().await;
            buffer.insert(key, value);
        }

        let mut timer_guard = self.timer.lock().await;
        if let Some(handle) = timer_guard.take() {
            handle.abort();
        }

        let window = self.window;
        let buffer = Arc::clone(&self.buffer);
        let handle: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            tokio::time::sleep(window).await;
            let drained: Vec<(K, V)> = {
                let mut buffer = buffer.lock().await;
                buffer.drain().collect()
            };
            if !drained.is_empty() {
                flush(drained).await;
            }
        });
        *timer_guard = Some(self.runtime.spawn(handle));
    }

    pub async fn pending_len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}
