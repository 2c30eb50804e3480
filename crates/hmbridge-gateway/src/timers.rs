//! Keyed cancel/reschedule timers

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// One pending timer per key; scheduling again replaces the pending one
///
/// Rescheduling or cancelling a key only stops the wait. Once a timer fires
/// its action runs on its own task, which only [`cancel_all`] aborts.
///
/// [`cancel_all`]: DebounceTimers::cancel_all
pub struct DebounceTimers<K> {
    pending: Mutex<HashMap<K, JoinHandle<()>>>,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<K> Default for DebounceTimers<K> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            running: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<K> DebounceTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless `key` is rescheduled or cancelled first
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let task = tokio::spawn(action);
            let mut running = running.lock();
            running.retain(|h| !h.is_finished());
            running.push(task);
        });
        let mut pending = self.pending.lock();
        pending.retain(|_, h| !h.is_finished());
        if let Some(previous) = pending.insert(key, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self, key: &K) {
        if let Some(handle) = self.pending.lock().remove(key) {
            handle.abort();
        }
    }

    /// Cancel every pending timer and abort actions still running
    pub fn cancel_all(&self) {
        for (_, handle) in self.pending.lock().drain() {
            handle.abort();
        }
        for handle in self.running.lock().drain(..) {
            handle.abort();
        }
    }

    /// Whether a timer for `key` is still waiting
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .get(key)
            .is_some_and(|h| !h.is_finished())
    }
}

impl<K> Drop for DebounceTimers<K> {
    fn drop(&mut self) {
        for (_, handle) in self.pending.get_mut().drain() {
            handle.abort();
        }
        for handle in self.running.lock().drain(..) {
            handle.abort();
        }
    }
}
