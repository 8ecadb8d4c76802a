//! Per-key debouncing: each trigger restarts the key's timer; a key fires once its timer
//! elapses without another trigger.

use crate::error::ModelError;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;

struct Pending<K> {
    next: u64,
    timers: HashMap<K, (u64, AbortHandle)>,
}

/// Key -> cancellable timer. Fired keys arrive on the receiver returned by [`Debouncer::new`].
pub struct Debouncer<K> {
    delay: Duration,
    pending: Arc<Mutex<Pending<K>>>,
    fired: UnboundedSender<K>,
}

impl<K> Debouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(delay: Duration) -> (Self, UnboundedReceiver<K>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer {
            delay,
            pending: Arc::new(Mutex::new(Pending {
                next: 0,
                timers: HashMap::new(),
            })),
            fired,
        };
        (debouncer, rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start or restart the timer for `key`. Must be called inside a tokio runtime.
    pub fn trigger(&self, key: K) -> Result<(), ModelError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| ModelError::State("debouncer lock".into()))?;
        let generation = pending.next;
        pending.next += 1;

        let timers = Arc::clone(&self.pending);
        let fired = self.fired.clone();
        let delay = self.delay;
        let task_key = key.clone();
        // The lock is held until the new timer is registered, so the task can never observe
        // the map without its own entry.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Ok(mut pending) = timers.lock() else {
                return;
            };
            let current = matches!(pending.timers.get(&task_key), Some((g, _)) if *g == generation);
            if current {
                pending.timers.remove(&task_key);
                let _ = fired.send(task_key);
            }
        });

        let previous = pending.timers.insert(key, (generation, handle.abort_handle()));
        if let Some((_, previous)) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Number of keys waiting for their timer.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.timers.len()).unwrap_or(0)
    }
}
