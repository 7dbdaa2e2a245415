//! Per-key debounce for outbound writes.
//!
//! Each key owns at most one pending job. Scheduling again replaces it: the
//! old job is dropped unrun and its waiter is told it was superseded. Once a
//! job fires it runs behind the key's gate, so two writes for the same key
//! are never in flight together and land in the order they fired. A key's
//! slot is dropped once it has nothing pending and nothing in flight.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub type Job<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// How a scheduled job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch<T> {
    Completed(T),
    /// A later job for the same key replaced this one before it fired.
    Superseded,
    Cancelled,
}

// ============================================================================
// DebounceScheduler
// ============================================================================

pub struct DebounceScheduler<K, T> {
    shared: Arc<Shared<K, T>>,
    delay: Duration,
}

struct Shared<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
    /// Shared by every key so a recreated slot never reuses a generation.
    generations: AtomicU64,
}

struct Slot<T> {
    pending: Option<Pending<T>>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            pending: None,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

struct Pending<T> {
    generation: u64,
    job: Job<T>,
    reply: oneshot::Sender<Dispatch<T>>,
    timer: JoinHandle<()>,
}

impl<T> Pending<T> {
    fn supersede(self) {
        self.timer.abort();
        let _ = self.reply.send(Dispatch::Superseded);
    }

    fn cancel(self) {
        self.timer.abort();
        let _ = self.reply.send(Dispatch::Cancelled);
    }
}

impl<K, T> DebounceScheduler<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending job for `key` with `job`, to run once `delay` has
    /// passed without another call for the same key.
    ///
    /// Must be called inside a tokio runtime.
    pub fn schedule(&self, key: K, job: Job<T>) -> oneshot::Receiver<Dispatch<T>> {
        let (reply, rx) = oneshot::channel();
        // Deadline is fixed now, not when the timer task is first polled.
        let sleep = tokio::time::sleep(self.delay);

        let mut slots = self.shared.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
        let generation = self.shared.next_generation();
        if let Some(previous) = slot.pending.take() {
            previous.supersede();
        }

        let shared = Arc::clone(&self.shared);
        let timer = tokio::spawn(async move {
            sleep.await;
            if let Some((pending, gate)) = shared.take(&key, Some(generation)) {
                // The handle in `pending` is this task's own; dropping it detaches.
                run(pending.job, pending.reply, gate).await;
                shared.prune(&key);
            }
        });

        slot.pending = Some(Pending {
            generation,
            job,
            reply,
            timer,
        });
        rx
    }

    /// Run `job` right away, superseding anything pending for `key` and
    /// waiting behind anything already in flight.
    pub async fn run_now(&self, key: K, job: Job<T>) -> T {
        let gate = {
            let mut slots = self.shared.slots.lock();
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            if let Some(previous) = slot.pending.take() {
                previous.supersede();
            }
            Arc::clone(&slot.gate)
        };
        let result = {
            let _permit = gate.lock().await;
            job.await
        };
        drop(gate);
        self.shared.prune(&key);
        result
    }

    /// Drop the pending job for `key`, if any. Jobs already in flight finish.
    pub fn cancel(&self, key: &K) -> bool {
        match self.shared.take(key, None) {
            Some((pending, gate)) => {
                pending.cancel();
                drop(gate);
                self.shared.prune(key);
                true
            }
            None => false,
        }
    }

    /// Fire the pending job for `key` immediately and wait for it. With
    /// nothing pending, waits for any in-flight job instead. Returns whether a
    /// pending job was fired.
    pub async fn flush(&self, key: &K) -> bool {
        let taken = {
            let mut slots = self.shared.slots.lock();
            match slots.get_mut(key) {
                Some(slot) => Some((slot.pending.take(), Arc::clone(&slot.gate))),
                None => None,
            }
        };
        match taken {
            Some((Some(pending), gate)) => {
                pending.timer.abort();
                run(pending.job, pending.reply, gate).await;
                self.shared.prune(key);
                true
            }
            Some((None, gate)) => {
                drop(gate.lock().await);
                drop(gate);
                self.shared.prune(key);
                false
            }
            None => false,
        }
    }

    /// Flush every key with a pending job. Returns how many were fired.
    pub async fn flush_all(&self) -> usize {
        let keys: Vec<K> = {
            let slots = self.shared.slots.lock();
            slots
                .iter()
                .filter(|(_, slot)| slot.pending.is_some())
                .map(|(key, _)| key.clone())
                .collect()
        };
        let mut fired = 0;
        for key in keys {
            if self.flush(&key).await {
                fired += 1;
            }
        }
        fired
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.shared
            .slots
            .lock()
            .get(key)
            .is_some_and(|slot| slot.pending.is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.shared
            .slots
            .lock()
            .values()
            .filter(|slot| slot.pending.is_some())
            .count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.shared.slots.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

impl<K: Eq + Hash, T> Shared<K, T> {
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop the slot for `key` if nothing is pending and no caller holds its
    /// gate. Every gate holder calls this after letting go of it, so the last
    /// one out removes the slot.
    fn prune(&self, key: &K) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key)
            && slot.pending.is_none()
            && Arc::strong_count(&slot.gate) == 1
        {
            slots.remove(key);
        }
    }

    /// Take the pending job for `key`. With `generation` set, only a job of
    /// exactly that generation is taken; a stale timer gets nothing.
    fn take(
        &self,
        key: &K,
        generation: Option<u64>,
    ) -> Option<(Pending<T>, Arc<tokio::sync::Mutex<()>>)> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(key)?;
        if let (Some(expected), Some(pending)) = (generation, slot.pending.as_ref())
            && pending.generation != expected
        {
            return None;
        }
        let pending = slot.pending.take()?;
        Some((pending, Arc::clone(&slot.gate)))
    }
}

async fn run<T>(
    job: Job<T>,
    reply: oneshot::Sender<Dispatch<T>>,
    gate: Arc<tokio::sync::Mutex<()>>,
) {
    let _permit = gate.lock().await;
    let result = job.await;
    let _ = reply.send(Dispatch::Completed(result));
}
