//! Event Notifier
//!
//! Two separate primitives behind one `fire` call:
//! - a subscriber list, invoked synchronously and in registration order
//! - a list of pending one-shot [`EventWaiter`]s, drained by the next fire
//!
//! Mutating operations hold the sequence guard from before they touch the map
//! until fan-out returns, so every observer sees events in map order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::CacheError;
use crate::events::CacheEvent;

type Callback<V> = Arc<dyn Fn(&CacheEvent<V>) -> anyhow::Result<()> + Send + Sync>;

// == Subscription ==
/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

// == Notifier ==
pub struct Notifier<V> {
    subscribers: RwLock<Vec<(Subscription, Callback<V>)>>,
    next_id: AtomicU64,
    waiters: Mutex<Vec<oneshot::Sender<CacheEvent<V>>>>,
    sequence: ReentrantMutex<()>,
}

impl<V> Notifier<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(Vec::new()),
            sequence: ReentrantMutex::new(()),
        }
    }

    /// Registers a callback for every future event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent<V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.subscribers
            .write()
            .push((subscription, Arc::new(callback)));
        subscription
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(s, _)| s != subscription);
        subscribers.len() != before
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    #[cfg(test)]
    pub(crate) fn pending_waiters(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Registers a one-shot waiter for the next event.
    pub fn waiter(&self) -> EventWaiter<V> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.lock().push(sender);
        EventWaiter { receiver }
    }

    /// Serializes mutations with their fan-out. Re-entrant on the same thread,
    /// so a subscriber may mutate the cache it observes.
    pub fn sequence(&self) -> ReentrantMutexGuard<'_, ()> {
        self.sequence.lock()
    }

    // == Fire ==
    /// Delivers `event` to every subscriber, then to every registered waiter.
    ///
    /// A subscriber that errors or panics is reported and skipped.
    pub fn fire(&self, event: CacheEvent<V>) {
        // Waiters registered from here on, subscribers included, belong to the next event
        let pending = std::mem::take(&mut *self.waiters.lock());
        let subscribers: Vec<(Subscription, Callback<V>)> = self.subscribers.read().clone();

        for (subscription, callback) in subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => CacheError::subscriber(format!("{err:#}")),
                Err(payload) => CacheError::subscriber(panic_message(payload.as_ref())),
            };
            warn!(
                subscription = subscription.id,
                kind = ?event.kind(),
                key = event.key(),
                error = %failure,
                "event subscriber failed"
            );
        }

        for sender in pending {
            // A waiter dropped before the event is not an error
            let _ = sender.send(event.clone());
        }
    }
}

impl<V> Default for Notifier<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

// == Event Waiter ==
/// A registration for exactly one future event.
///
/// The waiter observes the first event fired after it was created, however
/// long the caller takes to start waiting and however many events follow.
pub struct EventWaiter<V> {
    receiver: oneshot::Receiver<CacheEvent<V>>,
}

impl<V> EventWaiter<V> {
    /// Waits for the event. Returns None if the cache was dropped first.
    pub async fn recv(self) -> Option<CacheEvent<V>> {
        self.receiver.await.ok()
    }

    /// Blocking variant of [`recv`](Self::recv) for threads outside the runtime.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(self) -> Option<CacheEvent<V>> {
        self.receiver.blocking_recv().ok()
    }
}
