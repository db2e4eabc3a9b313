//! Subscription Listeners
//!
//! Drives a handler from one or more store change feeds on background tasks.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::store::{DocumentChange, Subscription};

type Handler = Box<dyn FnMut(DocumentChange) + Send>;

/// Shared handler slot. Emptied on unsubscribe.
type Slot = Arc<Mutex<Option<Handler>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Handler>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration returned by every `subscribe_*` / `on_*` call.
///
/// Handler calls are serialized across all feeds of one registration. Once
/// [`ListenerHandle::unsubscribe`] returns, or the handle is dropped, any call
/// already in progress has finished and the handler is never invoked again.
/// A handler must not drop its own handle.
pub struct ListenerHandle {
    slot: Slot,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop delivering changes.
    pub fn unsubscribe(self) {}

    /// True until unsubscribed or every feed has ended.
    pub fn is_active(&self) -> bool {
        lock(&self.slot).is_some() && self.tasks.iter().any(|task| !task.is_finished())
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("feeds", &self.tasks.len())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        // Waits for an in-flight call before the handler is released.
        lock(&self.slot).take();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Spawn one task per subscription, all feeding the same `handler`.
pub(crate) fn spawn_listener<F>(subscriptions: impl IntoIterator<Item = Subscription>, handler: F) -> ListenerHandle
where
    F: FnMut(DocumentChange) + Send + 'static,
{
    let slot: Slot = Arc::new(Mutex::new(Some(Box::new(handler))));

    let tasks = subscriptions
        .into_iter()
        .map(|mut subscription| {
            let slot = slot.clone();
            tokio::spawn(async move {
                while let Some(change) = subscription.next().await {
                    let mut guard = lock(&slot);
                    let Some(handler) = guard.as_mut() else {
                        break;
                    };
                    handler(change);
                }
            })
        })
        .collect();

    ListenerHandle { slot, tasks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::store::{field, DocumentStore, Filter, InMemoryStore};

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let store = InMemoryStore::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let sub = store.watch_collection("players", Filter::all()).await.unwrap();
        let counter = seen.clone();
        let handle = spawn_listener([sub], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set("players", "a", field("n", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(handle.is_active());

        handle.unsubscribe();
        store.set("players", "b", field("n", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_waits_for_running_handler() {
        let store = InMemoryStore::new();
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicUsize::new(0));

        let sub = store.watch_collection("players", Filter::all()).await.unwrap();
        let (entered_flag, finished_count) = (entered.clone(), finished.clone());
        let handle = spawn_listener([sub], move |_| {
            entered_flag.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            finished_count.fetch_add(1, Ordering::SeqCst);
        });

        store.set("players", "a", field("n", 1)).await.unwrap();
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The handler is mid-call on another worker.
        handle.unsubscribe();
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        store.set("players", "b", field("n", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_feeds_share_one_handler() {
        let store = InMemoryStore::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let players = store.watch_collection("players", Filter::all()).await.unwrap();
        let games = store.watch_collection("games", Filter::all()).await.unwrap();
        let counter = seen.clone();
        let _handle = spawn_listener([players, games], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set("players", "a", field("n", 1)).await.unwrap();
        store.set("games", "g", field("n", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
