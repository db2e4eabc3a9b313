//! In-Process Document Store
//!
//! A [`DocumentStore`] held entirely in memory. Shared between several clients
//! in one process it behaves like the hosted store: partial merges, ordered
//! per-record change feeds and no cross-writer ordering. Used by the demo
//! binary and the test suite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Document, DocumentChange, DocumentStore, Filter, StoreError, Subscription};
use crate::game::events::ChangeKind;

enum WatchTarget {
    Document(String),
    Query(Filter),
}

struct Watcher {
    collection: String,
    target: WatchTarget,
    sender: mpsc::UnboundedSender<DocumentChange>,
}

impl Watcher {
    /// Change to deliver for a `before -> after` transition of record `id`.
    fn change_for(&self, id: &str, before: Option<&Document>, after: Option<&Document>) -> Option<DocumentChange> {
        let (was, is) = match &self.target {
            WatchTarget::Document(watched) if watched == id => (before.is_some(), after.is_some()),
            WatchTarget::Document(_) => return None,
            WatchTarget::Query(filter) => (
                before.is_some_and(|d| filter.matches(d)),
                after.is_some_and(|d| filter.matches(d)),
            ),
        };

        let kind = match (was, is) {
            (false, true) => ChangeKind::Added,
            (true, true) => ChangeKind::Modified,
            (true, false) => ChangeKind::Removed,
            (false, false) => return None,
        };

        Some(DocumentChange {
            id: id.to_owned(),
            kind,
            document: if is { after.cloned() } else { None },
        })
    }
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Document>>,
    watchers: BTreeMap<Uuid, Watcher>,
}

impl Inner {
    /// Push a record transition to every interested watcher.
    ///
    /// Runs under the write lock so each watcher sees commits in order.
    fn notify(&mut self, collection: &str, id: &str, before: Option<&Document>, after: Option<&Document>) {
        if before == after {
            return;
        }

        #[cfg(feature = "debug-tracing")]
        trace!(collection, id, ?before, ?after, "record changed");

        self.watchers.retain(|watch_id, watcher| {
            if watcher.sender.is_closed() {
                trace!(%watch_id, "pruning closed watcher");
                return false;
            }
            if watcher.collection != collection {
                return true;
            }
            match watcher.change_for(id, before, after) {
                Some(change) => watcher.sender.send(change).is_ok(),
                None => true,
            }
        });
    }
}

/// In-memory realtime document store.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing or regaining connectivity to the store.
    ///
    /// While unavailable every operation fails with [`StoreError::Unavailable`];
    /// existing subscriptions stay open.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        debug!(available, "store availability changed");
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        let inner = self.inner.read().await;
        inner.collections.get(collection).map_or(0, |c| c.len())
    }

    /// Number of open watchers (closed ones are pruned on the next write).
    pub async fn watcher_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.watchers.values().filter(|w| !w.sender.is_closed()).count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".into()))
        }
    }

    async fn register(&self, collection: &str, target: WatchTarget) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;

        if let Some(records) = inner.collections.get(collection) {
            let initial = records.iter().filter(|(record_id, document)| match &target {
                WatchTarget::Document(watched) => watched == *record_id,
                WatchTarget::Query(filter) => filter.matches(document),
            });
            for (record_id, document) in initial {
                let _ = sender.send(DocumentChange {
                    id: record_id.clone(),
                    kind: ChangeKind::Added,
                    document: Some(document.clone()),
                });
            }
        }

        inner.watchers.insert(id, Watcher {
            collection: collection.to_owned(),
            target,
            sender,
        });
        Subscription::new(id, receiver)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    async fn upsert(&self, collection: &str, id: &str, fields: Document) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let records = inner.collections.entry(collection.to_owned()).or_default();

        let before = records.get(id).cloned();
        let created = before.is_none();
        let record = records.entry(id.to_owned()).or_default();
        for (key, value) in fields {
            record.entry(key).or_insert(value);
        }
        let after = record.clone();

        inner.notify(collection, id, before.as_ref(), Some(&after));
        Ok(created)
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let records = inner.collections.entry(collection.to_owned()).or_default();

        let before = records.insert(id.to_owned(), document.clone());
        inner.notify(collection, id, before.as_ref(), Some(&document));
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let Some(record) = inner.collections.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Err(StoreError::NotFound {
                collection: collection.to_owned(),
                id: id.to_owned(),
            });
        };

        let before = record.clone();
        record.extend(fields);
        let after = record.clone();

        inner.notify(collection, id, Some(&before), Some(&after));
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let before = inner.collections.get_mut(collection).and_then(|c| c.remove(id));
        let existed = before.is_some();
        inner.notify(collection, id, before.as_ref(), None);
        Ok(existed)
    }

    async fn watch_document(&self, collection: &str, id: &str) -> Result<Subscription, StoreError> {
        self.check_available()?;
        Ok(self.register(collection, WatchTarget::Document(id.to_owned())).await)
    }

    async fn watch_collection(&self, collection: &str, filter: Filter) -> Result<Subscription, StoreError> {
        self.check_available()?;
        Ok(self.register(collection, WatchTarget::Query(filter)).await)
    }
}
