//! Shared Realtime Document Store
//!
//! The only channel between the two peers. Records are JSON objects grouped
//! into collections; every write is a partial merge and every change is
//! pushed to subscribers.
//!
//! ## Guarantees expected from an implementation
//!
//! - A single subscriber observes changes to one record in commit order.
//! - No ordering is promised across records or across writers.
//! - `upsert` never overwrites a field that already exists.
//! - `delete` of a missing record succeeds.

pub mod memory;

use std::future::Future;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::game::events::ChangeKind;

pub use memory::InMemoryStore;

/// A stored record.
pub type Document = Map<String, Value>;

/// Collection holding player records.
pub const PLAYERS_COLLECTION: &str = "players";

/// Collection holding game session records.
pub const GAMES_COLLECTION: &str = "games";

/// Store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Store could not be reached; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Partial update of a record that does not exist.
    #[error("record {collection}/{id} not found")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
    },

    /// Record content could not be interpreted.
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl StoreError {
    /// True for errors a later retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// One pushed change.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    /// Record id within its collection.
    pub id: String,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Record content after the change; `None` on removal.
    pub document: Option<Document>,
}

/// Equality filter over top-level fields (all clauses must match).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match records whose `field` equals `value`.
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Add another equality clause.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// True if `document` satisfies every clause.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

/// A live change feed. Dropping it ends delivery.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<DocumentChange>,
}

impl Subscription {
    /// Wrap a receiving channel.
    pub fn new(id: Uuid, receiver: mpsc::UnboundedReceiver<DocumentChange>) -> Self {
        Self { id, receiver }
    }

    /// Subscription identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next change. `None` once the store side is gone.
    pub async fn next(&mut self) -> Option<DocumentChange> {
        self.receiver.recv().await
    }
}

/// Asynchronous realtime document store.
///
/// Every method is a suspension point; implementations must tolerate any
/// interleaving of calls from the same process.
pub trait DocumentStore: Send + Sync + 'static {
    /// Create the record, or add only the fields it does not have yet.
    ///
    /// Returns `true` if the record was created.
    fn upsert(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replace the record entirely.
    fn set(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite the given fields of an existing record.
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Point read.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Delete the record. Returns `true` if it existed.
    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Watch one record. The current content, if any, is delivered first as `Added`.
    fn watch_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Watch records matching `filter`. Current matches are delivered first as `Added`.
    fn watch_collection(
        &self,
        collection: &str,
        filter: Filter,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;
}

/// Build a single-field document.
pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Document {
    let mut document = Document::new();
    document.insert(name.into(), value.into());
    document
}
