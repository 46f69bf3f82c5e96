//! # Document Store
//!
//! JSON documents grouped into collections (`users`, `surveys`, `credentials`,
//! `sessions`).
//!
//! ## Backends
//! - [`RedisStore`]: one hash per document, one set per collection listing ids
//! - [`MemoryStore`]: in-process maps, used by tests and `STORE_BACKEND=memory`
//!
//! ## Writes
//! Every write goes through [`Database`], which hands the before/after
//! snapshots to the change feed. Triggers and live subscriptions read from
//! that feed.
//!
//! Field updates are applied atomically by the backend. Increments never read
//! the value back to the caller first, so two concurrent credits both land.
//! An [`FieldUpdate::AtLeast`] guard is checked inside the same step and fails
//! the whole update with [`StoreError::Precondition`], so a debit can't race
//! below a floor.
//!
//! ## Change feed
//! Each [`Database::changes`] receiver gets its own unbounded queue, so a slow
//! reader falls behind but never misses a change. Dropping the receiver
//! unregisters it on the next write.
//!
//! ## Subscriptions
//! [`Database::subscribe`] yields the current snapshot and then every later
//! snapshot of a single document. Dropping the stream unsubscribes.
use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use parking_lot::Mutex;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Number, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::RedisStore;

pub type Document = Map<String, Value>;

const ID_LENGTH: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("No document to update: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Malformed field {field} in {key}")]
    Malformed { key: String, field: String },

    #[error("Documents must serialize to JSON objects")]
    NotAnObject,

    #[error("Precondition failed on {collection}/{id}")]
    Precondition { collection: String, id: String },
}

/// A single field-level mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    Increment(String, Number),
    /// Appends unless an equal value is already present.
    ArrayUnion(String, Value),
    ArrayAppend(String, Value),
    /// Guard only. The update is refused unless the field is at least this.
    AtLeast(String, Number),
}

impl FieldUpdate {
    pub fn set(field: &str, value: Value) -> Self {
        FieldUpdate::Set(field.to_string(), value)
    }

    pub fn increment(field: &str, by: i64) -> Self {
        FieldUpdate::Increment(field.to_string(), by.into())
    }

    pub fn array_union(field: &str, value: Value) -> Self {
        FieldUpdate::ArrayUnion(field.to_string(), value)
    }

    pub fn array_append(field: &str, value: Value) -> Self {
        FieldUpdate::ArrayAppend(field.to_string(), value)
    }

    pub fn at_least(field: &str, min: i64) -> Self {
        FieldUpdate::AtLeast(field.to_string(), min.into())
    }

    pub fn field(&self) -> &str {
        match self {
            FieldUpdate::Set(field, _)
            | FieldUpdate::Increment(field, _)
            | FieldUpdate::ArrayUnion(field, _)
            | FieldUpdate::ArrayAppend(field, _)
            | FieldUpdate::AtLeast(field, _) => field,
        }
    }

    /// Whether a guard holds. Mutations always hold. A missing field reads as 0.
    pub fn holds(&self, document: &Document) -> bool {
        let FieldUpdate::AtLeast(field, min) = self else {
            return true;
        };

        let current = document
            .get(field)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        current >= min.as_f64().unwrap_or(0.0)
    }

    /// Applies the update to an in-memory document.
    pub fn apply(&self, document: &mut Document) {
        match self {
            FieldUpdate::Set(field, value) => {
                document.insert(field.clone(), value.clone());
            }
            FieldUpdate::Increment(field, by) => {
                let next = match document.get(field) {
                    Some(Value::Number(current)) => add_numbers(current, by),
                    _ => by.clone(),
                };
                document.insert(field.clone(), Value::Number(next));
            }
            FieldUpdate::ArrayUnion(field, value) | FieldUpdate::ArrayAppend(field, value) => {
                let slot = document
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }

                if let Value::Array(items) = slot {
                    let union = matches!(self, FieldUpdate::ArrayUnion(..));
                    if !union || !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldUpdate::AtLeast(..) => {}
        }
    }
}

fn add_numbers(current: &Number, by: &Number) -> Number {
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return sum.into();
        }
    }

    let sum = current.as_f64().unwrap_or(0.0) + by.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).unwrap_or_else(|| current.clone())
}

/// Snapshots on either side of a write. `None` means the document did not exist.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Change {
    pub before: Option<Document>,
    pub after: Option<Document>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl DocumentChange {
    /// An update to an existing document, as opposed to a create or delete.
    pub fn is_update(&self) -> bool {
        self.before.is_some() && self.after.is_some()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Every document in the collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;

    /// Replaces the document, or merges fields into it when `merge` is set.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        merge: bool,
    ) -> Result<Change, StoreError>;

    /// Applies all updates atomically. Fails when the document is missing or
    /// any guard does not hold, leaving the document untouched.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<Change, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<Change, StoreError>;
}

/// Shared handle to a store plus its change feed.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
    listeners: Arc<Mutex<Vec<UnboundedSender<DocumentChange>>>>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            listeners: Arc::default(),
        }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        self.store
            .get(collection, id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Decodes every document in the collection, skipping ones that don't fit `T`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let documents = self.store.list(collection).await?;

        Ok(decode_all(collection, documents))
    }

    /// Equality scan over one field.
    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let documents = self
            .store
            .list(collection)
            .await?
            .into_iter()
            .filter(|(_, document)| document.get(field) == Some(value))
            .collect();

        Ok(decode_all(collection, documents))
    }

    pub async fn set<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let document = to_document(value)?;
        let change = self.store.set(collection, id, document, false).await?;

        self.publish(collection, id, change);
        Ok(())
    }

    pub async fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        let change = self.store.set(collection, id, fields, true).await?;

        self.publish(collection, id, change);
        Ok(())
    }

    /// Inserts under a fresh random id and returns it.
    pub async fn add<T: Serialize>(&self, collection: &str, value: &T) -> Result<String, StoreError> {
        let id = new_id();
        self.set(collection, &id, value).await?;

        Ok(id)
    }

    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<(), StoreError> {
        let change = self.store.update(collection, id, updates).await?;

        self.publish(collection, id, change);
        Ok(())
    }

    /// Returns whether a document was removed.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let change = self.store.delete(collection, id).await?;
        let existed = change.before.is_some();

        if existed {
            self.publish(collection, id, change);
        }
        Ok(existed)
    }

    /// Every write from now on, in order.
    pub fn changes(&self) -> UnboundedReceiver<DocumentChange> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().push(sender);

        receiver
    }

    pub async fn subscribe<T>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<BoxStream<'static, Result<T, StoreError>>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        // Subscribe before reading so nothing between the read and the first
        // change is lost.
        let receiver = self.changes();
        let initial = self.get::<T>(collection, id).await?;

        let collection = collection.to_string();
        let id = id.to_string();

        let updates = UnboundedReceiverStream::new(receiver).filter_map(move |change| {
            let snapshot = if change.collection == collection && change.id == id {
                change.after.map(from_document::<T>)
            } else {
                None
            };

            future::ready(snapshot)
        });

        Ok(stream::iter(initial.map(Ok)).chain(updates).boxed())
    }

    fn publish(&self, collection: &str, id: &str, change: Change) {
        let change = DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            before: change.before,
            after: change.after,
        };

        self.listeners
            .lock()
            .retain(|listener| listener.send(change.clone()).is_ok());
    }
}

pub fn new_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        _ => Err(StoreError::NotAnObject),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

fn decode_all<T: DeserializeOwned>(
    collection: &str,
    documents: Vec<(String, Document)>,
) -> Vec<(String, T)> {
    documents
        .into_iter()
        .filter_map(|(id, document)| match from_document(document) {
            Ok(value) => Some((id, value)),
            Err(e) => {
                warn!("Skipping malformed document {collection}/{id}: {e}");
                None
            }
        })
        .collect()
}
