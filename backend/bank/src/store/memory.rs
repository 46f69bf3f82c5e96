use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Change, Document, DocumentStore, FieldUpdate, StoreError};

/// In-process store. The lock is held for the whole of each call, which is
/// what makes `update` atomic.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Document>>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.lock();

        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let collections = self.collections.lock();

        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, document)| (id.clone(), document.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        merge: bool,
    ) -> Result<Change, StoreError> {
        let mut collections = self.collections.lock();
        let documents = collections.entry(collection.to_string()).or_default();

        let before = documents.get(id).cloned();
        let after = match (&before, merge) {
            (Some(existing), true) => {
                let mut merged = existing.clone();
                merged.extend(document);
                merged
            }
            _ => document,
        };

        documents.insert(id.to_string(), after.clone());

        Ok(Change {
            before,
            after: Some(after),
        })
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
    ) -> Result<Change, StoreError> {
        let mut collections = self.collections.lock();

        let Some(document) = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
        else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };

        if !updates.iter().all(|update| update.holds(document)) {
            return Err(StoreError::Precondition {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let before = document.clone();
        for update in updates {
            update.apply(document);
        }

        Ok(Change {
            before: Some(before),
            after: Some(document.clone()),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<Change, StoreError> {
        let mut collections = self.collections.lock();

        let before = collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id));

        Ok(Change {
            before,
            after: None,
        })
    }
}
