//! Document-store capability consumed by the writer and accessor.
//!
//! The store is opaque: point get, merge-upsert, insert into a child
//! collection, delete, bounded listing, and a snapshot change feed, with
//! server-assigned timestamps expressed as [`FieldWrite`] markers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Raw document body as persisted.
pub type Document = Map<String, Value>;

/// One field of a merge-upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    /// Overwrites the field; objects merge key-by-key into existing objects.
    Set(Value),
    /// Writes the value only when the field is missing.
    SetIfAbsent(Value),
    /// Stamps the store's commit time.
    ServerTimestamp,
    /// Stamps the store's commit time only when the field is missing.
    ServerTimestampIfAbsent,
}

/// Field writes keyed by field name.
pub type WriteSet = BTreeMap<String, FieldWrite>;

/// Document with its store key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

/// One delivery on a change feed: the full bounded snapshot, or a feed error.
pub type SnapshotMessage = Result<Vec<StoredDocument>, StoreError>;

/// Receiving end of a change feed. Dropping it closes the feed.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<SnapshotMessage>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str)
    -> Result<Option<Document>, StoreError>;

    /// Lists documents in store order, capped at `limit` when given.
    async fn list_documents(
        &self,
        collection: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    /// Creates the document when absent, otherwise merges `writes` into it.
    async fn merge_document(
        &self,
        collection: &str,
        id: &str,
        writes: WriteSet,
    ) -> Result<(), StoreError>;

    /// Inserts a new document with a fresh id under `parent_id`.
    async fn add_child_document(
        &self,
        collection: &str,
        parent_id: &str,
        child_collection: &str,
        writes: WriteSet,
    ) -> Result<String, StoreError>;

    /// Removes the document. Child collections are left in place.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Opens a change feed over at most `limit` documents of `collection`.
    ///
    /// The current snapshot is delivered first, then one snapshot per change.
    fn listen(&self, collection: &str, limit: usize) -> Result<SnapshotReceiver, StoreError>;
}

/// Wraps every field of `document` as a plain [`FieldWrite::Set`].
pub fn set_all(document: Document) -> WriteSet {
    document
        .into_iter()
        .map(|(key, value)| (key, FieldWrite::Set(value)))
        .collect()
}

/// Applies `writes` to `target` with merge semantics.
pub fn apply_writes(target: &mut Document, writes: WriteSet, now_unix_ms: i64) {
    for (key, write) in writes {
        match write {
            FieldWrite::Set(value) => merge_field(target, key, value),
            FieldWrite::SetIfAbsent(value) => {
                target.entry(key).or_insert(value);
            }
            FieldWrite::ServerTimestamp => {
                target.insert(key, Value::from(now_unix_ms));
            }
            FieldWrite::ServerTimestampIfAbsent => {
                target.entry(key).or_insert_with(|| Value::from(now_unix_ms));
            }
        }
    }
}

fn merge_field(target: &mut Document, key: String, value: Value) {
    let incoming = match value {
        Value::Object(incoming) => incoming,
        other => {
            target.insert(key, other);
            return;
        }
    };
    if let Some(Value::Object(existing)) = target.get_mut(key.as_str()) {
        for (nested_key, nested_value) in incoming {
            merge_field(existing, nested_key, nested_value);
        }
        return;
    }
    target.insert(key, Value::Object(incoming));
}
