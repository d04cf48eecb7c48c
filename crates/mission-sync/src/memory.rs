//! In-memory document store used by tests, replays, and embedders.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::store::{
    Document, DocumentStore, SnapshotMessage, SnapshotReceiver, StoredDocument, WriteSet,
    apply_writes,
};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    List,
    Merge,
    AddChild,
    Delete,
    Listen,
}

type ChildKey = (String, String, String);

struct Listener {
    collection: String,
    limit: usize,
    sender: mpsc::UnboundedSender<SnapshotMessage>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Document>>,
    children: HashMap<ChildKey, Vec<StoredDocument>>,
    listeners: Vec<Listener>,
    injected_failures: HashMap<StoreOperation, VecDeque<StoreError>>,
}

impl MemoryState {
    fn take_failure(&mut self, operation: StoreOperation) -> Result<(), StoreError> {
        match self
            .injected_failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn snapshot(&self, collection: &str, limit: Option<usize>) -> Vec<StoredDocument> {
        let Some(documents) = self.collections.get(collection) else {
            return Vec::new();
        };
        documents
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, data)| StoredDocument {
                id: id.clone(),
                data: data.clone(),
            })
            .collect()
    }

    fn notify(&mut self, collection: &str) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.retain(|listener| {
            if listener.sender.is_closed() {
                return false;
            }
            if listener.collection != collection {
                return true;
            }
            let snapshot = self.snapshot(collection, Some(listener.limit));
            listener.sender.send(Ok(snapshot)).is_ok()
        });
        self.listeners = listeners;
    }
}

/// Document store held entirely in process memory.
///
/// Server timestamps come from the injected clock; child document ids are
/// UUID v7 strings.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError) -> Result<(), StoreError> {
        self.lock()?
            .injected_failures
            .entry(operation)
            .or_default()
            .push_back(error);
        Ok(())
    }

    /// Pushes `error` to every open change feed on `collection`.
    pub fn fail_listeners(&self, collection: &str, error: StoreError) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.listeners.retain(|listener| {
            if listener.collection != collection {
                return !listener.sender.is_closed();
            }
            listener.sender.send(Err(error.clone())).is_ok()
        });
        Ok(())
    }

    /// Drops every change feed on `collection` without an error.
    pub fn close_listeners(&self, collection: &str) -> Result<(), StoreError> {
        self.lock()?
            .listeners
            .retain(|listener| listener.collection != collection);
        Ok(())
    }

    /// Number of open change feeds on `collection`.
    pub fn listener_count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .listeners
            .iter()
            .filter(|listener| listener.collection == collection && !listener.sender.is_closed())
            .count())
    }

    /// Child documents under `parent_id`, in insertion order.
    pub fn child_documents(
        &self,
        collection: &str,
        parent_id: &str,
        child_collection: &str,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let key = (
            collection.to_string(),
            parent_id.to_string(),
            child_collection.to_string(),
        );
        Ok(self.lock()?.children.get(&key).cloned().unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Internal("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        require_non_empty(collection, "collection")?;
        require_non_empty(id, "id")?;
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::Get)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn list_documents(
        &self,
        collection: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        require_non_empty(collection, "collection")?;
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::List)?;
        Ok(state.snapshot(collection, limit))
    }

    async fn merge_document(
        &self,
        collection: &str,
        id: &str,
        writes: WriteSet,
    ) -> Result<(), StoreError> {
        require_non_empty(collection, "collection")?;
        require_non_empty(id, "id")?;
        let now_unix_ms = self.clock.now_unix_ms();
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::Merge)?;
        let field_count = writes.len();
        let document = state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        apply_writes(document, writes, now_unix_ms);
        debug!(collection, id, field_count, "merged document");
        state.notify(collection);
        Ok(())
    }

    async fn add_child_document(
        &self,
        collection: &str,
        parent_id: &str,
        child_collection: &str,
        writes: WriteSet,
    ) -> Result<String, StoreError> {
        require_non_empty(collection, "collection")?;
        require_non_empty(parent_id, "parent_id")?;
        require_non_empty(child_collection, "child_collection")?;
        let now_unix_ms = self.clock.now_unix_ms();
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::AddChild)?;

        let id = Uuid::now_v7().to_string();
        let mut data = Document::new();
        apply_writes(&mut data, writes, now_unix_ms);
        state
            .children
            .entry((
                collection.to_string(),
                parent_id.to_string(),
                child_collection.to_string(),
            ))
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                data,
            });
        debug!(collection, parent_id, child_collection, child_id = %id, "added child document");
        Ok(id)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        require_non_empty(collection, "collection")?;
        require_non_empty(id, "id")?;
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::Delete)?;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .is_some();
        if removed {
            debug!(collection, id, "deleted document");
            state.notify(collection);
        }
        Ok(())
    }

    fn listen(&self, collection: &str, limit: usize) -> Result<SnapshotReceiver, StoreError> {
        require_non_empty(collection, "collection")?;
        let mut state = self.lock()?;
        state.take_failure(StoreOperation::Listen)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let initial = state.snapshot(collection, Some(limit));
        if sender.send(Ok(initial)).is_ok() {
            state.listeners.push(Listener {
                collection: collection.to_string(),
                limit,
                sender,
            });
        }
        Ok(receiver)
    }
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Rejected(format!("{field} must not be empty")));
    }
    Ok(())
}
