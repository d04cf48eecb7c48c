//! Read side of the current-state collection.

use std::sync::Arc;

use tracing::debug;

use crate::config::MissionSyncConfig;
use crate::error::{MissionError, Result};
use crate::identity::trimmed_id;
use crate::store::{Document, DocumentStore};
use crate::subscription::{ErrorCallback, SnapshotCallback, Subscription};
use crate::view::sort_by_recency;

/// Point reads, one-shot listing and recency-sorted snapshot subscriptions.
#[derive(Clone)]
pub struct MissionStoreAccessor {
    store: Arc<dyn DocumentStore>,
    config: MissionSyncConfig,
}

impl MissionStoreAccessor {
    pub fn new(store: Arc<dyn DocumentStore>, config: MissionSyncConfig) -> Self {
        Self { store, config }
    }

    /// The stored record, or `None` when it does not exist.
    pub async fn get_one(&self, mission_id: &str) -> Result<Option<Document>> {
        let mission_id = trimmed_id(mission_id).ok_or(MissionError::InvalidIdentifier)?;
        let document = self
            .store
            .get_document(self.config.collection.as_str(), mission_id.as_str())
            .await?;
        Ok(document)
    }

    /// Every record in store order.
    pub async fn get_all(&self) -> Result<Vec<Document>> {
        let records = self
            .store
            .list_documents(self.config.collection.as_str(), None)
            .await?;
        Ok(records.into_iter().map(|record| record.data).collect())
    }

    /// Delivers the full bounded snapshot, newest first, on every change.
    pub fn subscribe(
        &self,
        on_data: SnapshotCallback<Document>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Subscription> {
        self.subscribe_mapped(|documents| documents, on_data, on_error)
    }

    /// Like [`Self::subscribe`], with `transform` applied to each sorted
    /// snapshot before it is handed to `on_data`.
    pub fn subscribe_mapped<T, F>(
        &self,
        transform: F,
        on_data: SnapshotCallback<T>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Subscription>
    where
        T: Send + 'static,
        F: Fn(Vec<Document>) -> Vec<T> + Send + Sync + 'static,
    {
        let collection = self.config.collection.as_str();
        let receiver = self
            .store
            .listen(collection, self.config.subscription_limit)?;
        debug!(
            collection,
            limit = self.config.subscription_limit,
            "mission subscription opened"
        );
        let subscription = Subscription::spawn(
            collection,
            receiver,
            move |snapshot| {
                let mut documents = snapshot
                    .into_iter()
                    .map(|record| record.data)
                    .collect::<Vec<_>>();
                sort_by_recency(&mut documents);
                transform(documents)
            },
            on_data,
            on_error,
        )?;
        Ok(subscription)
    }
}
