//! Event+State writer: appends audit events and merge-upserts current state.
//!
//! The event append and the state merge are two independent store requests.
//! A failure between them leaves the event recorded without its state change;
//! callers tolerate that window rather than treating the pair as atomic.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::MissionSyncConfig;
use crate::date::{DateInput, canonicalize_date};
use crate::error::{MissionError, Result, StoreError};
use crate::event::{EVENT_AT_FIELD, MissionEvent};
use crate::identity::{ID_FIELD, MISSION_ID_FIELD, canonical_id, normalize_status, trimmed_id};
use crate::mission::{CREATED_AT_FIELD, LAST_EVENT_AT_FIELD, MISSION_DATE_FIELD, UPDATED_AT_FIELD};
use crate::patch::{Patch, sanitize};
use crate::store::{Document, DocumentStore, FieldWrite, WriteSet, set_all};

/// Alternate date field read when a patch has no `missionDateISO`.
const PATCH_DATE_FIELD: &str = "date";

/// Result of a fan-out delete. Failures are not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteAllOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

impl DeleteAllOutcome {
    /// True when every listed record was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes mission events and current state through a [`DocumentStore`].
#[derive(Clone)]
pub struct MissionWriter {
    store: Arc<dyn DocumentStore>,
    config: MissionSyncConfig,
    clock: Arc<dyn Clock>,
}

impl MissionWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: MissionSyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Appends `event` to the mission's log, then merges `patch` into its
    /// current state. Returns the new event's id.
    pub async fn record_event_and_patch(
        &self,
        mission_id: &str,
        event: &MissionEvent,
        patch: &Patch,
    ) -> Result<String> {
        let mission_id = trimmed_id(mission_id).ok_or(MissionError::InvalidIdentifier)?;

        let mut event_fields = sanitize(&event.to_patch());
        event_fields.insert(
            MISSION_ID_FIELD.to_string(),
            Value::String(mission_id.clone()),
        );
        let mut event_writes = set_all(event_fields);
        event_writes.insert(EVENT_AT_FIELD.to_string(), FieldWrite::ServerTimestamp);

        let event_id = self
            .store
            .add_child_document(
                self.config.collection.as_str(),
                mission_id.as_str(),
                self.config.events_collection.as_str(),
                event_writes,
            )
            .await?;
        debug!(
            mission_id = %mission_id,
            event_id = %event_id,
            event_type = %event.event_type,
            "mission event appended"
        );

        self.merge_state(mission_id.as_str(), patch).await?;
        Ok(event_id)
    }

    /// Merges `patch` into current state without recording an event.
    pub async fn patch_mission(&self, mission_id: &str, patch: &Patch) -> Result<()> {
        let mission_id = trimmed_id(mission_id).ok_or(MissionError::InvalidIdentifier)?;
        self.merge_state(mission_id.as_str(), patch).await
    }

    /// Merges a complete record. The id comes from `mission_id` when given,
    /// otherwise from the record's own `id`/`missionId`.
    pub async fn save_mission_record(
        &self,
        mission_id: Option<&str>,
        record: Document,
    ) -> Result<String> {
        let mission_id = match mission_id {
            Some(raw) => trimmed_id(raw),
            None => canonical_id(&record),
        }
        .ok_or(MissionError::InvalidIdentifier)?;
        self.merge_state(mission_id.as_str(), &Patch::from(record))
            .await?;
        Ok(mission_id)
    }

    /// Removes the current-state record. Its event log is left in place.
    pub async fn delete_mission(&self, mission_id: &str) -> Result<()> {
        let mission_id = trimmed_id(mission_id).ok_or(MissionError::InvalidIdentifier)?;
        self.store
            .delete_document(self.config.collection.as_str(), mission_id.as_str())
            .await?;
        debug!(mission_id = %mission_id, "mission deleted");
        Ok(())
    }

    /// Deletes every listed record concurrently.
    ///
    /// Only the listing can fail the call; per-record failures are collected
    /// in the outcome.
    pub async fn delete_all_missions(&self) -> Result<DeleteAllOutcome> {
        let collection = self.config.collection.as_str();
        let records = self.store.list_documents(collection, None).await?;

        let deletions = records.into_iter().map(|record| async move {
            let result = self.store.delete_document(collection, record.id.as_str()).await;
            (record.id, result)
        });

        let mut outcome = DeleteAllOutcome::default();
        for (id, result) in join_all(deletions).await {
            match result {
                Ok(()) => outcome.deleted.push(id),
                Err(error) => {
                    warn!(mission_id = %id, %error, "mission delete failed");
                    outcome.failed.push((id, error));
                }
            }
        }
        debug!(
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            "delete all missions finished"
        );
        Ok(outcome)
    }

    async fn merge_state(&self, mission_id: &str, patch: &Patch) -> Result<()> {
        let writes = self.state_writes(mission_id, patch);
        self.store
            .merge_document(self.config.collection.as_str(), mission_id, writes)
            .await?;
        debug!(mission_id = %mission_id, fields = patch.len(), "mission state merged");
        Ok(())
    }

    fn state_writes(&self, mission_id: &str, patch: &Patch) -> WriteSet {
        let today = self.clock.today();
        let mut writes = set_all(normalize_status(sanitize(patch)));

        for field in [ID_FIELD, MISSION_ID_FIELD] {
            writes.insert(
                field.to_string(),
                FieldWrite::Set(Value::String(mission_id.to_string())),
            );
        }

        let date_write = match patch
            .get_truthy(MISSION_DATE_FIELD)
            .or_else(|| patch.get_truthy(PATCH_DATE_FIELD))
        {
            Some(source) => FieldWrite::Set(Value::String(canonicalize_date(source, today))),
            None => FieldWrite::SetIfAbsent(Value::String(canonicalize_date(
                DateInput::Absent,
                today,
            ))),
        };
        writes.insert(MISSION_DATE_FIELD.to_string(), date_write);

        writes.insert(UPDATED_AT_FIELD.to_string(), FieldWrite::ServerTimestamp);
        writes.insert(LAST_EVENT_AT_FIELD.to_string(), FieldWrite::ServerTimestamp);
        writes.insert(
            CREATED_AT_FIELD.to_string(),
            FieldWrite::ServerTimestampIfAbsent,
        );
        writes
    }
}
