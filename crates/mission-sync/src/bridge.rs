//! Stable entry points for pages: create, update, list, subscribe, delete.
//!
//! The bridge shapes caller input into events and patches for the writer and
//! normalizes everything the accessor returns into [`Mission`] values.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::accessor::MissionStoreAccessor;
use crate::clock::Clock;
use crate::config::MissionSyncConfig;
use crate::date::canonicalize_date;
use crate::error::{MissionError, Result};
use crate::event::{EventType, MissionEvent};
use crate::identity::{
    ID_FIELD, MISSION_ID_FIELD, STATUS_CURRENT_FIELD, STATUS_FIELD, normalize_patch_id, trimmed_id,
};
use crate::mission::{
    DETAILS_FIELD, MISSION_DATE_FIELD, Mission, TYPE_DISPLAY_FIELD, TYPE_FIELD, TYPE_KEY_FIELD,
    VEHICLE_FIELD,
};
use crate::patch::Patch;
use crate::store::{Document, DocumentStore};
use crate::subscription::{ErrorCallback, SnapshotCallback, Subscription};
use crate::view::{AllMissions, MissionView, YearFilter, derive_patch_date, patch_has_date_field};
use crate::writer::{DeleteAllOutcome, MissionWriter};

/// Client-side creation stamp kept for audit only.
const CREATED_AT_ISO_FIELD: &str = "createdAtISO";
const CREATED_BY_FIELD: &str = "createdBy";

/// Form input for a new mission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionDraft {
    /// Any date-ish value; canonicalized on create.
    pub date: Option<Value>,
    pub status: Option<String>,
    pub details: Option<Map<String, Value>>,
    pub created_by: Option<String>,
    pub type_key: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub type_display: Option<String>,
    pub vehicle: Option<String>,
}

impl MissionDraft {
    /// Actor recorded on the create event: `details.createdBy`, then
    /// `createdBy`, else empty.
    pub fn actor(&self) -> String {
        self.details
            .as_ref()
            .and_then(|details| details.get(CREATED_BY_FIELD))
            .and_then(Value::as_str)
            .filter(|actor| !actor.is_empty())
            .or_else(|| self.created_by.as_deref().filter(|actor| !actor.is_empty()))
            .unwrap_or_default()
            .to_string()
    }
}

/// Page-facing mission API over a writer and an accessor.
#[derive(Clone)]
pub struct MissionBridge {
    writer: MissionWriter,
    accessor: MissionStoreAccessor,
    config: MissionSyncConfig,
    clock: Arc<dyn Clock>,
}

impl MissionBridge {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: MissionSyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer: MissionWriter::new(Arc::clone(&store), config.clone(), Arc::clone(&clock)),
            accessor: MissionStoreAccessor::new(store, config.clone()),
            config,
            clock,
        }
    }

    pub fn writer(&self) -> &MissionWriter {
        &self.writer
    }

    pub fn accessor(&self) -> &MissionStoreAccessor {
        &self.accessor
    }

    /// Records a `CREATE` event and the full initial state. Returns the
    /// event id.
    pub async fn create_mission(&self, mission_id: &str, draft: &MissionDraft) -> Result<String> {
        let mission_id = trimmed_id(mission_id).ok_or(MissionError::MissingIdentifier)?;
        let now_iso = self.clock.now_iso();
        let status = draft
            .status
            .as_deref()
            .filter(|status| !status.is_empty())
            .unwrap_or(self.config.default_status.as_str());

        let event = MissionEvent::new(EventType::Create)
            .by(draft.actor())
            .note(self.config.create_note.as_str())
            .at_iso(now_iso.as_str());

        let patch = Patch::new()
            .with(MISSION_ID_FIELD, mission_id.as_str())
            .with(ID_FIELD, mission_id.as_str())
            .with(STATUS_CURRENT_FIELD, status)
            .with(STATUS_FIELD, status)
            .with(
                MISSION_DATE_FIELD,
                canonicalize_date(draft.date.as_ref(), self.clock.today()),
            )
            .with(CREATED_AT_ISO_FIELD, now_iso)
            .with(
                DETAILS_FIELD,
                Value::Object(draft.details.clone().unwrap_or_default()),
            )
            .with(TYPE_KEY_FIELD, or_empty(draft.type_key.as_deref()))
            .with(TYPE_FIELD, or_empty(draft.type_name.as_deref()))
            .with(TYPE_DISPLAY_FIELD, or_empty(draft.type_display.as_deref()))
            .with(VEHICLE_FIELD, or_empty(draft.vehicle.as_deref()));

        debug!(mission_id = %mission_id, status, "creating mission");
        self.writer
            .record_event_and_patch(mission_id.as_str(), &event, &patch)
            .await
    }

    /// Records an event of `event_type` (blank means `UPDATE`) and merges
    /// `patch`. A patch that carries a date under any recognized field but
    /// no `missionDateISO` gets one derived.
    pub async fn update_mission(
        &self,
        mission_id: &str,
        event_type: &str,
        by: &str,
        note: &str,
        mut patch: Patch,
    ) -> Result<String> {
        normalize_patch_id(&mut patch);
        if patch.get_truthy(MISSION_DATE_FIELD).is_none()
            && patch_has_date_field(&patch)
            && let Some(date) = derive_patch_date(&patch)
        {
            patch.insert(MISSION_DATE_FIELD, date);
        }

        let event = MissionEvent::new(EventType::parse(event_type))
            .by(by)
            .note(note)
            .at_iso(self.clock.now_iso());
        self.writer
            .record_event_and_patch(mission_id, &event, &patch)
            .await
    }

    /// One mission, normalized, or `None` when absent.
    pub async fn get_mission(&self, mission_id: &str) -> Result<Option<Mission>> {
        Ok(self
            .accessor
            .get_one(mission_id)
            .await?
            .map(Mission::from_document))
    }

    /// Every mission, normalized, in store order.
    pub async fn list_all(&self) -> Result<Vec<Mission>> {
        Ok(self
            .accessor
            .get_all()
            .await?
            .into_iter()
            .map(Mission::from_document)
            .collect())
    }

    pub fn subscribe_all(
        &self,
        on_data: SnapshotCallback<Mission>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Subscription> {
        self.subscribe_view(AllMissions, on_data, on_error)
    }

    /// Missions whose date falls in `year` (four digits), filtered client
    /// side within the subscription window.
    pub fn subscribe_by_year(
        &self,
        year: &str,
        on_data: SnapshotCallback<Mission>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Subscription> {
        let filter = YearFilter::new(year)?;
        self.subscribe_view(filter, on_data, on_error)
    }

    /// Subscribes with an arbitrary view applied to each normalized snapshot.
    pub fn subscribe_view<V>(
        &self,
        view: V,
        on_data: SnapshotCallback<Mission>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Subscription>
    where
        V: MissionView + 'static,
    {
        self.accessor.subscribe_mapped(
            move |documents: Vec<Document>| {
                view.apply(documents.into_iter().map(Mission::from_document).collect())
            },
            on_data,
            on_error,
        )
    }

    pub async fn delete_mission(&self, mission_id: &str) -> Result<()> {
        self.writer.delete_mission(mission_id).await
    }

    pub async fn delete_all_missions(&self) -> Result<DeleteAllOutcome> {
        self.writer.delete_all_missions().await
    }
}

fn or_empty(value: Option<&str>) -> &str {
    value.unwrap_or_default()
}
