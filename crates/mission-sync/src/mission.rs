//! Folded current-state mission record.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::date::parse_strict_date;
use crate::identity::{self, normalize_id, normalize_status};
use crate::store::Document;

pub const MISSION_DATE_FIELD: &str = "missionDateISO";
pub const DETAILS_FIELD: &str = "details";
pub const TYPE_KEY_FIELD: &str = "typeKey";
pub const TYPE_FIELD: &str = "type";
pub const TYPE_DISPLAY_FIELD: &str = "typeDisplay";
pub const VEHICLE_FIELD: &str = "vehicle";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const LAST_EVENT_AT_FIELD: &str = "lastEventAt";

/// Normalized mission document.
///
/// Construction mirrors `id`/`missionId` and `status`/`statusCurrent`, so the
/// accessors below read one canonical value while the wire form keeps both
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Document", into = "Document")]
pub struct Mission {
    document: Document,
}

impl Mission {
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        Self {
            document: normalize_status(normalize_id(document)),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field(identity::ID_FIELD)
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field(identity::STATUS_FIELD)
    }

    /// Stored `missionDateISO`, as persisted.
    pub fn mission_date_iso(&self) -> Option<&str> {
        self.str_field(MISSION_DATE_FIELD)
    }

    /// Stored `missionDateISO` when it is a valid calendar date.
    pub fn mission_date(&self) -> Option<NaiveDate> {
        self.mission_date_iso()
            .and_then(|value| parse_strict_date(value).ok())
    }

    /// Caller-owned details mapping.
    pub fn details(&self) -> Option<&Map<String, Value>> {
        self.document.get(DETAILS_FIELD).and_then(Value::as_object)
    }

    pub fn type_key(&self) -> Option<&str> {
        self.str_field(TYPE_KEY_FIELD)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.str_field(TYPE_FIELD)
    }

    pub fn type_display(&self) -> Option<&str> {
        self.str_field(TYPE_DISPLAY_FIELD)
    }

    pub fn vehicle(&self) -> Option<&str> {
        self.str_field(VEHICLE_FIELD)
    }

    pub fn created_at_unix_ms(&self) -> Option<i64> {
        timestamp_millis(self.document.get(CREATED_AT_FIELD))
    }

    pub fn updated_at_unix_ms(&self) -> Option<i64> {
        timestamp_millis(self.document.get(UPDATED_AT_FIELD))
    }

    pub fn last_event_at_unix_ms(&self) -> Option<i64> {
        timestamp_millis(self.document.get(LAST_EVENT_AT_FIELD))
    }

    /// Best-available recency: `lastEventAt`, `updatedAt`, `createdAt`, else 0.
    pub fn recency_unix_ms(&self) -> i64 {
        recency_unix_ms(&self.document)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.document
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.document.get(name).and_then(Value::as_str)
    }
}

impl From<Document> for Mission {
    fn from(document: Document) -> Self {
        Self::from_document(document)
    }
}

impl From<Mission> for Document {
    fn from(mission: Mission) -> Self {
        mission.document
    }
}

/// Best-available recency signal of a raw document.
pub fn recency_unix_ms(document: &Document) -> i64 {
    [LAST_EVENT_AT_FIELD, UPDATED_AT_FIELD, CREATED_AT_FIELD]
        .iter()
        .find_map(|field| timestamp_millis(document.get(*field)))
        .unwrap_or(0)
}

/// Reads a stored timestamp: integer milliseconds or an RFC 3339 string.
pub fn timestamp_millis(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|timestamp| timestamp.timestamp_millis()),
        _ => None,
    }
}
