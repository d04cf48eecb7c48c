//! Immutable audit events appended under a mission.

use std::fmt;

use serde_json::Value;

use crate::patch::Patch;

pub const EVENT_TYPE_FIELD: &str = "eventType";
pub const EVENT_BY_FIELD: &str = "by";
pub const EVENT_NOTE_FIELD: &str = "note";
pub const EVENT_AT_ISO_FIELD: &str = "eventAtISO";
/// Server-assigned write time.
pub const EVENT_AT_FIELD: &str = "eventAt";

/// Kind of state-changing action an event records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Create,
    Update,
    Status,
    Cancel,
    Stamp,
    Custom(String),
}

impl EventType {
    /// Parses a caller-supplied event type; blank input means `UPDATE`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "UPDATE" => Self::Update,
            "CREATE" => Self::Create,
            "STATUS" => Self::Status,
            "CANCEL" => Self::Cancel,
            "STAMP" => Self::Stamp,
            other => Self::Custom(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Status => "STATUS",
            Self::Cancel => "CANCEL",
            Self::Stamp => "STAMP",
            Self::Custom(value) => value.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record as built by a caller, before the store stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionEvent {
    pub event_type: EventType,
    /// Actor identifier, may be empty.
    pub by: String,
    pub note: String,
    /// Caller-side timestamp.
    pub event_at_iso: Option<String>,
    /// Additional caller-defined fields; unset entries are dropped on write.
    pub extra: Patch,
}

impl MissionEvent {
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            by: String::new(),
            note: String::new(),
            event_at_iso: None,
            extra: Patch::new(),
        }
    }

    #[must_use]
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.by = actor.into();
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    #[must_use]
    pub fn at_iso(mut self, event_at_iso: impl Into<String>) -> Self {
        self.event_at_iso = Some(event_at_iso.into());
        self
    }

    /// Flattens the event into a patch; typed fields win over `extra`.
    #[must_use]
    pub fn to_patch(&self) -> Patch {
        let mut patch = self.extra.clone();
        patch.insert(EVENT_TYPE_FIELD, self.event_type.as_str());
        patch.insert(EVENT_BY_FIELD, self.by.as_str());
        patch.insert(EVENT_NOTE_FIELD, self.note.as_str());
        patch.insert_optional(EVENT_AT_ISO_FIELD, self.event_at_iso.clone().map(Value::String));
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::{EventType, MissionEvent};
    use crate::patch::sanitize;

    #[test]
    fn parse_defaults_blank_to_update() {
        assert_eq!(EventType::parse(""), EventType::Update);
        assert_eq!(EventType::parse("  "), EventType::Update);
        assert_eq!(EventType::parse("CANCEL"), EventType::Cancel);
        assert_eq!(
            EventType::parse("HANDOVER"),
            EventType::Custom("HANDOVER".to_string())
        );
        assert_eq!(EventType::Custom("HANDOVER".to_string()).to_string(), "HANDOVER");
    }

    #[test]
    fn to_patch_drops_missing_client_timestamp() {
        let event = MissionEvent::new(EventType::Stamp).by("bob");
        let fields = sanitize(&event.to_patch());
        assert_eq!(fields.len(), 3);
        assert!(!fields.contains_key("eventAtISO"));
        assert_eq!(fields.get("eventType").and_then(|v| v.as_str()), Some("STAMP"));
    }

    #[test]
    fn typed_fields_override_extra_fields() {
        let mut event = MissionEvent::new(EventType::Create).note("first");
        event.extra.insert("note", "shadowed");
        event.extra.insert("source", "form");
        let fields = sanitize(&event.to_patch());
        assert_eq!(fields.get("note").and_then(|v| v.as_str()), Some("first"));
        assert_eq!(fields.get("source").and_then(|v| v.as_str()), Some("form"));
    }
}
