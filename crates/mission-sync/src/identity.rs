//! Canonical identifiers and mirrored legacy field names.
//!
//! Missions historically carry their id under both `id` and `missionId`, and
//! their status under both `status` and `statusCurrent`. Both names stay on
//! the wire; these helpers pick the canonical value and mirror it.

use serde_json::Value;

use crate::patch::Patch;
use crate::store::Document;

pub const ID_FIELD: &str = "id";
pub const MISSION_ID_FIELD: &str = "missionId";
pub const STATUS_FIELD: &str = "status";
pub const STATUS_CURRENT_FIELD: &str = "statusCurrent";

const ID_FIELDS: [&str; 2] = [ID_FIELD, MISSION_ID_FIELD];
const STATUS_FIELDS: [&str; 2] = [STATUS_FIELD, STATUS_CURRENT_FIELD];

/// First non-empty identifier under `id` then `missionId`, as a storage key.
/// Surrounding whitespace is trimmed and numbers are rendered as text.
pub fn canonical_id(document: &Document) -> Option<String> {
    first_present(ID_FIELDS.iter().map(|field| document.get(*field))).and_then(|value| match value {
        Value::String(text) => trimmed_id(text),
        other => Some(other.to_string()),
    })
}

/// Copies the first non-empty id value, as stored, into both id fields.
/// Records without an id are returned unchanged.
#[must_use]
pub fn normalize_id(document: Document) -> Document {
    mirror(document, &ID_FIELDS)
}

/// Copies the first non-empty status value into both status fields.
#[must_use]
pub fn normalize_status(document: Document) -> Document {
    mirror(document, &STATUS_FIELDS)
}

/// Patch counterpart of [`normalize_id`].
pub fn normalize_patch_id(patch: &mut Patch) {
    if let Some(id) = first_present(ID_FIELDS.iter().map(|field| patch.get(field))).cloned() {
        for field in ID_FIELDS {
            patch.insert(field, id.clone());
        }
    }
}

/// Trims and validates a caller-supplied mission id.
pub fn trimmed_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn mirror(mut document: Document, fields: &[&str; 2]) -> Document {
    if let Some(value) = first_present(fields.iter().map(|field| document.get(*field))).cloned() {
        for field in fields {
            document.insert((*field).to_string(), value.clone());
        }
    }
    document
}

/// Blank strings count as absent; anything other than a string or a number
/// is ignored.
fn first_present<'a>(candidates: impl Iterator<Item = Option<&'a Value>>) -> Option<&'a Value> {
    candidates.flatten().find(|value| match value {
        Value::String(text) => !text.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    })
}
