//! Client-side views over mission snapshots.
//!
//! Sorting and filtering live here, apart from the subscription mechanism,
//! so either side can change independently.

use std::cmp::Reverse;

use serde_json::{Map, Value};

use crate::date::canonical_prefix;
use crate::error::MissionError;
use crate::mission::{DETAILS_FIELD, MISSION_DATE_FIELD, Mission, recency_unix_ms};
use crate::patch::{Patch, is_truthy};
use crate::store::Document;

/// Date-bearing fields, in priority order, searched at top level then under
/// `details`.
pub const DATE_FIELDS: [&str; 4] = [MISSION_DATE_FIELD, "dateISO", "date", "missionDate"];

/// Sorts descending by best-available recency. Equal keys keep input order.
pub fn sort_by_recency(documents: &mut [Document]) {
    documents.sort_by_key(|document| Reverse(recency_unix_ms(document)));
}

/// First candidate with a `YYYY-MM-DD` prefix, searched top level first.
pub fn derive_date(fields: &Map<String, Value>) -> Option<String> {
    let details = fields.get(DETAILS_FIELD).and_then(Value::as_object);
    first_canonical(
        DATE_FIELDS
            .iter()
            .map(|field| fields.get(*field))
            .chain(DATE_FIELDS.iter().map(|field| details.and_then(|d| d.get(*field)))),
    )
}

/// [`derive_date`] over a patch.
pub fn derive_patch_date(patch: &Patch) -> Option<String> {
    let details = patch.get(DETAILS_FIELD).and_then(Value::as_object);
    first_canonical(
        DATE_FIELDS
            .iter()
            .map(|field| patch.get(field))
            .chain(DATE_FIELDS.iter().map(|field| details.and_then(|d| d.get(*field)))),
    )
}

/// True when the patch carries a non-empty value in any date-bearing field.
pub fn patch_has_date_field(patch: &Patch) -> bool {
    let details = patch.get(DETAILS_FIELD).and_then(Value::as_object);
    DATE_FIELDS
        .iter()
        .map(|field| patch.get(field))
        .chain(DATE_FIELDS.iter().map(|field| details.and_then(|d| d.get(*field))))
        .flatten()
        .any(is_truthy)
}

/// Date used for calendar filtering: [`derive_date`], else the first ten
/// characters of the stored `missionDateISO`.
pub fn filter_date(document: &Document) -> Option<String> {
    derive_date(document).or_else(|| {
        document
            .get(MISSION_DATE_FIELD)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(|value| value.chars().take(10).collect())
    })
}

/// Transformation applied to every delivered snapshot.
pub trait MissionView: Send + Sync {
    fn apply(&self, missions: Vec<Mission>) -> Vec<Mission>;
}

/// Passes every mission through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMissions;

impl MissionView for AllMissions {
    fn apply(&self, missions: Vec<Mission>) -> Vec<Mission> {
        missions
    }
}

/// Keeps missions whose calendar year equals a four-digit year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFilter {
    year: String,
}

impl YearFilter {
    pub fn new(year: &str) -> Result<Self, MissionError> {
        if year.len() != 4 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(MissionError::InvalidYear(year.to_string()));
        }
        Ok(Self {
            year: year.to_string(),
        })
    }

    pub fn year(&self) -> &str {
        self.year.as_str()
    }

    pub fn matches(&self, mission: &Mission) -> bool {
        filter_date(mission.document())
            .and_then(|date| date.get(..4).map(str::to_string))
            .is_some_and(|year| year == self.year)
    }
}

impl MissionView for YearFilter {
    fn apply(&self, missions: Vec<Mission>) -> Vec<Mission> {
        missions
            .into_iter()
            .filter(|mission| self.matches(mission))
            .collect()
    }
}

fn first_canonical<'a>(candidates: impl Iterator<Item = Option<&'a Value>>) -> Option<String> {
    candidates
        .flatten()
        .filter_map(Value::as_str)
        .find_map(canonical_prefix)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{
        MissionView, YearFilter, derive_date, derive_patch_date, filter_date,
        patch_has_date_field, sort_by_recency,
    };
    use crate::error::MissionError;
    use crate::mission::Mission;
    use crate::patch::Patch;
    use crate::store::Document;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[test]
    fn sorts_descending_by_best_available_signal() {
        let mut documents = vec![
            document(json!({"id": "t1", "lastEventAt": 100})),
            document(json!({"id": "t2", "updatedAt": 50})),
            document(json!({"id": "t3", "lastEventAt": 300})),
            document(json!({"id": "none"})),
        ];
        sort_by_recency(&mut documents);
        let ids = documents
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["t3", "t1", "t2", "none"]);
    }

    #[test]
    fn equal_recency_keeps_delivery_order() {
        let mut documents = vec![
            document(json!({"id": "a", "updatedAt": 5})),
            document(json!({"id": "b", "createdAt": 5})),
            document(json!({"id": "c", "lastEventAt": 5})),
        ];
        sort_by_recency(&mut documents);
        let ids = documents
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn derive_date_follows_priority_and_shape() {
        let fields = document(json!({
            "missionDateISO": "soon",
            "dateISO": "2025-02-02T08:00:00Z",
            "date": "2025-03-03",
            "details": {"missionDateISO": "2025-04-04"}
        }));
        assert_eq!(derive_date(&fields).as_deref(), Some("2025-02-02"));

        let nested = document(json!({"details": {"missionDate": "2024-12-31"}}));
        assert_eq!(derive_date(&nested).as_deref(), Some("2024-12-31"));

        let none = document(json!({"date": "March 3"}));
        assert_eq!(derive_date(&none), None);
    }

    #[test]
    fn patch_date_detection_ignores_empty_values() {
        let empty = Patch::new().with("date", "").with("status", "Done");
        assert!(!patch_has_date_field(&empty));
        assert_eq!(derive_patch_date(&empty), None);

        let nested = Patch::new().with("details", json!({"dateISO": "2025-06-01"}));
        assert!(patch_has_date_field(&nested));
        assert_eq!(derive_patch_date(&nested).as_deref(), Some("2025-06-01"));
    }

    #[test]
    fn filter_date_falls_back_to_stored_value() {
        let legacy = document(json!({"missionDateISO": "2025/03/01 morning"}));
        assert_eq!(filter_date(&legacy).as_deref(), Some("2025/03/01"));
        assert_eq!(filter_date(&document(json!({"missionDateISO": ""}))), None);
    }

    #[test]
    fn year_filter_validates_and_filters() {
        assert!(matches!(YearFilter::new("25"), Err(MissionError::InvalidYear(_))));
        assert!(matches!(YearFilter::new("20x5"), Err(MissionError::InvalidYear(_))));
        assert!(matches!(YearFilter::new("20255"), Err(MissionError::InvalidYear(_))));
        assert!(matches!(YearFilter::new(" 2025"), Err(MissionError::InvalidYear(_))));

        let filter = match YearFilter::new("2025") {
            Ok(value) => value,
            Err(error) => {
                assert!(false, "year should parse: {error}");
                return;
            }
        };
        let missions = vec![
            Mission::from_document(document(json!({"id": "a", "missionDateISO": "2025-01-01"}))),
            Mission::from_document(document(json!({"id": "b", "missionDateISO": "2024-12-31"}))),
            Mission::from_document(document(json!({"id": "c"}))),
        ];
        let kept = filter.apply(missions);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.first().and_then(Mission::id), Some("a"));
    }
}
