use std::env;

use thiserror::Error;

pub const ENV_COLLECTION: &str = "MISSION_SYNC_COLLECTION";
pub const ENV_EVENTS_COLLECTION: &str = "MISSION_SYNC_EVENTS_COLLECTION";
pub const ENV_SUBSCRIPTION_LIMIT: &str = "MISSION_SYNC_SUBSCRIPTION_LIMIT";
pub const ENV_DEFAULT_STATUS: &str = "MISSION_SYNC_DEFAULT_STATUS";
pub const ENV_CREATE_NOTE: &str = "MISSION_SYNC_CREATE_NOTE";

pub const DEFAULT_COLLECTION: &str = "missions";
pub const DEFAULT_EVENTS_COLLECTION: &str = "events";
pub const DEFAULT_SUBSCRIPTION_LIMIT: usize = 800;
pub const DEFAULT_STATUS: &str = "Scheduled";
pub const DEFAULT_CREATE_NOTE: &str = "Created from form";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissionSyncConfig {
    /// Current-state collection, one document per mission.
    pub collection: String,
    /// Event sub-collection name under each mission document.
    pub events_collection: String,
    /// Maximum number of records delivered per subscription snapshot.
    pub subscription_limit: usize,
    pub default_status: String,
    pub create_note: String,
}

impl Default for MissionSyncConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            events_collection: DEFAULT_EVENTS_COLLECTION.to_string(),
            subscription_limit: DEFAULT_SUBSCRIPTION_LIMIT,
            default_status: DEFAULT_STATUS.to_string(),
            create_note: DEFAULT_CREATE_NOTE.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid MISSION_SYNC_COLLECTION: {0}")]
    InvalidCollection(String),
    #[error("invalid MISSION_SYNC_EVENTS_COLLECTION: {0}")]
    InvalidEventsCollection(String),
    #[error("invalid MISSION_SYNC_SUBSCRIPTION_LIMIT: {0}")]
    InvalidSubscriptionLimit(String),
    #[error("invalid MISSION_SYNC_DEFAULT_STATUS: {0}")]
    InvalidDefaultStatus(String),
}

impl MissionSyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let collection = lookup(ENV_COLLECTION)
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string())
            .trim()
            .to_string();
        validate_collection_name(collection.as_str()).map_err(ConfigError::InvalidCollection)?;

        let events_collection = lookup(ENV_EVENTS_COLLECTION)
            .unwrap_or_else(|| DEFAULT_EVENTS_COLLECTION.to_string())
            .trim()
            .to_string();
        validate_collection_name(events_collection.as_str())
            .map_err(ConfigError::InvalidEventsCollection)?;

        let subscription_limit = lookup(ENV_SUBSCRIPTION_LIMIT)
            .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_LIMIT.to_string())
            .trim()
            .parse::<usize>()
            .map_err(|error| ConfigError::InvalidSubscriptionLimit(error.to_string()))?;
        if subscription_limit == 0 {
            return Err(ConfigError::InvalidSubscriptionLimit(
                "must be greater than zero".to_string(),
            ));
        }

        let default_status = lookup(ENV_DEFAULT_STATUS)
            .unwrap_or_else(|| DEFAULT_STATUS.to_string())
            .trim()
            .to_string();
        if default_status.is_empty() {
            return Err(ConfigError::InvalidDefaultStatus(
                "must not be empty".to_string(),
            ));
        }

        let create_note = lookup(ENV_CREATE_NOTE).unwrap_or_else(|| DEFAULT_CREATE_NOTE.to_string());

        Ok(Self {
            collection,
            events_collection,
            subscription_limit,
            default_status,
            create_note,
        })
    }
}

fn validate_collection_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.contains('/') {
        return Err(format!("must not contain '/': {name}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{ConfigError, MissionSyncConfig};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = MissionSyncConfig::from_lookup(|_| None);
        assert_eq!(config, Ok(MissionSyncConfig::default()));
        let config = MissionSyncConfig::default();
        assert_eq!(config.collection, "missions");
        assert_eq!(config.subscription_limit, 800);
        assert_eq!(config.default_status, "Scheduled");
    }

    #[test]
    fn overrides_are_trimmed_and_parsed() {
        let config = MissionSyncConfig::from_lookup(lookup_from(&[
            ("MISSION_SYNC_COLLECTION", " ops_missions "),
            ("MISSION_SYNC_SUBSCRIPTION_LIMIT", "250"),
        ]));
        let config = match config {
            Ok(value) => value,
            Err(error) => {
                assert!(false, "config should parse: {error}");
                return;
            }
        };
        assert_eq!(config.collection, "ops_missions");
        assert_eq!(config.subscription_limit, 250);
        assert_eq!(config.events_collection, "events");
    }

    #[test]
    fn rejects_zero_or_garbage_subscription_limit() {
        let zero = MissionSyncConfig::from_lookup(lookup_from(&[(
            "MISSION_SYNC_SUBSCRIPTION_LIMIT",
            "0",
        )]));
        assert!(matches!(
            zero,
            Err(ConfigError::InvalidSubscriptionLimit(_))
        ));

        let garbage = MissionSyncConfig::from_lookup(lookup_from(&[(
            "MISSION_SYNC_SUBSCRIPTION_LIMIT",
            "lots",
        )]));
        assert!(matches!(
            garbage,
            Err(ConfigError::InvalidSubscriptionLimit(_))
        ));
    }

    #[test]
    fn rejects_nested_collection_paths() {
        let result = MissionSyncConfig::from_lookup(lookup_from(&[(
            "MISSION_SYNC_COLLECTION",
            "missions/archive",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidCollection(_))));
    }
}
