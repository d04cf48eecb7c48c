//! Mission sync error types.

use thiserror::Error;

/// Errors raised by a document store or its change feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store_unavailable:{0}")]
    Unavailable(String),
    #[error("store_write_rejected:{0}")]
    Rejected(String),
    #[error("store_document_missing:{0}")]
    NotFound(String),
    #[error("store_channel_closed")]
    ChannelClosed,
    #[error("store_internal:{0}")]
    Internal(String),
}

/// Errors surfaced by the writer, accessor, and bridge.
///
/// Validation variants are raised before any store request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissionError {
    #[error("mission_id_invalid")]
    InvalidIdentifier,
    #[error("mission_id_missing")]
    MissingIdentifier,
    #[error("mission_year_invalid:{0}")]
    InvalidYear(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MissionError {
    /// True for errors raised by local validation rather than the store.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Mission sync result type.
pub type Result<T> = std::result::Result<T, MissionError>;

#[cfg(test)]
mod tests {
    use super::{MissionError, StoreError};

    #[test]
    fn validation_errors_are_distinguished_from_store_errors() {
        assert!(MissionError::InvalidIdentifier.is_validation());
        assert!(MissionError::InvalidYear("25".to_string()).is_validation());
        assert!(!MissionError::from(StoreError::ChannelClosed).is_validation());
    }

    #[test]
    fn store_errors_render_through_mission_errors() {
        let error = MissionError::from(StoreError::Unavailable("offline".to_string()));
        assert_eq!(error.to_string(), "store_unavailable:offline");
    }
}
