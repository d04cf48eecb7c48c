//! Mission event log, folded current state, and realtime mission views.
//!
//! Every write appends one immutable event under the mission and merges a
//! sanitized patch into the mission's current-state document. Readers observe
//! the current-state collection through snapshot subscriptions that the
//! bridge normalizes, sorts by recency, and optionally filters by year.

pub mod accessor;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod date;
pub mod error;
pub mod event;
pub mod identity;
pub mod memory;
pub mod mission;
pub mod patch;
pub mod store;
pub mod subscription;
pub mod view;
pub mod writer;

pub use accessor::MissionStoreAccessor;
pub use bridge::{MissionBridge, MissionDraft};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, MissionSyncConfig};
pub use error::{MissionError, Result, StoreError};
pub use event::{EventType, MissionEvent};
pub use memory::InMemoryDocumentStore;
pub use mission::Mission;
pub use patch::Patch;
pub use store::{Document, DocumentStore, FieldWrite, SnapshotReceiver, WriteSet};
pub use subscription::{ErrorCallback, SnapshotCallback, Subscription};
pub use writer::{DeleteAllOutcome, MissionWriter};
