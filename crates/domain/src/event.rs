//! Event — an immutable record of something that happened to a controller.
//!
//! Events are produced when an entity re-renders, when a scheduled refresh
//! fails, and when the controller's availability flips.

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::time::{Timestamp, now};

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An entity rendered a new state.
    StateChanged,
    /// A scheduled refresh failed.
    UpdateFailed,
    /// The controller became available or unavailable.
    AvailabilityChanged,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChanged => f.write_str("state_changed"),
            Self::UpdateFailed => f.write_str("update_failed"),
            Self::AvailabilityChanged => f.write_str("availability_changed"),
        }
    }
}

/// A timestamped domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    /// Unique id of the entity concerned, if any.
    pub unique_id: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, unique_id: Option<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            unique_id,
            data,
            timestamp: now(),
        }
    }
}
