//! Wall-clock timestamps for snapshots, entities and events.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp stamped on rendered entities and published events.
pub type Timestamp = DateTime<Utc>;

/// Current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Time elapsed since `since`, zero when `since` lies in the future.
#[must_use]
pub fn age(since: Timestamp) -> Duration {
    (now() - since).to_std().unwrap_or(Duration::ZERO)
}
