//! Event bus port — publish/subscribe for domain events.

use std::future::Future;

use acinfinity_domain::error::AcInfinityError;
use acinfinity_domain::event::Event;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), AcInfinityError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), AcInfinityError>> + Send {
        (**self).publish(event)
    }
}
