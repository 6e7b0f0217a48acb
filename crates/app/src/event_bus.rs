//! In-process event bus backed by a tokio broadcast channel.
//!
//! Entity state changes, failed refreshes and availability transitions
//! all flow through it to whoever listens (the daemon's event logger,
//! tests). A subscriber that falls more than `capacity` events behind
//! loses the oldest ones and is told how many it missed.

use std::future::Future;

use tokio::sync::broadcast;

use acinfinity_domain::error::AcInfinityError;
use acinfinity_domain::event::Event;

use crate::ports::EventPublisher;

/// [`EventPublisher`] fanning every event out to all current subscribers.
///
/// Publishing never fails; without subscribers the event is dropped.
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), AcInfinityError>> + Send {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            tracing::trace!(event_type = %event.event_type, "no subscriber for event");
        }
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use acinfinity_domain::config_entry::ConfigEntry;
    use acinfinity_domain::event::EventType;

    use crate::services::{AcInfinityIntegration, SetupOptions};
    use crate::test_support::{FakeDevice, FakeDiscovery, FakeFactory, address, state};

    fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    async fn set_up_on(bus: &Arc<InProcessEventBus>) {
        let integration = AcInfinityIntegration::new(
            FakeDiscovery::knowing(address()),
            FakeFactory::new(FakeDevice::reporting(state(11, 3))),
            Arc::clone(bus),
            SetupOptions::default(),
        );
        let entry = ConfigEntry::new("Tent", address(), Default::default()).unwrap();
        let instance = integration.setup(entry).await.unwrap();
        instance.unload().await;
    }

    #[tokio::test]
    async fn should_fan_out_setup_states_to_every_subscriber() {
        let bus = Arc::new(InProcessEventBus::new(16));
        let mut logger = bus.subscribe();
        let mut dashboard = bus.subscribe();

        set_up_on(&bus).await;

        let logged = drain(&mut logger);
        let shown = drain(&mut dashboard);
        assert_eq!(logged.len(), 4);
        assert!(logged.iter().all(|e| e.event_type == EventType::StateChanged));
        assert_eq!(
            logged.iter().map(|e| e.id).collect::<Vec<_>>(),
            shown.iter().map(|e| e.id).collect::<Vec<_>>()
        );
        assert_eq!(logged[3].unique_id.as_deref(), Some("AA:BB:CC:DD:EE:FF_fan"));
    }

    #[tokio::test]
    async fn should_tell_slow_subscriber_how_many_states_it_missed() {
        let bus = Arc::new(InProcessEventBus::new(2));
        let mut events = bus.subscribe();

        set_up_on(&bus).await;

        assert!(matches!(events.try_recv(), Err(TryRecvError::Lagged(2))));
        let rest: Vec<Option<String>> = drain(&mut events).into_iter().map(|e| e.unique_id).collect();
        assert_eq!(
            rest,
            vec![
                Some("AA:BB:CC:DD:EE:FF_vpd".to_string()),
                Some("AA:BB:CC:DD:EE:FF_fan".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn should_drop_update_failure_without_subscribers() {
        let bus = InProcessEventBus::new(16);
        let event = Event::new(
            EventType::UpdateFailed,
            None,
            serde_json::json!({"address": "AA:BB:CC:DD:EE:FF", "error": "timed out"}),
        );

        assert!(bus.publish(event).await.is_ok());

        let mut late = bus.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }
}
