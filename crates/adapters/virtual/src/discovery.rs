//! In-memory discovery for demo mode and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use acinfinity_app::ports::{Advertisement, BluetoothDiscovery, ResolvedDevice};
use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::error::AcInfinityError;

const WATCH_CAPACITY: usize = 16;

/// Discovery over a fixed set of devices.
///
/// Advertisements pushed through [`advertise`](Self::advertise) reach every
/// live watcher of the matching address.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    devices: BTreeMap<DeviceAddress, ResolvedDevice>,
    watchers: Mutex<Vec<(DeviceAddress, mpsc::Sender<Advertisement>)>>,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device resolvable.
    #[must_use]
    pub fn with_device(mut self, address: DeviceAddress, local_name: impl Into<String>) -> Self {
        self.devices.insert(
            address.clone(),
            ResolvedDevice {
                address,
                local_name: Some(local_name.into()),
                rssi: None,
            },
        );
        self
    }

    /// Deliver an advertisement to the watchers of its address.
    ///
    /// Returns how many watchers received it.
    pub fn advertise(&self, advertisement: &Advertisement) -> usize {
        let mut watchers = self.lock();
        watchers.retain(|(_, sender)| !sender.is_closed());
        watchers
            .iter()
            .filter(|(address, _)| *address == advertisement.device.address)
            .filter(|(_, sender)| sender.try_send(advertisement.clone()).is_ok())
            .count()
    }

    /// Number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.lock();
        watchers.retain(|(_, sender)| !sender.is_closed());
        watchers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(DeviceAddress, mpsc::Sender<Advertisement>)>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BluetoothDiscovery for StaticDiscovery {
    async fn resolve(
        &self,
        address: &DeviceAddress,
    ) -> Result<Option<ResolvedDevice>, AcInfinityError> {
        Ok(self.devices.get(address).cloned())
    }

    async fn watch(
        &self,
        address: &DeviceAddress,
    ) -> Result<mpsc::Receiver<Advertisement>, AcInfinityError> {
        let (sender, receiver) = mpsc::channel(WATCH_CAPACITY);
        self.lock().push((address.clone(), sender));
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> DeviceAddress {
        DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn advertisement(address: DeviceAddress) -> Advertisement {
        Advertisement {
            device: ResolvedDevice {
                address,
                local_name: Some("ACI-E 12AB".to_string()),
                rssi: Some(-55),
            },
            manufacturer_data: BTreeMap::from([(0x0902, vec![0x01, 0x0b])]),
        }
    }

    #[tokio::test]
    async fn should_resolve_known_device_only() {
        let discovery = StaticDiscovery::new().with_device(address(), "ACI-E 12AB");

        let found = discovery.resolve(&address()).await.unwrap().unwrap();
        assert_eq!(found.local_name.as_deref(), Some("ACI-E 12AB"));

        let other = DeviceAddress::parse("11:22:33:44:55:66").unwrap();
        assert!(discovery.resolve(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_deliver_advertisements_to_matching_watchers() {
        let discovery = StaticDiscovery::new().with_device(address(), "ACI-E 12AB");
        let mut matching = discovery.watch(&address()).await.unwrap();
        let other = DeviceAddress::parse("11:22:33:44:55:66").unwrap();
        let mut unrelated = discovery.watch(&other).await.unwrap();

        assert_eq!(discovery.advertise(&advertisement(address())), 1);

        assert_eq!(matching.recv().await.unwrap().device.rssi, Some(-55));
        assert!(unrelated.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_forget_dropped_watchers() {
        let discovery = StaticDiscovery::new();
        let receiver = discovery.watch(&address()).await.unwrap();
        assert_eq!(discovery.watcher_count(), 1);

        drop(receiver);

        assert_eq!(discovery.watcher_count(), 0);
        assert_eq!(discovery.advertise(&advertisement(address())), 0);
    }
}
