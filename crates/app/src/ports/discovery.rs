//! Bluetooth discovery port — resolve addresses and follow advertisements.
//!
//! The host Bluetooth stack owns scanning. The application only needs to
//! turn a configured address into a connectable device reference and to be
//! told when that device advertises again.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::sync::mpsc;

use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::error::AcInfinityError;

/// A live, connectable device found by the Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub address: DeviceAddress,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Last observed signal strength in dBm.
    pub rssi: Option<i16>,
}

/// One passive advertisement observed for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub device: ResolvedDevice,
    /// Manufacturer-specific payloads keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

/// Resolves addresses to devices and streams their advertisements.
pub trait BluetoothDiscovery: Send + Sync {
    /// Find a connectable device for `address`.
    ///
    /// Returns `Ok(None)` when the device is not currently discoverable.
    fn resolve(
        &self,
        address: &DeviceAddress,
    ) -> impl Future<Output = Result<Option<ResolvedDevice>, AcInfinityError>> + Send;

    /// Start following advertisements of `address`.
    ///
    /// Advertisements are delivered until the receiver is dropped.
    fn watch(
        &self,
        address: &DeviceAddress,
    ) -> impl Future<Output = Result<mpsc::Receiver<Advertisement>, AcInfinityError>> + Send;
}

impl<T: BluetoothDiscovery> BluetoothDiscovery for std::sync::Arc<T> {
    fn resolve(
        &self,
        address: &DeviceAddress,
    ) -> impl Future<Output = Result<Option<ResolvedDevice>, AcInfinityError>> + Send {
        (**self).resolve(address)
    }

    fn watch(
        &self,
        address: &DeviceAddress,
    ) -> impl Future<Output = Result<mpsc::Receiver<Advertisement>, AcInfinityError>> + Send {
        (**self).watch(address)
    }
}
