//! # acinfinity-adapter-ble
//!
//! Bluetooth discovery backed by the host BLE stack through `btleplug`.
//!
//! ## How it works
//!
//! AC Infinity controllers advertise continuously. [`BleDiscovery`]
//! resolves a configured address by first checking the peripherals the
//! host adapter already knows, then scanning for a bounded time. Once a
//! controller is set up, a background follower keeps forwarding its
//! advertisements (name, RSSI, manufacturer data) to the device handle.
//!
//! Connecting and speaking the controller protocol is the device handle's
//! job; this adapter never opens a GATT connection.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `acinfinity-app` and
//! `acinfinity-domain`.

mod config;
mod error;
mod lease;
mod scanner;

pub use config::BleConfig;
pub use error::BleError;

use std::time::Duration;

use btleplug::platform::Adapter;
use tokio::sync::mpsc;

use acinfinity_app::ports::{Advertisement, BluetoothDiscovery, ResolvedDevice};
use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::error::AcInfinityError;

use crate::lease::ScanLeases;

const ADVERTISEMENT_BUFFER: usize = 32;

/// [`BluetoothDiscovery`] over one host BLE adapter.
///
/// Lookups and followers share the adapter's scan through leases, so a
/// follower ending never stops a scan someone else still relies on.
pub struct BleDiscovery {
    leases: ScanLeases<Adapter>,
    scan_duration: Duration,
}

impl BleDiscovery {
    /// Open the configured host adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the host has no usable
    /// adapter, or [`BleError::Scan`] when the BLE manager fails.
    pub async fn new(config: &BleConfig) -> Result<Self, BleError> {
        let central = scanner::open_central(config.adapter_index).await?;
        tracing::info!(
            adapter_index = config.adapter_index,
            scan_duration_secs = config.scan_duration_secs,
            "BLE adapter opened"
        );
        Ok(Self::with_adapter(central, config))
    }

    /// Wrap an already opened adapter.
    #[must_use]
    pub fn with_adapter(central: Adapter, config: &BleConfig) -> Self {
        Self {
            leases: ScanLeases::new(central),
            scan_duration: Duration::from_secs(u64::from(config.scan_duration_secs)),
        }
    }
}

impl BluetoothDiscovery for BleDiscovery {
    async fn resolve(
        &self,
        address: &DeviceAddress,
    ) -> Result<Option<ResolvedDevice>, AcInfinityError> {
        let found = scanner::find_device(&self.leases, address, self.scan_duration).await?;
        if found.is_none() {
            tracing::info!(%address, "device not found during BLE scan");
        }
        Ok(found)
    }

    async fn watch(
        &self,
        address: &DeviceAddress,
    ) -> Result<mpsc::Receiver<Advertisement>, AcInfinityError> {
        let (sender, receiver) = mpsc::channel(ADVERTISEMENT_BUFFER);
        tokio::spawn(scanner::follow(
            self.leases.clone(),
            address.clone(),
            sender,
        ));
        Ok(receiver)
    }
}
