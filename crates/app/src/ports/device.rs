//! Device handle port — the owner of the transport to one controller.
//!
//! A handle caches the most recent [`DeviceState`] and pushes every fresh
//! snapshot to its [`StateListeners`]. Protocol decoding lives behind this
//! trait; the application only triggers refreshes and commands.

use std::future::Future;
use std::sync::Arc;

use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::device::{DeviceState, ServiceData};
use acinfinity_domain::error::{AcInfinityError, DeviceError};

use crate::listeners::{StateListeners, Subscription};
use crate::ports::discovery::{Advertisement, ResolvedDevice};

/// Connection to a single AC Infinity controller.
pub trait DeviceHandle: Send + Sync + 'static {
    /// Address of the controller.
    fn address(&self) -> &DeviceAddress;

    /// Display name of the controller.
    fn name(&self) -> String;

    /// The cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::StateNotYetAvailable`] before the first
    /// successful refresh.
    fn state(&self) -> Result<Arc<DeviceState>, DeviceError>;

    /// Registry notified after each snapshot replacement.
    fn listeners(&self) -> &StateListeners;

    /// Refresh the cached state from the device.
    fn update(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Disconnect and release the transport.
    fn stop(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Turn the fan on, optionally at a given level.
    fn turn_on(&self, speed: Option<u8>) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Turn the fan off.
    fn turn_off(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Set the fan level (`0` turns it off).
    fn set_speed(&self, speed: u8) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Feed a passive advertisement observed by the Bluetooth stack.
    fn set_advertisement(&self, advertisement: Advertisement);

    /// Whether readings and commands are simulated rather than exchanged
    /// with the hardware. Entities of a simulated handle say so.
    fn is_simulated(&self) -> bool {
        false
    }

    /// Register a callback fired on every fresh snapshot.
    #[must_use = "dropping the subscription unregisters the callback"]
    fn register_callback<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DeviceState>) + Send + Sync + 'static,
    {
        self.listeners().register(callback)
    }
}

/// Builds a [`DeviceHandle`] for a resolved device.
pub trait DeviceHandleFactory: Send + Sync {
    /// The concrete handle type.
    type Handle: DeviceHandle;

    /// Construct a handle from the resolved device and the service data
    /// stored in the config entry.
    ///
    /// # Errors
    ///
    /// Returns [`AcInfinityError`] if the service data is unusable.
    fn create(
        &self,
        device: ResolvedDevice,
        service_data: &ServiceData,
    ) -> Result<Self::Handle, AcInfinityError>;
}
