//! Shared scan leases.
//!
//! The host adapter has a single scan state. A lookup and any number of
//! advertisement followers may need it at the same time, so each user
//! takes a lease: the first one starts the scan and the last one to
//! leave stops it.

use std::future::Future;
use std::sync::Arc;

use btleplug::api::{Central as _, ScanFilter};
use btleplug::platform::Adapter;
use tokio::sync::Mutex;

use crate::error::BleError;

/// Starts and stops scanning on a host adapter.
pub(crate) trait ScanRadio: Send + Sync + 'static {
    fn start(&self) -> impl Future<Output = Result<(), BleError>> + Send;
    fn stop(&self) -> impl Future<Output = Result<(), BleError>> + Send;
}

impl ScanRadio for Adapter {
    async fn start(&self) -> Result<(), BleError> {
        self.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BleError> {
        self.stop_scan().await?;
        Ok(())
    }
}

/// Reference count of scan users.
#[derive(Debug, Default)]
struct ScanUsers(usize);

impl ScanUsers {
    /// Register a user. Returns `true` for the first one.
    fn enter(&mut self) -> bool {
        self.0 += 1;
        self.0 == 1
    }

    /// Unregister a user. Returns `true` when the last one left.
    fn leave(&mut self) -> bool {
        match self.0 {
            0 => false,
            n => {
                self.0 = n - 1;
                self.0 == 0
            }
        }
    }
}

/// Hands out scan leases over one radio.
pub(crate) struct ScanLeases<R> {
    radio: Arc<R>,
    users: Arc<Mutex<ScanUsers>>,
}

impl<R> Clone for ScanLeases<R> {
    fn clone(&self) -> Self {
        Self {
            radio: Arc::clone(&self.radio),
            users: Arc::clone(&self.users),
        }
    }
}

impl<R: ScanRadio> ScanLeases<R> {
    pub(crate) fn new(radio: R) -> Self {
        Self {
            radio: Arc::new(radio),
            users: Arc::new(Mutex::new(ScanUsers::default())),
        }
    }

    pub(crate) fn radio(&self) -> &R {
        &self.radio
    }

    /// Take a lease, starting the scan when nobody else holds one.
    ///
    /// # Errors
    ///
    /// Returns [`BleError`] when the scan cannot be started; no lease is
    /// held in that case.
    pub(crate) async fn acquire(&self) -> Result<(), BleError> {
        let mut users = self.users.lock().await;
        if users.enter()
            && let Err(err) = self.radio.start().await
        {
            users.leave();
            return Err(err);
        }
        Ok(())
    }

    /// Give a lease back, stopping the scan when it was the last one.
    pub(crate) async fn release(&self) {
        let mut users = self.users.lock().await;
        if users.leave() {
            match self.radio.stop().await {
                Ok(()) => tracing::debug!("BLE scan stopped, no users left"),
                Err(err) => tracing::debug!(%err, "ignoring stop_scan error"),
            }
        }
    }
}
