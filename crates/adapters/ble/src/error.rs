//! BLE adapter error types.

use acinfinity_domain::error::{AcInfinityError, DeviceError, ValidationError};

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// BLE scan or adapter operation failed.
    #[error("BLE scan error")]
    Scan(#[from] btleplug::Error),

    /// The host reported an address that is not a valid device address.
    #[error("invalid BLE address")]
    InvalidAddress(#[source] ValidationError),
}

impl BleError {
    /// Convert into an [`AcInfinityError`] for propagation across port
    /// boundaries. Radio failures surface as transport errors.
    #[must_use]
    pub fn into_domain(self) -> AcInfinityError {
        match self {
            Self::InvalidAddress(err) => AcInfinityError::Validation(err),
            other => AcInfinityError::Device(DeviceError::transport(other)),
        }
    }
}

impl From<BleError> for AcInfinityError {
    fn from(err: BleError) -> Self {
        err.into_domain()
    }
}
