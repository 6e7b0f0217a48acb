//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`AcInfinityError`] via `#[from]`; no variant carries a bare `String`
//! describing what went wrong.

use std::time::Duration;

/// Top-level domain error.
#[derive(Debug, thiserror::Error)]
pub enum AcInfinityError {
    /// A value failed domain validation.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The controller reported a type code with no known model label.
    #[error("unknown device model")]
    UnknownModel(#[from] UnknownModelError),

    /// The device handle failed to refresh or execute a command.
    #[error("device error")]
    Device(#[from] DeviceError),

    /// A referenced entity does not exist.
    #[error("entity not found")]
    NotFound(#[from] NotFoundError),

    /// The entity does not support the requested service.
    #[error("unsupported service")]
    UnsupportedService(#[from] UnsupportedServiceError),
}

/// Validation failures for domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The device address was empty.
    #[error("device address must not be empty")]
    EmptyAddress,

    /// The device address is not six colon-separated hex octets.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    /// The config entry title was empty.
    #[error("title must not be empty")]
    EmptyTitle,

    /// A fan percentage outside `0..=100`.
    #[error("percentage {0} is out of range 0..=100")]
    PercentageOutOfRange(i64),

    /// A required field was missing (service call payload or entity kind).
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
}

/// Failure kinds surfaced by a device handle.
///
/// Transport errors and premature state access are distinct kinds here but
/// are treated identically by the polling coordinator.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The BLE transport failed (connect, read, write, disconnect).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The cached state was read before the first successful refresh.
    #[error("device state is not yet available")]
    StateNotYetAvailable,

    /// The operation did not finish before its deadline.
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),
}

impl DeviceError {
    /// Wrap any error as a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }
}

/// A device type code that is absent from the model table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no model label for device type {code}")]
pub struct UnknownModelError {
    /// The offending type code.
    pub code: u8,
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    /// Kind of thing that was looked up (e.g. `"Entity"`).
    pub entity: &'static str,
    /// The identifier that did not match.
    pub id: String,
}

/// A service call the target entity cannot handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entity {entity} does not support service {service:?}")]
pub struct UnsupportedServiceError {
    /// Unique id of the entity.
    pub entity: String,
    /// Requested service name.
    pub service: String,
}
