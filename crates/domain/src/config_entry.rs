//! Config entry — the persisted description of one configured controller.

use serde::{Deserialize, Serialize};

use crate::address::DeviceAddress;
use crate::device::ServiceData;
use crate::error::ValidationError;

/// One configured controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// User-visible title; entity names are derived from it.
    pub title: String,
    /// Address of the controller.
    pub address: DeviceAddress,
    /// Advertisement payload captured when the entry was created.
    #[serde(default)]
    pub service_data: ServiceData,
}

impl ConfigEntry {
    /// Create and validate an entry.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTitle`] when `title` is blank.
    pub fn new(
        title: impl Into<String>,
        address: DeviceAddress,
        service_data: ServiceData,
    ) -> Result<Self, ValidationError> {
        let entry = Self {
            title: title.into(),
            address,
            service_data,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTitle`] when `title` is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }
}
