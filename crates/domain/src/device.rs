//! Device — the cached state of one AC Infinity controller.

use serde::{Deserialize, Serialize};

use crate::model;

/// Most recently observed readings of a controller.
///
/// A snapshot is replaced whole by the device handle; consumers only ever
/// see complete snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Probe temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Vapour-pressure deficit in kPa.
    pub vpd: f64,
    /// Fan level, `0..=10`.
    pub fan: u8,
    /// Whether the fan output is enabled.
    pub is_on: bool,
    /// Device type code reported by the controller.
    pub device_type: u8,
    /// Firmware / protocol version.
    pub version: u8,
}

impl DeviceState {
    /// Whether this controller exposes a VPD reading.
    #[must_use]
    pub fn supports_vpd(&self) -> bool {
        model::supports_vpd(self.device_type, self.version)
    }
}

/// Static identity advertised by a controller, stored in the config entry.
///
/// Carries the fields the device handle needs before its first refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceData {
    /// Advertised local name.
    pub name: String,
    /// Device type code.
    #[serde(rename = "type")]
    pub device_type: u8,
    /// Firmware / protocol version.
    pub version: u8,
}
