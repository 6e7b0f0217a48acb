//! Controller model table and capability rules.

use crate::error::UnknownModelError;

/// Manufacturer reported in every device info block.
pub const MANUFACTURER: &str = "AC Infinity";

/// Minimum protocol version exposing a VPD reading.
pub const VPD_MIN_VERSION: u8 = 3;

/// Device type codes whose controllers compute VPD.
pub const VPD_DEVICE_TYPES: [u8; 4] = [7, 9, 11, 12];

const MODELS: [(u8, &str); 3] = [
    (1, "Controller 67"),
    (7, "Controller 69"),
    (11, "Controller 69 Pro"),
];

/// Look up the model label for a device type code.
///
/// # Errors
///
/// Returns [`UnknownModelError`] for codes absent from the table. There is
/// no fallback label.
pub fn model_label(device_type: u8) -> Result<&'static str, UnknownModelError> {
    MODELS
        .iter()
        .find(|(code, _)| *code == device_type)
        .map(|(_, label)| *label)
        .ok_or(UnknownModelError { code: device_type })
}

/// Whether a controller of this type and version reports VPD.
#[must_use]
pub fn supports_vpd(device_type: u8, version: u8) -> bool {
    version >= VPD_MIN_VERSION && VPD_DEVICE_TYPES.contains(&device_type)
}
