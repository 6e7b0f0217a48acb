//! BLE adapter configuration.

use serde::Deserialize;

/// Configuration for Bluetooth discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// How long `resolve` scans for an address, in seconds.
    pub scan_duration_secs: u16,
    /// Index of the host adapter to use when several are present.
    pub adapter_index: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 10,
            adapter_index: 0,
        }
    }
}
