//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `acinfinity.toml` in the working directory. Every field has a
//! default so the file is optional, except that a device address must come
//! from somewhere. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use acinfinity_adapter_ble::BleConfig;
use acinfinity_app::coordinator::CoordinatorConfig;
use acinfinity_app::services::SetupOptions;
use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::config_entry::ConfigEntry;
use acinfinity_domain::device::ServiceData;

const CONFIG_FILE: &str = "acinfinity.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The controller to run.
    pub device: DeviceConfig,
    /// Polling and readiness timings.
    pub polling: PollingConfig,
    /// Bluetooth discovery.
    pub ble: BleSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// The configured controller, i.e. the config entry.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// User-visible title; entity names derive from it.
    pub title: String,
    /// BLE address (`XX:XX:XX:XX:XX:XX`).
    pub address: String,
    /// Advertised identity captured when the controller was paired.
    pub service_data: ServiceData,
}

/// Polling and readiness timings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub update_interval_secs: u64,
    /// How long setup waits for the first snapshot.
    pub device_timeout_secs: u64,
    /// Hard deadline of a single refresh.
    pub refresh_timeout_secs: u64,
    /// Consecutive failed refreshes before entities turn unavailable.
    pub unavailable_after: u32,
    /// Release the connection after every refresh.
    pub disconnect_after_update: bool,
}

/// Bluetooth discovery settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BleSection {
    /// Resolve the device through the host BLE stack. When disabled the
    /// configured device is assumed present (demo mode).
    pub enabled: bool,
    /// How long a lookup scans, in seconds.
    pub scan_duration_secs: u16,
    /// Host adapter index.
    pub adapter_index: usize,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `acinfinity.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(CONFIG_FILE)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ACINFINITY_ADDRESS") {
            self.device.address = val;
        }
        if let Ok(val) = std::env::var("ACINFINITY_TITLE") {
            self.device.title = val;
        }
        if let Ok(val) = std::env::var("ACINFINITY_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.update_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "polling.update_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.polling.device_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "polling.device_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.polling.refresh_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "polling.refresh_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.polling.refresh_timeout_secs >= self.polling.update_interval_secs {
            return Err(ConfigError::Validation(
                "polling.refresh_timeout_secs must be shorter than polling.update_interval_secs"
                    .to_string(),
            ));
        }
        self.entry()?;
        Ok(())
    }

    /// Build the config entry for the configured controller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the address is missing or
    /// malformed, or the title is blank.
    pub fn entry(&self) -> Result<ConfigEntry, ConfigError> {
        let address = DeviceAddress::parse(&self.device.address)
            .map_err(|err| ConfigError::Validation(format!("device.address: {err}")))?;
        ConfigEntry::new(
            self.device.title.trim(),
            address,
            self.device.service_data.clone(),
        )
        .map_err(|err| ConfigError::Validation(format!("device.title: {err}")))
    }

    /// Setup parameters for the integration.
    #[must_use]
    pub fn setup_options(&self) -> SetupOptions {
        SetupOptions {
            device_timeout: Duration::from_secs(self.polling.device_timeout_secs),
            coordinator: CoordinatorConfig {
                update_interval: self.update_interval(),
                refresh_timeout: Duration::from_secs(self.polling.refresh_timeout_secs),
                unavailable_after: self.polling.unavailable_after,
                disconnect_after_update: self.polling.disconnect_after_update,
            },
        }
    }

    /// Delay between two setup attempts of a device that is not ready.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.polling.update_interval_secs)
    }

    /// Settings for the BLE adapter.
    #[must_use]
    pub fn ble_config(&self) -> BleConfig {
        BleConfig {
            scan_duration_secs: self.ble.scan_duration_secs,
            adapter_index: self.ble.adapter_index,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            title: "AC Infinity".to_string(),
            address: String::new(),
            service_data: ServiceData::default(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 15,
            device_timeout_secs: 30,
            refresh_timeout_secs: 10,
            unavailable_after: 1,
            disconnect_after_update: true,
        }
    }
}

impl Default for BleSection {
    fn default() -> Self {
        let adapter = BleConfig::default();
        Self {
            enabled: false,
            scan_duration_secs: adapter.scan_duration_secs,
            adapter_index: adapter.adapter_index,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "acinfinityd=info,acinfinity=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.device.address = "aa:bb:cc:dd:ee:ff".to_string();
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.device.title, "AC Infinity");
        assert_eq!(config.polling.update_interval_secs, 15);
        assert_eq!(config.polling.device_timeout_secs, 30);
        assert_eq!(config.polling.refresh_timeout_secs, 10);
        assert_eq!(config.polling.unavailable_after, 1);
        assert!(config.polling.disconnect_after_update);
        assert!(!config.ble.enabled);
        assert_eq!(config.ble.scan_duration_secs, 10);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.polling.update_interval_secs, 15);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [device]
            title = 'Grow Tent'
            address = 'aa:bb:cc:dd:ee:ff'

            [device.service_data]
            name = 'ACI-E 12AB'
            type = 11
            version = 3

            [polling]
            update_interval_secs = 30
            device_timeout_secs = 45
            refresh_timeout_secs = 5
            unavailable_after = 3
            disconnect_after_update = false

            [ble]
            enabled = true
            scan_duration_secs = 4
            adapter_index = 1

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.device.title, "Grow Tent");
        assert_eq!(config.device.service_data.device_type, 11);
        assert_eq!(config.device.service_data.version, 3);
        assert_eq!(config.device.service_data.name, "ACI-E 12AB");
        assert_eq!(config.polling.update_interval_secs, 30);
        assert_eq!(config.polling.unavailable_after, 3);
        assert!(!config.polling.disconnect_after_update);
        assert!(config.ble.enabled);
        assert_eq!(config.ble_config().scan_duration_secs, 4);
        assert_eq!(config.ble_config().adapter_index, 1);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [polling]
            update_interval_secs = 60
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.polling.update_interval_secs, 60);
        assert_eq!(config.polling.device_timeout_secs, 30);
        assert_eq!(config.device.title, "AC Infinity");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.polling.update_interval_secs, 15);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_require_device_address() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("device.address"));
    }

    #[test]
    fn should_reject_malformed_address() {
        let mut config = configured();
        config.device.address = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_blank_title() {
        let mut config = configured();
        config.device.title = "   ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("device.title"));
    }

    #[test]
    fn should_reject_zero_timings() {
        let mut config = configured();
        config.polling.update_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.polling.device_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.polling.refresh_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_refresh_timeout_not_shorter_than_interval() {
        let mut config = configured();
        config.polling.update_interval_secs = 10;
        config.polling.refresh_timeout_secs = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than polling.update_interval_secs"));

        config.polling.refresh_timeout_secs = 9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_build_upper_cased_entry() {
        let mut config = configured();
        config.device.title = "  Grow Tent ".to_string();

        let entry = config.entry().unwrap();

        assert_eq!(entry.address.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(entry.title, "Grow Tent");
    }

    #[test]
    fn should_map_polling_section_to_setup_options() {
        let mut config = configured();
        config.polling.unavailable_after = 2;
        config.polling.disconnect_after_update = false;

        let options = config.setup_options();

        assert_eq!(options.device_timeout, Duration::from_secs(30));
        assert_eq!(options.coordinator.update_interval, Duration::from_secs(15));
        assert_eq!(options.coordinator.refresh_timeout, Duration::from_secs(10));
        assert_eq!(options.coordinator.unavailable_after, 2);
        assert!(!options.coordinator.disconnect_after_update);
    }
}
