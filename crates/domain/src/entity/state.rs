//! Entity state — the current rendered value of an entity.

use serde::{Deserialize, Serialize};

/// Rendered state of an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    On,
    Off,
    /// Numeric reading of a sensor, in the kind's unit.
    Measurement(f64),
    #[default]
    Unknown,
    Unavailable,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Measurement(value) => write!(f, "{value}"),
            Self::Unknown => f.write_str("unknown"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_unknown() {
        assert_eq!(EntityState::default(), EntityState::Unknown);
    }

    #[test]
    fn should_display_lowercase_variant_name() {
        assert_eq!(EntityState::On.to_string(), "on");
        assert_eq!(EntityState::Off.to_string(), "off");
        assert_eq!(EntityState::Unavailable.to_string(), "unavailable");
    }

    #[test]
    fn should_display_measurement_value() {
        assert_eq!(EntityState::Measurement(23.75).to_string(), "23.75");
    }

    #[test]
    fn should_serialize_measurement_with_its_value() {
        let json = serde_json::to_string(&EntityState::Measurement(1.2)).unwrap();
        assert_eq!(json, r#"{"measurement":1.2}"#);
    }

    #[test]
    fn should_serialize_unit_variants_as_lowercase_strings() {
        let json = serde_json::to_string(&EntityState::Off).unwrap();
        assert_eq!(json, "\"off\"");
        let parsed: EntityState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntityState::Off);
    }
}
