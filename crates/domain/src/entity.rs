//! Entity — one observable/controllable projection of a controller.
//!
//! A controller is exposed as up to four entities (temperature, humidity,
//! VPD and fan). Each carries a stable unique id derived from the device
//! address, a display name, the shared [`DeviceInfo`] block, and its last
//! rendered [`EntityState`] plus typed attributes.

mod attribute_value;
mod state;

pub use attribute_value::AttributeValue;
pub use state::EntityState;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::DeviceAddress;
use crate::error::{AcInfinityError, ValidationError};
use crate::time::{Timestamp, now};

/// The projection an entity renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Temperature,
    Humidity,
    Vpd,
    Fan,
}

impl EntityKind {
    /// Suffix appended to the device address to form the unique id.
    #[must_use]
    pub fn unique_id_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "tmp",
            Self::Humidity => "hum",
            Self::Vpd => "vpd",
            Self::Fan => "fan",
        }
    }

    /// Suffix appended to the entry title to form the display name.
    #[must_use]
    pub fn name_suffix(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Vpd => "VPD",
            Self::Fan => "Fan",
        }
    }

    /// Unit of measurement for sensor kinds.
    #[must_use]
    pub fn unit(self) -> Option<&'static str> {
        match self {
            Self::Temperature => Some("\u{b0}C"),
            Self::Humidity => Some("%"),
            Self::Vpd => Some("kPa"),
            Self::Fan => None,
        }
    }

    /// Host device class for sensor kinds.
    #[must_use]
    pub fn device_class(self) -> Option<&'static str> {
        match self {
            Self::Temperature => Some("temperature"),
            Self::Humidity => Some("humidity"),
            Self::Vpd => Some("atmospheric_pressure"),
            Self::Fan => None,
        }
    }

    /// Whether this kind is a read-only measurement.
    #[must_use]
    pub fn is_sensor(self) -> bool {
        !matches!(self, Self::Fan)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name_suffix())
    }
}

/// Hardware description shared by every entity of one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub sw_version: String,
    /// `(connection type, identifier)` pairs, e.g. `("bluetooth", address)`.
    pub connections: Vec<(String, String)>,
}

/// A rendered entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub unique_id: String,
    pub name: String,
    pub kind: EntityKind,
    pub device_info: DeviceInfo,
    pub state: EntityState,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub last_updated: Timestamp,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Read a single attribute.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    address: Option<DeviceAddress>,
    title: Option<String>,
    kind: Option<EntityKind>,
    device_info: Option<DeviceInfo>,
    state: EntityState,
    attributes: BTreeMap<String, AttributeValue>,
}

impl EntityBuilder {
    #[must_use]
    pub fn address(mut self, address: DeviceAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Config entry title the display name is derived from.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = Some(device_info);
        self
    }

    #[must_use]
    pub fn state(mut self, state: EntityState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// # Errors
    ///
    /// Returns [`AcInfinityError::Validation`] if the address, title or kind
    /// is missing, or the title is blank.
    pub fn build(self) -> Result<Entity, AcInfinityError> {
        let address = self.address.ok_or(ValidationError::EmptyAddress)?;
        let title = self.title.ok_or(ValidationError::EmptyTitle)?;
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let kind = self.kind.ok_or(ValidationError::MissingField("kind"))?;
        let device_info = self.device_info.unwrap_or_else(|| DeviceInfo {
            name: title.clone(),
            model: String::new(),
            manufacturer: String::new(),
            sw_version: String::new(),
            connections: Vec::new(),
        });

        Ok(Entity {
            unique_id: address.unique_id(kind.unique_id_suffix()),
            name: format!("{} {}", title.trim(), kind.name_suffix()),
            kind,
            device_info,
            state: self.state,
            attributes: self.attributes,
            last_updated: now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> DeviceAddress {
        DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    #[test]
    fn should_derive_unique_id_and_name_from_kind() {
        let entity = Entity::builder()
            .address(address())
            .title("Grow Tent")
            .kind(EntityKind::Humidity)
            .build()
            .unwrap();
        assert_eq!(entity.unique_id, "AA:BB:CC:DD:EE:FF_hum");
        assert_eq!(entity.name, "Grow Tent Humidity");
        assert_eq!(entity.state, EntityState::Unknown);
    }

    #[test]
    fn should_use_expected_suffixes_for_every_kind() {
        let cases = [
            (EntityKind::Temperature, "tmp", "Temperature"),
            (EntityKind::Humidity, "hum", "Humidity"),
            (EntityKind::Vpd, "vpd", "VPD"),
            (EntityKind::Fan, "fan", "Fan"),
        ];
        for (kind, id_suffix, name_suffix) in cases {
            assert_eq!(kind.unique_id_suffix(), id_suffix);
            assert_eq!(kind.name_suffix(), name_suffix);
        }
    }

    #[test]
    fn should_expose_sensor_metadata() {
        assert_eq!(EntityKind::Temperature.unit(), Some("\u{b0}C"));
        assert_eq!(EntityKind::Vpd.device_class(), Some("atmospheric_pressure"));
        assert!(EntityKind::Humidity.is_sensor());
        assert!(!EntityKind::Fan.is_sensor());
        assert_eq!(EntityKind::Fan.unit(), None);
    }

    #[test]
    fn should_reject_blank_title() {
        let result = Entity::builder()
            .address(address())
            .title("  ")
            .kind(EntityKind::Fan)
            .build();
        assert!(matches!(
            result,
            Err(AcInfinityError::Validation(ValidationError::EmptyTitle))
        ));
    }

    #[test]
    fn should_reject_missing_address() {
        let result = Entity::builder().title("Tent").build();
        assert!(matches!(
            result,
            Err(AcInfinityError::Validation(ValidationError::EmptyAddress))
        ));
    }

    #[test]
    fn should_reject_missing_kind() {
        let result = Entity::builder().address(address()).title("Tent").build();
        assert!(matches!(
            result,
            Err(AcInfinityError::Validation(ValidationError::MissingField("kind")))
        ));
    }

    #[test]
    fn should_store_attributes() {
        let entity = Entity::builder()
            .address(address())
            .title("Tent")
            .kind(EntityKind::Fan)
            .attribute("percentage", AttributeValue::Int(40))
            .build()
            .unwrap();
        assert_eq!(
            entity.get_attribute("percentage"),
            Some(&AttributeValue::Int(40))
        );
        assert_eq!(entity.get_attribute("missing"), None);
    }
}
