//! Entity adapters — project the cached device snapshot onto entities.
//!
//! An [`EntityAdapter`] is selected by its [`EntityKind`]. Sensors render
//! one measurement; the fan renders on/off plus a percentage and forwards
//! commands to the [`DeviceHandle`].

use std::sync::Arc;

use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::config_entry::ConfigEntry;
use acinfinity_domain::device::DeviceState;
use acinfinity_domain::entity::{AttributeValue, DeviceInfo, Entity, EntityKind, EntityState};
use acinfinity_domain::error::{
    AcInfinityError, UnknownModelError, UnsupportedServiceError, ValidationError,
};
use acinfinity_domain::{fan, model};

use crate::ports::DeviceHandle;

const CONNECTION_BLUETOOTH: &str = "bluetooth";
const STATE_CLASS_MEASUREMENT: &str = "measurement";

/// Service names accepted by the fan.
pub mod service {
    pub const TURN_ON: &str = "turn_on";
    pub const TURN_OFF: &str = "turn_off";
    pub const SET_PERCENTAGE: &str = "set_percentage";
}

/// Build the device info block shared by every entity of a controller.
///
/// # Errors
///
/// Returns [`UnknownModelError`] when the state's type code has no label.
pub fn device_info(
    name: impl Into<String>,
    address: &DeviceAddress,
    state: &DeviceState,
) -> Result<DeviceInfo, UnknownModelError> {
    Ok(DeviceInfo {
        name: name.into(),
        model: model::model_label(state.device_type)?.to_string(),
        manufacturer: model::MANUFACTURER.to_string(),
        sw_version: state.version.to_string(),
        connections: vec![(CONNECTION_BLUETOOTH.to_string(), address.to_string())],
    })
}

/// Entity kinds a controller with this snapshot exposes, in display order.
#[must_use]
pub fn entity_kinds(state: &DeviceState) -> Vec<EntityKind> {
    let mut kinds = vec![EntityKind::Temperature, EntityKind::Humidity];
    if state.supports_vpd() {
        kinds.push(EntityKind::Vpd);
    }
    kinds.push(EntityKind::Fan);
    kinds
}

/// Build the adapters for a ready handle.
///
/// # Errors
///
/// Fails when the handle has no snapshot yet or its model is unknown.
pub fn build_entities<H: DeviceHandle>(
    entry: &ConfigEntry,
    handle: &Arc<H>,
) -> Result<Vec<EntityAdapter<H>>, AcInfinityError> {
    let state = handle.state()?;
    let info = device_info(handle.name(), handle.address(), &state)?;
    Ok(entity_kinds(&state)
        .into_iter()
        .map(|kind| EntityAdapter::new(kind, &entry.title, info.clone(), Arc::clone(handle)))
        .collect())
}

/// One entity of a controller.
pub struct EntityAdapter<H> {
    kind: EntityKind,
    title: String,
    unique_id: String,
    device_info: DeviceInfo,
    handle: Arc<H>,
}

impl<H> std::fmt::Debug for EntityAdapter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityAdapter")
            .field("kind", &self.kind)
            .field("unique_id", &self.unique_id)
            .finish_non_exhaustive()
    }
}

impl<H: DeviceHandle> EntityAdapter<H> {
    pub fn new(
        kind: EntityKind,
        title: impl Into<String>,
        device_info: DeviceInfo,
        handle: Arc<H>,
    ) -> Self {
        let unique_id = handle.address().unique_id(kind.unique_id_suffix());
        Self {
            kind,
            title: title.into(),
            unique_id,
            device_info,
            handle,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Render a snapshot into an entity.
    ///
    /// A missing snapshot renders `unknown`; an unavailable device renders
    /// `unavailable` whatever the snapshot holds.
    ///
    /// # Errors
    ///
    /// Returns [`AcInfinityError::Validation`] when the title is blank.
    pub fn render(
        &self,
        snapshot: Option<&DeviceState>,
        available: bool,
    ) -> Result<Entity, AcInfinityError> {
        let mut builder = Entity::builder()
            .address(self.handle.address().clone())
            .title(self.title.as_str())
            .kind(self.kind)
            .device_info(self.device_info.clone());

        if let Some(unit) = self.kind.unit() {
            builder = builder.attribute("unit_of_measurement", AttributeValue::from(unit));
        }
        if let Some(class) = self.kind.device_class() {
            builder = builder.attribute("device_class", AttributeValue::from(class));
        }
        if self.handle.is_simulated() {
            builder = builder.attribute("simulated", AttributeValue::Bool(true));
        }
        if self.kind.is_sensor() {
            builder = builder.attribute("state_class", AttributeValue::from(STATE_CLASS_MEASUREMENT));
        } else {
            builder = builder.attribute("speed_count", AttributeValue::from(fan::SPEED_COUNT));
        }

        let state = match snapshot {
            _ if !available => EntityState::Unavailable,
            None => EntityState::Unknown,
            Some(snapshot) => match self.kind {
                EntityKind::Temperature => EntityState::Measurement(snapshot.temperature),
                EntityKind::Humidity => EntityState::Measurement(snapshot.humidity),
                EntityKind::Vpd => EntityState::Measurement(snapshot.vpd),
                EntityKind::Fan => {
                    builder = builder.attribute(
                        "percentage",
                        AttributeValue::from(fan::level_to_percentage(snapshot.fan)),
                    );
                    if snapshot.is_on {
                        EntityState::On
                    } else {
                        EntityState::Off
                    }
                }
            },
        };

        builder.state(state).build()
    }

    /// Render the handle's cached snapshot.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub fn current(&self, available: bool) -> Result<Entity, AcInfinityError> {
        let snapshot = self.handle.state().ok();
        self.render(snapshot.as_deref(), available)
    }

    /// Set the fan speed from a percentage; `0` turns the fan off.
    ///
    /// # Errors
    ///
    /// Fails on sensors, on percentages above 100 and on device errors.
    pub async fn set_percentage(&self, percentage: u8) -> Result<(), AcInfinityError> {
        self.ensure_fan(service::SET_PERCENTAGE)?;
        let percentage = fan::parse_percentage(i64::from(percentage))?;
        let level = fan::percentage_to_level(percentage);
        tracing::debug!(unique_id = %self.unique_id, percentage, level, "setting fan speed");
        self.handle.set_speed(level).await?;
        Ok(())
    }

    /// Turn the fan on; without a percentage the device keeps its last
    /// speed.
    ///
    /// # Errors
    ///
    /// Fails on sensors, on percentages above 100 and on device errors.
    pub async fn turn_on(&self, percentage: Option<u8>) -> Result<(), AcInfinityError> {
        self.ensure_fan(service::TURN_ON)?;
        let level = percentage
            .map(|p| fan::parse_percentage(i64::from(p)).map(fan::percentage_to_level))
            .transpose()?;
        self.handle.turn_on(level).await?;
        Ok(())
    }

    /// Turn the fan off.
    ///
    /// # Errors
    ///
    /// Fails on sensors and on device errors.
    pub async fn turn_off(&self) -> Result<(), AcInfinityError> {
        self.ensure_fan(service::TURN_OFF)?;
        self.handle.turn_off().await?;
        Ok(())
    }

    /// Dispatch a named service call with its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`AcInfinityError::UnsupportedService`] for unknown services
    /// or any service on a sensor, and [`AcInfinityError::Validation`] for a
    /// missing or out-of-range `percentage`.
    pub async fn handle_service(
        &self,
        service: &str,
        data: &serde_json::Value,
    ) -> Result<(), AcInfinityError> {
        match service {
            service::TURN_ON => {
                let percentage = data
                    .get("percentage")
                    .and_then(serde_json::Value::as_i64)
                    .map(fan::parse_percentage)
                    .transpose()?;
                self.turn_on(percentage).await
            }
            service::TURN_OFF => self.turn_off().await,
            service::SET_PERCENTAGE => {
                let raw = data
                    .get("percentage")
                    .and_then(serde_json::Value::as_i64)
                    .ok_or(ValidationError::MissingField("percentage"))?;
                self.set_percentage(fan::parse_percentage(raw)?).await
            }
            other => Err(self.unsupported(other)),
        }
    }

    fn ensure_fan(&self, service: &str) -> Result<(), AcInfinityError> {
        if self.kind == EntityKind::Fan {
            Ok(())
        } else {
            Err(self.unsupported(service))
        }
    }

    fn unsupported(&self, service: &str) -> AcInfinityError {
        UnsupportedServiceError {
            entity: self.unique_id.clone(),
            service: service.to_string(),
        }
        .into()
    }
}
