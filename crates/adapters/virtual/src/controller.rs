//! Simulated AC Infinity controller.
//!
//! Readings drift slowly around a base climate; VPD is derived from
//! temperature and humidity the way the hardware computes it. Fan commands
//! act on the cached snapshot immediately. Faults can be injected to
//! exercise the polling lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use acinfinity_app::listeners::StateListeners;
use acinfinity_app::ports::{Advertisement, DeviceHandle, DeviceHandleFactory, ResolvedDevice};
use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::device::{DeviceState, ServiceData};
use acinfinity_domain::error::{AcInfinityError, DeviceError};
use acinfinity_domain::fan;

const BASE_TEMPERATURE: f64 = 24.0;
const BASE_HUMIDITY: f64 = 55.0;
const DEFAULT_SPEED: u8 = 5;

/// Faults raised by the simulated transport.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("simulated read failure")]
    ReadFailure,

    #[error("simulated disconnect failure")]
    DisconnectFailure,
}

#[derive(Debug)]
struct Output {
    speed: u8,
    is_on: bool,
    /// Level restored by a bare `turn_on`.
    last_speed: u8,
}

/// A simulated controller seeded from its advertised service data.
#[derive(Debug)]
pub struct VirtualController {
    address: DeviceAddress,
    name: String,
    service_data: ServiceData,
    state: Mutex<Option<Arc<DeviceState>>>,
    output: Mutex<Output>,
    listeners: StateListeners,
    advertisement: Mutex<Option<Advertisement>>,
    ticks: AtomicU64,
    connected: AtomicBool,
    silent: AtomicBool,
    failing_updates: AtomicU32,
    failing_disconnect: AtomicBool,
}

impl VirtualController {
    pub fn new(address: DeviceAddress, name: impl Into<String>, service_data: ServiceData) -> Self {
        Self {
            address,
            name: name.into(),
            service_data,
            state: Mutex::new(None),
            output: Mutex::new(Output {
                speed: DEFAULT_SPEED,
                is_on: true,
                last_speed: DEFAULT_SPEED,
            }),
            listeners: StateListeners::new(),
            advertisement: Mutex::new(None),
            ticks: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            failing_updates: AtomicU32::new(0),
            failing_disconnect: AtomicBool::new(false),
        }
    }

    /// Make the next `count` refreshes fail.
    pub fn fail_next_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// While silent, refreshes succeed without producing a snapshot.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Make every disconnect fail.
    pub fn set_disconnect_failure(&self, failing: bool) {
        self.failing_disconnect.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Most recent advertisement fed by the Bluetooth stack.
    #[must_use]
    pub fn last_advertisement(&self) -> Option<Advertisement> {
        lock(&self.advertisement).clone()
    }

    /// Number of snapshots produced so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn read(&self, tick: u64) -> DeviceState {
        // a slow sawtooth drift, 0.0..=0.9
        let drift = f64::from(u8::try_from(tick % 10).unwrap_or(0)) / 10.0;
        let temperature = round2(BASE_TEMPERATURE + drift);
        let humidity = round2(BASE_HUMIDITY - drift * 2.0);
        let output = lock(&self.output);
        DeviceState {
            temperature,
            humidity,
            vpd: round2(vapour_pressure_deficit(temperature, humidity)),
            fan: if output.is_on { output.speed } else { 0 },
            is_on: output.is_on,
            device_type: self.service_data.device_type,
            version: self.service_data.version,
        }
    }

    fn replace(&self, state: DeviceState) {
        let snapshot = Arc::new(state);
        *lock(&self.state) = Some(Arc::clone(&snapshot));
        self.listeners.notify(&snapshot);
    }

    /// Apply a fan command and push the resulting snapshot.
    fn command(&self, apply: impl FnOnce(&mut Output)) -> Result<(), DeviceError> {
        let current = lock(&self.state)
            .clone()
            .ok_or(DeviceError::StateNotYetAvailable)?;
        let (speed, is_on) = {
            let mut output = lock(&self.output);
            apply(&mut output);
            if output.speed > 0 {
                output.last_speed = output.speed;
            }
            (output.speed, output.is_on)
        };
        let mut next = (*current).clone();
        next.is_on = is_on;
        next.fan = if is_on { speed } else { 0 };
        self.replace(next);
        Ok(())
    }
}

impl DeviceHandle for VirtualController {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Result<Arc<DeviceState>, DeviceError> {
        lock(&self.state)
            .clone()
            .ok_or(DeviceError::StateNotYetAvailable)
    }

    fn listeners(&self) -> &StateListeners {
        &self.listeners
    }

    async fn update(&self) -> Result<(), DeviceError> {
        self.connected.store(true, Ordering::SeqCst);
        if self.take_failure() {
            tracing::debug!(address = %self.address, "injecting read failure");
            return Err(DeviceError::transport(VirtualError::ReadFailure));
        }
        if self.silent.load(Ordering::SeqCst) {
            return Ok(());
        }
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let state = self.read(tick);
        tracing::trace!(
            address = %self.address,
            temperature = state.temperature,
            humidity = state.humidity,
            "virtual controller refreshed"
        );
        self.replace(state);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.connected.store(false, Ordering::SeqCst);
        if self.failing_disconnect.load(Ordering::SeqCst) {
            return Err(DeviceError::transport(VirtualError::DisconnectFailure));
        }
        Ok(())
    }

    async fn turn_on(&self, speed: Option<u8>) -> Result<(), DeviceError> {
        self.command(|output| {
            output.is_on = true;
            output.speed = match speed {
                Some(level) => level.min(fan::SPEED_RANGE.1),
                None => output.last_speed.max(fan::SPEED_RANGE.0),
            };
        })
    }

    async fn turn_off(&self) -> Result<(), DeviceError> {
        self.command(|output| output.is_on = false)
    }

    async fn set_speed(&self, speed: u8) -> Result<(), DeviceError> {
        self.command(|output| {
            output.speed = speed.min(fan::SPEED_RANGE.1);
            output.is_on = speed > 0;
        })
    }

    fn set_advertisement(&self, advertisement: Advertisement) {
        tracing::trace!(address = %self.address, rssi = ?advertisement.device.rssi, "advertisement received");
        *lock(&self.advertisement) = Some(advertisement);
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Builds [`VirtualController`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualControllerFactory;

impl DeviceHandleFactory for VirtualControllerFactory {
    type Handle = VirtualController;

    fn create(
        &self,
        device: ResolvedDevice,
        service_data: &ServiceData,
    ) -> Result<VirtualController, AcInfinityError> {
        let name = if service_data.name.trim().is_empty() {
            device
                .local_name
                .unwrap_or_else(|| format!("AC Infinity {}", device.address))
        } else {
            service_data.name.clone()
        };
        Ok(VirtualController::new(
            device.address,
            name,
            service_data.clone(),
        ))
    }
}

/// Vapour-pressure deficit in kPa (Tetens saturation pressure).
fn vapour_pressure_deficit(temperature: f64, humidity: f64) -> f64 {
    let saturation = 0.6108 * ((17.27 * temperature) / (temperature + 237.3)).exp();
    saturation * (1.0 - humidity / 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(device_type: u8, version: u8) -> VirtualController {
        VirtualController::new(
            DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap(),
            "ACI-E 12AB",
            ServiceData {
                name: "ACI-E 12AB".to_string(),
                device_type,
                version,
            },
        )
    }

    #[test]
    fn should_compute_vpd_from_climate() {
        let vpd = vapour_pressure_deficit(24.0, 55.0);
        assert!((vpd - 1.343).abs() < 0.01, "vpd was {vpd}");
    }

    #[test]
    fn should_have_no_state_before_first_update() {
        let controller = controller(11, 3);
        assert!(matches!(
            controller.state(),
            Err(DeviceError::StateNotYetAvailable)
        ));
    }

    #[tokio::test]
    async fn should_report_service_data_in_snapshot() {
        let controller = controller(11, 3);

        controller.update().await.unwrap();

        let state = controller.state().unwrap();
        assert_eq!(state.device_type, 11);
        assert_eq!(state.version, 3);
        assert_eq!(state.fan, DEFAULT_SPEED);
        assert!(state.is_on);
        assert!(state.vpd > 0.0);
        assert!(controller.is_connected());
    }

    #[tokio::test]
    async fn should_notify_listeners_on_update() {
        let controller = controller(1, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = controller.register_callback(move |state| {
            sink.lock().unwrap().push(state.temperature);
        });

        controller.update().await.unwrap();
        controller.update().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![24.0, 24.1]);
    }

    #[tokio::test]
    async fn should_fail_injected_updates_then_recover() {
        let controller = controller(1, 1);
        controller.fail_next_updates(2);

        assert!(matches!(
            controller.update().await,
            Err(DeviceError::Transport(_))
        ));
        assert!(controller.update().await.is_err());
        controller.update().await.unwrap();

        assert!(controller.state().is_ok());
    }

    #[tokio::test]
    async fn should_stay_without_state_while_silent() {
        let controller = controller(1, 1);
        controller.set_silent(true);

        controller.update().await.unwrap();

        assert!(controller.state().is_err());
        assert_eq!(controller.ticks(), 0);
    }

    #[tokio::test]
    async fn should_reject_commands_before_first_update() {
        let controller = controller(1, 1);
        assert!(matches!(
            controller.set_speed(3).await,
            Err(DeviceError::StateNotYetAvailable)
        ));
    }

    #[tokio::test]
    async fn should_apply_fan_commands() {
        let controller = controller(1, 1);
        controller.update().await.unwrap();

        controller.set_speed(8).await.unwrap();
        assert_eq!(controller.state().unwrap().fan, 8);

        controller.turn_off().await.unwrap();
        let state = controller.state().unwrap();
        assert!(!state.is_on);
        assert_eq!(state.fan, 0);

        controller.turn_on(None).await.unwrap();
        let state = controller.state().unwrap();
        assert!(state.is_on);
        assert_eq!(state.fan, 8);

        controller.set_speed(0).await.unwrap();
        assert!(!controller.state().unwrap().is_on);

        controller.turn_on(Some(12)).await.unwrap();
        assert_eq!(controller.state().unwrap().fan, 10);
    }

    #[tokio::test]
    async fn should_keep_commanded_speed_across_updates() {
        let controller = controller(1, 1);
        controller.update().await.unwrap();
        controller.set_speed(2).await.unwrap();

        controller.update().await.unwrap();

        assert_eq!(controller.state().unwrap().fan, 2);
    }

    #[tokio::test]
    async fn should_disconnect_and_report_injected_failure() {
        let controller = controller(1, 1);
        controller.update().await.unwrap();
        controller.stop().await.unwrap();
        assert!(!controller.is_connected());

        controller.set_disconnect_failure(true);
        assert!(controller.stop().await.is_err());
    }

    #[test]
    fn should_name_controller_from_service_data_or_advertisement() {
        let address = DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let resolved = ResolvedDevice {
            address: address.clone(),
            local_name: Some("ACI-E 99FF".to_string()),
            rssi: None,
        };

        let named = VirtualControllerFactory
            .create(
                resolved.clone(),
                &ServiceData {
                    name: "Tent controller".to_string(),
                    device_type: 7,
                    version: 3,
                },
            )
            .unwrap();
        assert_eq!(named.name(), "Tent controller");

        let advertised = VirtualControllerFactory
            .create(resolved, &ServiceData::default())
            .unwrap();
        assert_eq!(advertised.name(), "ACI-E 99FF");

        let anonymous = VirtualControllerFactory
            .create(
                ResolvedDevice {
                    address,
                    local_name: None,
                    rssi: None,
                },
                &ServiceData::default(),
            )
            .unwrap();
        assert_eq!(anonymous.name(), "AC Infinity AA:BB:CC:DD:EE:FF");
    }
}
