//! Scripted in-memory device handle shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use acinfinity_domain::address::DeviceAddress;
use acinfinity_domain::device::{DeviceState, ServiceData};
use acinfinity_domain::error::{AcInfinityError, DeviceError};

use crate::listeners::StateListeners;
use crate::ports::{
    Advertisement, BluetoothDiscovery, DeviceHandle, DeviceHandleFactory, ResolvedDevice,
};

/// What the next `update()` call does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Replace the snapshot and notify listeners.
    Report(DeviceState),
    /// Fail with a transport error.
    Fail,
    /// Succeed without producing a snapshot.
    Silent,
    /// Never complete.
    Hang,
    /// Report after a delay.
    Slow(Duration, DeviceState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TurnOn(Option<u8>),
    TurnOff,
    SetSpeed(u8),
}

pub struct FakeDevice {
    address: DeviceAddress,
    name: String,
    state: Mutex<Option<Arc<DeviceState>>>,
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Step>,
    listeners: StateListeners,
    pub update_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub fail_stop: AtomicBool,
    pub stop_delay: Mutex<Option<Duration>>,
    pub simulated: AtomicBool,
    pub commands: Mutex<Vec<Command>>,
    pub advertisements: Mutex<Vec<Advertisement>>,
}

pub fn state(device_type: u8, version: u8) -> DeviceState {
    DeviceState {
        temperature: 24.5,
        humidity: 55.0,
        vpd: 1.38,
        fan: 4,
        is_on: true,
        device_type,
        version,
    }
}

pub fn address() -> DeviceAddress {
    DeviceAddress::parse("AA:BB:CC:DD:EE:FF").unwrap()
}

impl FakeDevice {
    /// A device that reports `state` on every refresh.
    pub fn reporting(state: DeviceState) -> Self {
        Self::with_fallback(Step::Report(state))
    }

    pub fn with_fallback(fallback: Step) -> Self {
        Self {
            address: address(),
            name: "ACI-E 12AB".to_string(),
            state: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            listeners: StateListeners::new(),
            update_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_stop: AtomicBool::new(false),
            stop_delay: Mutex::new(None),
            simulated: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            advertisements: Mutex::new(Vec::new()),
        }
    }

    /// Queue steps consumed before the fallback applies.
    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn set_fallback(&self, step: Step) {
        *self.fallback.lock().unwrap() = step;
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn replace(&self, state: DeviceState) {
        let snapshot = Arc::new(state);
        *self.state.lock().unwrap() = Some(Arc::clone(&snapshot));
        self.listeners.notify(&snapshot);
    }

    fn mutate(&self, apply: impl FnOnce(&mut DeviceState)) {
        let current = self.state.lock().unwrap().clone();
        if let Some(current) = current {
            let mut next = (*current).clone();
            apply(&mut next);
            self.replace(next);
        }
    }
}

impl DeviceHandle for FakeDevice {
    fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Result<Arc<DeviceState>, DeviceError> {
        self.state
            .lock()
            .unwrap()
            .clone()
            .ok_or(DeviceError::StateNotYetAvailable)
    }

    fn listeners(&self) -> &StateListeners {
        &self.listeners
    }

    async fn update(&self) -> Result<(), DeviceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        match step {
            Step::Report(state) => {
                self.replace(state);
                Ok(())
            }
            Step::Fail => Err(DeviceError::transport(std::io::Error::other(
                "characteristic read failed",
            ))),
            Step::Silent => Ok(()),
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Step::Slow(delay, state) => {
                tokio::time::sleep(delay).await;
                self.replace(state);
                Ok(())
            }
        }
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.stop_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DeviceError::transport(std::io::Error::other(
                "disconnect failed",
            )));
        }
        Ok(())
    }

    async fn turn_on(&self, speed: Option<u8>) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push(Command::TurnOn(speed));
        self.mutate(|s| {
            s.is_on = true;
            if let Some(speed) = speed {
                s.fan = speed;
            }
        });
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push(Command::TurnOff);
        self.mutate(|s| s.is_on = false);
        Ok(())
    }

    async fn set_speed(&self, speed: u8) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push(Command::SetSpeed(speed));
        self.mutate(|s| {
            s.fan = speed;
            s.is_on = speed > 0;
        });
        Ok(())
    }

    fn set_advertisement(&self, advertisement: Advertisement) {
        self.advertisements.lock().unwrap().push(advertisement);
    }

    fn is_simulated(&self) -> bool {
        self.simulated.load(Ordering::SeqCst)
    }
}

/// Factory handing out prepared [`FakeDevice`]s in order.
pub struct FakeFactory {
    pub devices: Mutex<VecDeque<FakeDevice>>,
}

impl FakeFactory {
    pub fn new(device: FakeDevice) -> Self {
        Self::with_devices([device])
    }

    pub fn with_devices(devices: impl IntoIterator<Item = FakeDevice>) -> Self {
        Self {
            devices: Mutex::new(devices.into_iter().collect()),
        }
    }
}

impl DeviceHandleFactory for FakeFactory {
    type Handle = FakeDevice;

    fn create(
        &self,
        _device: ResolvedDevice,
        _service_data: &ServiceData,
    ) -> Result<FakeDevice, AcInfinityError> {
        let device = self.devices.lock().unwrap().pop_front();
        Ok(device.unwrap_or_else(|| FakeDevice::with_fallback(Step::Fail)))
    }
}

/// Discovery that knows a fixed set of addresses.
#[derive(Default)]
pub struct FakeDiscovery {
    pub known: Vec<DeviceAddress>,
    pub pending: Mutex<Vec<Advertisement>>,
    pub resolve_calls: Mutex<Vec<DeviceAddress>>,
    /// Transport failure returned by `resolve`.
    pub resolve_failure: Option<&'static str>,
    /// Transport failure returned by `watch`.
    pub watch_failure: Option<&'static str>,
}

impl FakeDiscovery {
    pub fn knowing(address: DeviceAddress) -> Self {
        Self {
            known: vec![address],
            ..Self::default()
        }
    }
}

impl BluetoothDiscovery for FakeDiscovery {
    async fn resolve(
        &self,
        address: &DeviceAddress,
    ) -> Result<Option<ResolvedDevice>, AcInfinityError> {
        self.resolve_calls.lock().unwrap().push(address.clone());
        if let Some(message) = self.resolve_failure {
            return Err(transport_failure(message));
        }
        Ok(self
            .known
            .iter()
            .find(|known| *known == address)
            .map(|known| ResolvedDevice {
                address: known.clone(),
                local_name: Some("ACI-E 12AB".to_string()),
                rssi: Some(-60),
            }))
    }

    async fn watch(
        &self,
        _address: &DeviceAddress,
    ) -> Result<mpsc::Receiver<Advertisement>, AcInfinityError> {
        if let Some(message) = self.watch_failure {
            return Err(transport_failure(message));
        }
        let (tx, rx) = mpsc::channel(8);
        let pending: Vec<Advertisement> = self.pending.lock().unwrap().drain(..).collect();
        for advertisement in pending {
            let _ = tx.try_send(advertisement);
        }
        Ok(rx)
    }
}

fn transport_failure(message: &'static str) -> AcInfinityError {
    DeviceError::transport(std::io::Error::other(message)).into()
}
