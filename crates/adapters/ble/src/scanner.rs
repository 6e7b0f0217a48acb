//! BLE scanner — finds one controller and follows its advertisements.
//!
//! Both operations drive the host adapter's event stream under a deadline
//! or until the consumer goes away; neither connects to the device. Each
//! holds a scan lease for as long as it listens.

use std::collections::BTreeMap;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;

use acinfinity_app::ports::{Advertisement, ResolvedDevice};
use acinfinity_domain::address::DeviceAddress;

use crate::error::BleError;
use crate::lease::ScanLeases;

/// How often a follower checks whether its consumer is still listening
/// while the radio is quiet.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Open the host adapter at `index`.
///
/// # Errors
///
/// Returns [`BleError::NotAvailable`] when the host has no such adapter.
pub(crate) async fn open_central(index: usize) -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().nth(index).ok_or(BleError::NotAvailable)
}

/// Build an [`Advertisement`] from peripheral properties.
pub(crate) fn advertisement_from(props: &PeripheralProperties) -> Result<Advertisement, BleError> {
    let address =
        DeviceAddress::parse(&props.address.to_string()).map_err(BleError::InvalidAddress)?;
    Ok(Advertisement {
        device: ResolvedDevice {
            address,
            local_name: props.local_name.clone(),
            rssi: props.rssi,
        },
        manufacturer_data: props
            .manufacturer_data
            .iter()
            .map(|(company, payload)| (*company, payload.clone()))
            .collect::<BTreeMap<_, _>>(),
    })
}

async fn advertisement_of(
    central: &Adapter,
    id: &PeripheralId,
    address: &DeviceAddress,
) -> Result<Option<Advertisement>, BleError> {
    let peripheral = central.peripheral(id).await?;
    let Some(props) = peripheral.properties().await? else {
        return Ok(None);
    };
    let advertisement = advertisement_from(&props)?;
    Ok((advertisement.device.address == *address).then_some(advertisement))
}

fn peripheral_id(event: &CentralEvent) -> Option<&PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// Look for `address` among known peripherals, then scan for it until
/// `scan_duration` elapses.
///
/// # Errors
///
/// Returns [`BleError`] when the scan cannot be started.
pub(crate) async fn find_device(
    leases: &ScanLeases<Adapter>,
    address: &DeviceAddress,
    scan_duration: Duration,
) -> Result<Option<ResolvedDevice>, BleError> {
    let central = leases.radio();
    for peripheral in central.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        if let Ok(advertisement) = advertisement_from(&props)
            && advertisement.device.address == *address
        {
            tracing::debug!(%address, "device already known to the adapter");
            return Ok(Some(advertisement.device));
        }
    }

    let mut events = central.events().await?;
    leases.acquire().await?;
    tracing::debug!(%address, duration_secs = scan_duration.as_secs(), "BLE scan started");

    let deadline = tokio::time::Instant::now() + scan_duration;
    let mut found = None;

    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(event)) => {
                let Some(id) = peripheral_id(&event) else {
                    continue;
                };
                match advertisement_of(central, id, address).await {
                    Ok(Some(advertisement)) => {
                        found = Some(advertisement.device);
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::trace!(%err, "skipping unreadable peripheral");
                    }
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    leases.release().await;
    tracing::debug!(%address, found = found.is_some(), "BLE scan finished");
    Ok(found)
}

/// Forward advertisements of `address` into `sender` until the receiver
/// is dropped.
pub(crate) async fn follow(
    leases: ScanLeases<Adapter>,
    address: DeviceAddress,
    sender: mpsc::Sender<Advertisement>,
) {
    let central = leases.radio();
    let events = match central.events().await {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(%err, %address, "advertisement follower could not listen");
            return;
        }
    };
    if let Err(err) = leases.acquire().await {
        tracing::warn!(%err, %address, "advertisement follower could not scan");
        return;
    }
    tracing::debug!(%address, "following advertisements");
    forward(central, events, &address, &sender).await;
    leases.release().await;
}

async fn forward(
    central: &Adapter,
    mut events: impl tokio_stream::Stream<Item = CentralEvent> + Unpin,
    address: &DeviceAddress,
    sender: &mpsc::Sender<Advertisement>,
) {
    while !sender.is_closed() {
        let event = match tokio::time::timeout(IDLE_POLL, events.next()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => continue,
        };
        let Some(id) = peripheral_id(&event) else {
            continue;
        };
        match advertisement_of(central, id, address).await {
            Ok(Some(advertisement)) => {
                if sender.send(advertisement).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => tracing::trace!(%err, "skipping unreadable peripheral"),
        }
    }
}
