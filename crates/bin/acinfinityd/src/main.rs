//! # acinfinityd — AC Infinity controller daemon
//!
//! Composition root that wires discovery, device handles and the
//! integration lifecycle together for one configured controller.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialise logging
//! - Pick the discovery adapter (host BLE stack or static demo discovery)
//! - Set the controller up, retrying while it is not ready
//! - Log every published event
//! - Reload on SIGHUP when the title changed, disconnect on SIGINT
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use acinfinity_adapter_ble::BleDiscovery;
use acinfinity_adapter_virtual::{StaticDiscovery, VirtualControllerFactory};
use acinfinity_app::event_bus::InProcessEventBus;
use acinfinity_app::ports::{BluetoothDiscovery, DeviceHandleFactory};
use acinfinity_app::services::{AcInfinityIntegration, IntegrationInstance};
use acinfinity_domain::config_entry::ConfigEntry;
use acinfinity_domain::event::Event;

use crate::config::Config;

type EventBus = Arc<InProcessEventBus>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let entry = config.entry()?;
    let event_bus: EventBus = Arc::new(InProcessEventBus::new(256));
    tokio::spawn(log_events(event_bus.subscribe()));

    let retry_delay = config.update_interval();
    let factory = VirtualControllerFactory;

    if config.ble.enabled {
        let discovery = BleDiscovery::new(&config.ble_config()).await?;
        tracing::warn!(
            address = %entry.address,
            "discovery uses the BLE adapter but readings and fan commands are simulated; \
             entities carry simulated=true"
        );
        let integration =
            AcInfinityIntegration::new(discovery, factory, event_bus, config.setup_options());
        run(&integration, entry, retry_delay).await
    } else {
        tracing::info!(address = %entry.address, "BLE disabled, running in demo mode");
        let discovery = StaticDiscovery::new()
            .with_device(entry.address.clone(), entry.service_data.name.clone());
        let integration =
            AcInfinityIntegration::new(discovery, factory, event_bus, config.setup_options());
        run(&integration, entry, retry_delay).await
    }
}

async fn run<D, F>(
    integration: &AcInfinityIntegration<D, F, EventBus>,
    mut entry: ConfigEntry,
    retry_delay: Duration,
) -> anyhow::Result<()>
where
    D: BluetoothDiscovery,
    F: DeviceHandleFactory,
{
    let mut reload = ReloadSignal::new()?;

    'setup: loop {
        let Some(mut instance) = setup_until_ready(integration, &entry, retry_delay).await? else {
            return Ok(());
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    instance.shutdown().await;
                    instance.unload().await;
                    return Ok(());
                }
                () = reload.recv() => {
                    let next = match Config::load().and_then(|config| config.entry()) {
                        Ok(next) => next,
                        Err(err) => {
                            tracing::warn!(%err, "ignoring reload, configuration is invalid");
                            continue;
                        }
                    };
                    entry = next.clone();
                    match integration.options_updated(instance, next).await {
                        Ok((next_instance, reloaded)) => {
                            tracing::info!(reloaded, "configuration reloaded");
                            instance = next_instance;
                        }
                        Err(err) => {
                            tracing::warn!(%err, "reload failed, setting up again");
                            continue 'setup;
                        }
                    }
                }
            }
        }
    }
}

/// Set the controller up, retrying every `retry_delay` while it is not
/// ready. Returns `None` when interrupted.
async fn setup_until_ready<D, F>(
    integration: &AcInfinityIntegration<D, F, EventBus>,
    entry: &ConfigEntry,
    retry_delay: Duration,
) -> anyhow::Result<Option<IntegrationInstance<F::Handle, EventBus>>>
where
    D: BluetoothDiscovery,
    F: DeviceHandleFactory,
{
    loop {
        match integration.setup(entry.clone()).await {
            Ok(instance) => {
                for entity in instance.entities() {
                    tracing::info!(
                        unique_id = %entity.unique_id,
                        name = %entity.name,
                        state = %entity.state,
                        "entity ready"
                    );
                }
                return Ok(Some(instance));
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    %err,
                    retry_secs = retry_delay.as_secs(),
                    "controller not ready, retrying"
                );
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return Ok(None),
                    () = tokio::time::sleep(retry_delay) => {}
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::info!(
                    event_type = %event.event_type,
                    unique_id = event.unique_id.as_deref().unwrap_or("-"),
                    data = %event.data,
                    "event"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// SIGHUP listener; never fires on platforms without it.
struct ReloadSignal {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                inner: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.inner.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
