//! Integration lifecycle — setup, unload, options update and shutdown of
//! one configured controller.
//!
//! [`AcInfinityIntegration`] holds the ports and runs setup;
//! every successful setup yields an [`IntegrationInstance`], the
//! per-entry context owning the handle, the coordinator timer, the entity
//! subscriptions and the background forwarding tasks.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use acinfinity_domain::config_entry::ConfigEntry;
use acinfinity_domain::entity::Entity;
use acinfinity_domain::error::{AcInfinityError, NotFoundError};
use acinfinity_domain::event::{Event, EventType};

use crate::coordinator::{CoordinatorConfig, CoordinatorStatus, CoordinatorTask, PollingCoordinator};
use crate::entities::{EntityAdapter, build_entities};
use crate::listeners::Subscription;
use crate::ports::{BluetoothDiscovery, DeviceHandle, DeviceHandleFactory, EventPublisher};
use crate::readiness::ReadinessGate;

type StateStore = Arc<RwLock<BTreeMap<String, Entity>>>;

/// Setup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    /// How long setup waits for the first snapshot.
    pub device_timeout: Duration,
    /// Polling parameters of the instance's coordinator.
    pub coordinator: CoordinatorConfig,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            device_timeout: Duration::from_secs(30),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

/// Why a setup attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The device is absent or silent; setup should be retried later.
    #[error("device not ready: {0}")]
    NotReady(String),

    /// A non-retryable failure (bad entry, unknown model, port error).
    #[error(transparent)]
    Domain(#[from] AcInfinityError),
}

impl SetupError {
    /// Whether a later retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

/// Sets up controllers from config entries.
pub struct AcInfinityIntegration<D, F, P> {
    discovery: D,
    factory: F,
    publisher: P,
    options: SetupOptions,
}

impl<D, F, P> AcInfinityIntegration<D, F, P>
where
    D: BluetoothDiscovery,
    F: DeviceHandleFactory,
    P: EventPublisher + Clone + Send + Sync + 'static,
{
    pub fn new(discovery: D, factory: F, publisher: P, options: SetupOptions) -> Self {
        Self {
            discovery,
            factory,
            publisher,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SetupOptions {
        &self.options
    }

    /// Bring a configured controller online.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::NotReady`] when the device cannot be found,
    /// the Bluetooth stack reports a transport failure, the first refresh
    /// fails, or the device stays silent past the device timeout. Returns
    /// [`SetupError::Domain`] for an invalid entry, an unknown model, or a
    /// failing port.
    pub async fn setup(
        &self,
        entry: ConfigEntry,
    ) -> Result<IntegrationInstance<F::Handle, P>, SetupError> {
        entry.validate().map_err(AcInfinityError::from)?;
        let address = entry.address.clone();
        tracing::info!(%address, title = %entry.title, "setting up controller");

        let resolved = self
            .discovery
            .resolve(&address)
            .await
            .map_err(not_ready_on_transport)?;
        let Some(resolved) = resolved else {
            return Err(SetupError::NotReady(format!(
                "Could not find AC Infinity device with address {address}"
            )));
        };
        let handle = Arc::new(self.factory.create(resolved, &entry.service_data)?);

        match self.start_instance(entry, Arc::clone(&handle)).await {
            Ok(instance) => {
                tracing::info!(
                    %address,
                    entities = instance.adapters.len(),
                    "controller ready"
                );
                Ok(instance)
            }
            Err(err) => {
                tracing::warn!(%address, %err, "controller setup failed");
                release(handle.as_ref()).await;
                Err(err)
            }
        }
    }

    /// Apply an updated entry. The instance is reloaded only when the
    /// title changed; the returned flag tells whether that happened.
    ///
    /// # Errors
    ///
    /// Propagates the error of the new setup when a reload fails; the old
    /// instance is already unloaded at that point.
    pub async fn options_updated(
        &self,
        instance: IntegrationInstance<F::Handle, P>,
        entry: ConfigEntry,
    ) -> Result<(IntegrationInstance<F::Handle, P>, bool), SetupError> {
        if instance.title() == entry.title {
            return Ok((instance, false));
        }
        tracing::info!(
            old = instance.title(),
            new = %entry.title,
            "title changed, reloading controller"
        );
        instance.unload().await;
        let instance = self.setup(entry).await?;
        Ok((instance, true))
    }

    async fn start_instance(
        &self,
        entry: ConfigEntry,
        handle: Arc<F::Handle>,
    ) -> Result<IntegrationInstance<F::Handle, P>, SetupError> {
        let advertisements = self
            .forward_advertisements(&handle)
            .await
            .map_err(not_ready_on_transport)?;
        let coordinator = PollingCoordinator::new(
            handle.name(),
            Arc::clone(&handle),
            self.publisher.clone(),
            self.options.coordinator.clone(),
        );

        self.wait_until_ready(handle.as_ref(), &coordinator).await?;

        let adapters: Vec<Arc<EntityAdapter<F::Handle>>> = build_entities(&entry, &handle)?
            .into_iter()
            .map(Arc::new)
            .collect();

        let states = StateStore::default();
        let available = coordinator.status().available;
        for adapter in &adapters {
            let entity = adapter.current(available)?;
            publish_state(&self.publisher, &entity).await;
            store(&states, entity);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriptions = adapters
            .iter()
            .map(|adapter| {
                subscribe_adapter(
                    handle.as_ref(),
                    Arc::clone(adapter),
                    sender.clone(),
                    coordinator.subscribe_status(),
                )
            })
            .collect();
        let background = vec![
            advertisements,
            BackgroundTask::spawn(forward_states(
                receiver,
                Arc::clone(&states),
                self.publisher.clone(),
            )),
            BackgroundTask::spawn(watch_availability(
                coordinator.subscribe_status(),
                adapters.clone(),
                sender,
            )),
        ];
        let task = coordinator.start();

        Ok(IntegrationInstance {
            entry,
            handle,
            coordinator,
            task,
            adapters,
            states,
            subscriptions,
            background,
        })
    }

    async fn forward_advertisements(
        &self,
        handle: &Arc<F::Handle>,
    ) -> Result<BackgroundTask, AcInfinityError> {
        let mut receiver = self.discovery.watch(handle.address()).await?;
        let handle = Arc::clone(handle);
        Ok(BackgroundTask::spawn(async move {
            while let Some(advertisement) = receiver.recv().await {
                handle.set_advertisement(advertisement);
            }
        }))
    }

    async fn wait_until_ready(
        &self,
        handle: &F::Handle,
        coordinator: &PollingCoordinator<F::Handle, P>,
    ) -> Result<(), SetupError> {
        let gate = ReadinessGate::new();
        let observer = gate.observe(handle);

        if let Err(err) = coordinator.first_refresh().await {
            observer.cancel();
            return Err(SetupError::NotReady(err.description()));
        }

        let ready = gate.wait_ready(self.options.device_timeout).await;
        observer.cancel();
        ready.map_err(|_| {
            SetupError::NotReady(format!(
                "Unable to communicate with the device; Try moving the Bluetooth adapter closer to {}",
                handle.name()
            ))
        })
    }
}

/// A running controller.
pub struct IntegrationInstance<H: DeviceHandle, P> {
    entry: ConfigEntry,
    handle: Arc<H>,
    coordinator: PollingCoordinator<H, P>,
    task: CoordinatorTask<H>,
    adapters: Vec<Arc<EntityAdapter<H>>>,
    states: StateStore,
    subscriptions: Vec<Subscription>,
    background: Vec<BackgroundTask>,
}

impl<H, P> IntegrationInstance<H, P>
where
    H: DeviceHandle,
    P: EventPublisher + Send + Sync + 'static,
{
    #[must_use]
    pub fn title(&self) -> &str {
        &self.entry.title
    }

    #[must_use]
    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<H> {
        &self.handle
    }

    #[must_use]
    pub fn coordinator(&self) -> &PollingCoordinator<H, P> {
        &self.coordinator
    }

    /// Last published state of every entity, in display order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        self.adapters
            .iter()
            .filter_map(|adapter| states.get(adapter.unique_id()).cloned())
            .collect()
    }

    /// Last published state of one entity.
    #[must_use]
    pub fn entity(&self, unique_id: &str) -> Option<Entity> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unique_id)
            .cloned()
    }

    /// Run a service call against one of this instance's entities and
    /// return its state afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AcInfinityError::NotFound`] for an unknown unique id, or
    /// the adapter's error.
    pub async fn handle_service_call(
        &self,
        unique_id: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<Entity, AcInfinityError> {
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.unique_id() == unique_id)
            .ok_or_else(|| NotFoundError {
                entity: "Entity",
                id: unique_id.to_string(),
            })?;
        tracing::debug!(unique_id, service, "handling service call");
        adapter.handle_service(service, &data).await?;
        adapter.current(self.coordinator.status().available)
    }

    /// Tear the instance down: stop polling, detach entities, stop
    /// advertisement forwarding and disconnect. Disconnect errors are
    /// swallowed.
    pub async fn unload(self) {
        let Self {
            entry,
            task,
            subscriptions,
            background,
            ..
        } = self;
        tracing::info!(address = %entry.address, "unloading controller");
        task.cancel().await;
        drop(subscriptions);
        drop(background);
    }

    /// Host shutdown hook: disconnect, ignoring errors.
    pub async fn shutdown(&self) {
        tracing::debug!(address = %self.entry.address, "disconnecting on shutdown");
        release(self.handle.as_ref()).await;
    }
}

/// Spawned task aborted when dropped.
struct BackgroundTask(JoinHandle<()>);

impl BackgroundTask {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn subscribe_adapter<H: DeviceHandle>(
    handle: &H,
    adapter: Arc<EntityAdapter<H>>,
    sender: mpsc::UnboundedSender<Entity>,
    status: watch::Receiver<CoordinatorStatus>,
) -> Subscription {
    handle.register_callback(move |snapshot| {
        let available = status.borrow().available;
        match adapter.render(Some(snapshot.as_ref()), available) {
            Ok(entity) => {
                if sender.send(entity).is_err() {
                    tracing::debug!(unique_id = adapter.unique_id(), "state forwarder is gone");
                }
            }
            Err(err) => {
                tracing::warn!(%err, unique_id = adapter.unique_id(), "failed to render entity");
            }
        }
    })
}

async fn forward_states<P: EventPublisher>(
    mut receiver: mpsc::UnboundedReceiver<Entity>,
    states: StateStore,
    publisher: P,
) {
    while let Some(entity) = receiver.recv().await {
        publish_state(&publisher, &entity).await;
        store(&states, entity);
    }
}

async fn watch_availability<H: DeviceHandle>(
    mut status: watch::Receiver<CoordinatorStatus>,
    adapters: Vec<Arc<EntityAdapter<H>>>,
    sender: mpsc::UnboundedSender<Entity>,
) {
    let mut available = status.borrow_and_update().available;
    while status.changed().await.is_ok() {
        let next = status.borrow_and_update().available;
        if next == available {
            continue;
        }
        available = next;
        for adapter in &adapters {
            match adapter.current(available) {
                Ok(entity) => {
                    if sender.send(entity).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, unique_id = adapter.unique_id(), "failed to render entity");
                }
            }
        }
    }
}

async fn publish_state<P: EventPublisher>(publisher: &P, entity: &Entity) {
    let event = Event::new(
        EventType::StateChanged,
        Some(entity.unique_id.clone()),
        serde_json::json!({
            "name": entity.name,
            "state": entity.state.to_string(),
            "attributes": entity.attributes,
        }),
    );
    if let Err(err) = publisher.publish(event).await {
        tracing::warn!(%err, unique_id = %entity.unique_id, "failed to publish state change");
    }
}

fn store(states: &StateStore, entity: Entity) {
    states
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(entity.unique_id.clone(), entity);
}

/// Bluetooth stack transport failures are transient; anything else is not.
fn not_ready_on_transport(err: AcInfinityError) -> SetupError {
    match err {
        AcInfinityError::Device(err) => SetupError::NotReady(err.to_string()),
        other => SetupError::Domain(other),
    }
}

async fn release<H: DeviceHandle>(handle: &H) {
    if let Err(err) = handle.stop().await {
        tracing::debug!(%err, address = %handle.address(), "ignoring disconnect error");
    }
}
