//! Polling coordinator — periodic refresh of one device handle.
//!
//! Each tick runs the handle's `update()` under a hard deadline and, by
//! default, releases the connection afterwards. Any failure (transport
//! error, premature state access, timeout) becomes an [`UpdateFailed`]
//! outcome for that tick; the schedule keeps running regardless.
//!
//! The coordinator also tracks availability: after `unavailable_after`
//! consecutive failures the device is reported unavailable, and the next
//! success restores it. Status changes are observable through a
//! [`watch`] channel and published as events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use acinfinity_domain::error::DeviceError;
use acinfinity_domain::event::{Event, EventType};
use acinfinity_domain::time::{Timestamp, age, now};

use crate::ports::{DeviceHandle, EventPublisher};

/// Polling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Time between two scheduled refreshes.
    pub update_interval: Duration,
    /// Hard deadline of a single refresh.
    pub refresh_timeout: Duration,
    /// Consecutive failures after which the device is unavailable.
    pub unavailable_after: u32,
    /// Disconnect after every successful refresh.
    pub disconnect_after_update: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(15),
            refresh_timeout: Duration::from_secs(10),
            unavailable_after: 1,
            disconnect_after_update: true,
        }
    }
}

/// A refresh that did not succeed.
#[derive(Debug, thiserror::Error)]
#[error("update failed: {source}")]
pub struct UpdateFailed {
    #[from]
    pub source: DeviceError,
}

impl UpdateFailed {
    /// Human-readable description of the failure.
    #[must_use]
    pub fn description(&self) -> String {
        self.source.to_string()
    }
}

/// Outcome tracking across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub last_update_success: bool,
    pub consecutive_failures: u32,
    pub available: bool,
    pub last_error: Option<String>,
    pub last_tick: Option<Timestamp>,
    /// When the last successful refresh completed.
    pub last_success: Option<Timestamp>,
    pub ticks: u64,
}

impl Default for CoordinatorStatus {
    fn default() -> Self {
        Self {
            last_update_success: true,
            consecutive_failures: 0,
            available: true,
            last_error: None,
            last_tick: None,
            last_success: None,
            ticks: 0,
        }
    }
}

struct Inner<H, P> {
    name: String,
    handle: Arc<H>,
    publisher: P,
    config: CoordinatorConfig,
    status: watch::Sender<CoordinatorStatus>,
}

/// Drives periodic refreshes of a single [`DeviceHandle`].
pub struct PollingCoordinator<H, P> {
    inner: Arc<Inner<H, P>>,
}

impl<H, P> Clone for PollingCoordinator<H, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, P> PollingCoordinator<H, P>
where
    H: DeviceHandle,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create a coordinator for `handle`. Nothing runs until
    /// [`start`](Self::start) or [`refresh`](Self::refresh) is called.
    pub fn new(
        name: impl Into<String>,
        handle: Arc<H>,
        publisher: P,
        config: CoordinatorConfig,
    ) -> Self {
        let (status, _) = watch::channel(CoordinatorStatus::default());
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                handle,
                publisher,
                config,
                status,
            }),
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status.borrow().clone()
    }

    /// Follow status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.inner.status.subscribe()
    }

    /// Run a single refresh and record its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateFailed`] when the refresh, or the disconnect that
    /// follows it, fails or misses its deadline.
    pub async fn refresh(&self) -> Result<(), UpdateFailed> {
        let result = self.run_refresh().await.map_err(UpdateFailed::from);
        self.record(&result).await;
        result
    }

    /// The refresh run during setup, before the timer starts.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh); setup treats a failure as
    /// "not ready".
    pub async fn first_refresh(&self) -> Result<(), UpdateFailed> {
        tracing::debug!(name = %self.inner.name, "running first refresh");
        self.refresh().await
    }

    /// Update, then disconnect when configured, all within one deadline so
    /// a tick never outlasts `refresh_timeout`.
    async fn run_refresh(&self) -> Result<(), DeviceError> {
        let deadline = self.inner.config.refresh_timeout;
        let handle = &self.inner.handle;
        let disconnect = self.inner.config.disconnect_after_update;

        let exchange = async {
            handle.update().await?;
            if disconnect {
                handle.stop().await?;
            }
            Ok(())
        };
        tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| DeviceError::Timeout(deadline))?
    }

    async fn record(&self, result: &Result<(), UpdateFailed>) {
        let threshold = self.inner.config.unavailable_after.max(1);
        let mut transition = None;
        let mut last_success = None;

        self.inner.status.send_modify(|status| {
            let was_available = status.available;
            let tick = now();
            status.ticks += 1;
            status.last_tick = Some(tick);
            match result {
                Ok(()) => {
                    status.last_success = Some(tick);
                    status.last_update_success = true;
                    status.consecutive_failures = 0;
                    status.last_error = None;
                    status.available = true;
                }
                Err(err) => {
                    status.last_update_success = false;
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    status.last_error = Some(err.description());
                    if status.consecutive_failures >= threshold {
                        status.available = false;
                    }
                }
            }
            if status.available != was_available {
                transition = Some(status.available);
            }
            last_success = status.last_success;
        });

        if let Err(err) = result {
            let event = Event::new(
                EventType::UpdateFailed,
                None,
                serde_json::json!({
                    "coordinator": self.inner.name,
                    "address": self.inner.handle.address().as_str(),
                    "error": err.description(),
                    "stale_secs": last_success.map(|at| age(at).as_secs()),
                }),
            );
            self.publish(event).await;
        }

        if let Some(available) = transition {
            if available {
                tracing::info!(name = %self.inner.name, "device is available again");
            } else {
                tracing::warn!(name = %self.inner.name, "device is unavailable");
            }
            let event = Event::new(
                EventType::AvailabilityChanged,
                None,
                serde_json::json!({
                    "coordinator": self.inner.name,
                    "address": self.inner.handle.address().as_str(),
                    "available": available,
                }),
            );
            self.publish(event).await;
        }
    }

    async fn publish(&self, event: Event) {
        if let Err(err) = self.inner.publisher.publish(event).await {
            tracing::warn!(%err, name = %self.inner.name, "failed to publish coordinator event");
        }
    }

    /// Spawn the repeating refresh timer.
    ///
    /// The first scheduled tick happens one interval from now; the initial
    /// refresh is expected to have been run through
    /// [`refresh`](Self::refresh) during setup. Call once per integration
    /// lifetime and keep the returned task until teardown.
    #[must_use = "dropping the task stops the timer"]
    pub fn start(&self) -> CoordinatorTask<H> {
        let coordinator = self.clone();
        let interval = self.inner.config.update_interval;

        tracing::debug!(
            name = %self.inner.name,
            interval_secs = interval.as_secs(),
            "polling coordinator started"
        );

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = coordinator.refresh().await {
                    tracing::warn!(
                        %err,
                        name = %coordinator.inner.name,
                        "scheduled refresh failed, retrying next interval"
                    );
                }
            }
        });

        CoordinatorTask {
            join: Some(join),
            handle: Arc::clone(&self.inner.handle),
        }
    }
}

/// Cancellation handle of a running coordinator timer.
pub struct CoordinatorTask<H: DeviceHandle> {
    join: Option<JoinHandle<()>>,
    handle: Arc<H>,
}

impl<H: DeviceHandle> CoordinatorTask<H> {
    /// Whether the timer task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Stop the timer and release the device transport.
    ///
    /// Disconnect errors are logged and swallowed.
    pub async fn cancel(mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
        if let Err(err) = self.handle.stop().await {
            tracing::debug!(%err, "ignoring disconnect error during teardown");
        }
    }
}

impl<H: DeviceHandle> Drop for CoordinatorTask<H> {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
