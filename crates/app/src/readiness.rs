//! Readiness gate — tells "device found and responding" from "device silent".
//!
//! The gate is a one-way state machine (`Unset → Set`). A one-shot observer
//! registered on the device handle flips it on the first snapshot; setup
//! then waits on it with a deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::listeners::Subscription;
use crate::ports::DeviceHandle;

/// Gate state; `Set` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unset,
    Set,
}

/// The device produced no snapshot before the deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device did not report state within {timeout:?}")]
pub struct NotReady {
    /// How long the caller waited.
    pub timeout: Duration,
}

/// One-shot readiness signal.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    sender: Arc<watch::Sender<GateState>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        let (sender, _) = watch::channel(GateState::Unset);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl ReadinessGate {
    /// Create an unset gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.sender.borrow()
    }

    /// Whether the gate has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state() == GateState::Set
    }

    /// Set the gate. Returns `true` only for the call that performed the
    /// transition.
    pub fn set(&self) -> bool {
        self.sender.send_if_modified(|state| {
            if *state == GateState::Set {
                return false;
            }
            *state = GateState::Set;
            true
        })
    }

    /// Attach a one-shot observer that sets the gate on the handle's next
    /// snapshot.
    ///
    /// Must be called before the first refresh is triggered, otherwise an
    /// early snapshot is missed and [`wait_ready`](Self::wait_ready) runs
    /// into its deadline.
    #[must_use = "dropping the subscription detaches the observer"]
    pub fn observe<H: DeviceHandle + ?Sized>(&self, handle: &H) -> Subscription {
        let gate = self.clone();
        handle.listeners().register_once(move |_| {
            if gate.set() {
                tracing::debug!("readiness gate set by first snapshot");
            }
        })
    }

    /// Wait until the gate is set or `timeout` elapses.
    ///
    /// Returns immediately when the gate is already set.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] when the deadline passes first. This is a
    /// recoverable condition; setup is expected to be retried later.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), NotReady> {
        let mut receiver = self.sender.subscribe();
        match tokio::time::timeout(timeout, receiver.wait_for(|s| *s == GateState::Set)).await {
            Ok(Ok(_)) => Ok(()),
            // the sender lives in `self`, so the channel cannot close here
            Ok(Err(_)) | Err(_) => Err(NotReady { timeout }),
        }
    }
}
