//! Push-subscription registry for device state snapshots.
//!
//! Device handles embed a [`StateListeners`] and call
//! [`notify`](StateListeners::notify) once a fresh snapshot has fully
//! replaced the previous one. Every callback of one notification receives
//! the same `Arc`, so subscribers never observe different values for the
//! same update.
//!
//! Registrations are tied to a [`Subscription`] guard: cancelling or
//! dropping the guard removes the callback. One-shot registrations detach
//! themselves before they run.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use acinfinity_domain::device::DeviceState;

type Callback = Arc<dyn Fn(&Arc<DeviceState>) + Send + Sync>;
type OnceCallback = Box<dyn FnOnce(&Arc<DeviceState>) + Send>;

enum Listener {
    Persistent(Callback),
    Once(OnceCallback),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Callbacks interested in state snapshots of one device.
#[derive(Clone, Default)]
pub struct StateListeners {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for StateListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateListeners")
            .field("len", &self.len())
            .finish()
    }
}

impl StateListeners {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback fired on every snapshot until the returned
    /// [`Subscription`] is cancelled or dropped.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DeviceState>) + Send + Sync + 'static,
    {
        self.insert(Listener::Persistent(Arc::new(callback)))
    }

    /// Register a callback fired on the next snapshot only.
    ///
    /// The entry is removed from the registry before the callback runs, so
    /// later snapshots never reach it.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn register_once<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce(&Arc<DeviceState>) + Send + 'static,
    {
        self.insert(Listener::Once(Box::new(callback)))
    }

    /// Deliver a snapshot to every registered callback.
    ///
    /// Callbacks run outside the registry lock, so they may register or
    /// cancel subscriptions themselves.
    pub fn notify(&self, state: &Arc<DeviceState>) {
        let mut persistent = Vec::new();
        let mut once = Vec::new();
        {
            let mut registry = self.lock();
            let fired: Vec<u64> = registry
                .entries
                .iter()
                .filter(|(_, listener)| matches!(listener, Listener::Once(_)))
                .map(|(id, _)| *id)
                .collect();
            for listener in registry.entries.values() {
                if let Listener::Persistent(callback) = listener {
                    persistent.push(Arc::clone(callback));
                }
            }
            for id in fired {
                if let Some(Listener::Once(callback)) = registry.entries.remove(&id) {
                    once.push(callback);
                }
            }
        }

        for callback in persistent {
            callback(state);
        }
        for callback in once {
            callback(state);
        }
    }

    /// Number of active registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, listener: Listener) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(id, listener);
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for one registration in a [`StateListeners`] registry.
///
/// Dropping the guard unregisters the callback.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Unregister the callback now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}
