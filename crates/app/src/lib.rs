//! # acinfinity-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `DeviceHandle` / `DeviceHandleFactory` — transport to one controller
//!   - `BluetoothDiscovery` — resolve addresses, stream advertisements
//!   - `EventPublisher` — fan-out of domain events
//! - Run the **polling lifecycle**: readiness gate, polling coordinator
//! - Project device snapshots onto entities and route service calls
//! - Provide **in-process infrastructure** (listener registry, event bus)
//!   that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `acinfinity-domain` only (plus `tokio` for channels, timers
//! and tasks). Never imports adapter crates. Adapters depend on *this*
//! crate, not the reverse.

pub mod coordinator;
pub mod entities;
pub mod event_bus;
pub mod listeners;
pub mod ports;
pub mod readiness;
pub mod services;

#[cfg(test)]
mod test_support;
