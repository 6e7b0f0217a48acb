//! # acinfinity-adapter-virtual
//!
//! Virtual/demo adapter that stands in for real hardware.
//!
//! ## Provided pieces
//!
//! | Type | Port | Behaviour |
//! |------|------|-----------|
//! | [`VirtualController`] | `DeviceHandle` | Drifting climate readings, fan commands, fault injection |
//! | [`VirtualControllerFactory`] | `DeviceHandleFactory` | Seeds a controller from the entry's service data |
//! | [`StaticDiscovery`] | `BluetoothDiscovery` | Fixed device set, manual advertisements |
//!
//! ## Dependency rule
//!
//! Depends on `acinfinity-app` (port traits) and `acinfinity-domain` only.

mod controller;
mod discovery;

pub use controller::{VirtualController, VirtualControllerFactory, VirtualError};
pub use discovery::StaticDiscovery;
