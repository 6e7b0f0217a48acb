//! # acinfinity-domain
//!
//! Pure domain model for exposing an AC Infinity BLE controller as entities.
//!
//! ## Responsibilities
//! - Foundational types: device address, typed identifiers, error conventions, timestamps
//! - Define the **Device State** snapshot cached by a device handle
//! - Define the **model table** and capability rules (VPD support)
//! - Define the **fan speed** ↔ percentage mapping
//! - Define **Entities** (rendered projections: temperature, humidity, VPD, fan)
//! - Define **Events** (state changes, failed updates, availability changes)
//! - Define the **Config Entry** describing one configured controller
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod address;
pub mod error;
pub mod id;
pub mod time;

pub mod config_entry;
pub mod device;
pub mod entity;
pub mod event;
pub mod fan;
pub mod model;
