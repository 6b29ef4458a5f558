//! `remobridge-accessory` – remote appliances as protocol accessories.
//!
//! # Modules
//!
//! - [`characteristic`] – [`Characteristic`] with the [`Readable`] /
//!   [`Writable`] capability traits and protocol status codes.
//! - [`accessory`] – the [`Accessory`] trait, [`Service`] and
//!   [`AccessoryInfo`].
//! - [`mapper`] – capability mapping: temperature ranges, fan signal
//!   classification, air-conditioner state sets.
//! - [`sensor`], [`fan`], [`air_conditioner`] – the three accessory adapters.
//! - [`registry`] – [`AccessoryRegistry`]: aid/iid addressing and routing.
//! - [`bridge`] – startup discovery.

pub mod accessory;
pub mod air_conditioner;
pub mod bridge;
pub mod characteristic;
pub mod fan;
pub mod mapper;
pub mod registry;
pub mod sensor;

pub use accessory::{Accessory, AccessoryCategory, AccessoryInfo, Service, ServiceKind};
pub use air_conditioner::AirConditionerAccessory;
pub use bridge::{BridgeContext, discover};
pub use characteristic::{Characteristic, ReadResponse, Readable, Writable, status_for};
pub use fan::FanAccessory;
pub use mapper::{AirConSchema, SignalIndex, range_to_min_max_step};
pub use registry::{AccessoryDescription, AccessoryRegistry, BRIDGE_AID};
pub use sensor::SensorAccessory;
