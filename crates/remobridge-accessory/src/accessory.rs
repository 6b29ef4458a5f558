//! The [`Accessory`] capability set and its building blocks.
//!
//! Adapters compose [`Service`]s out of [`Characteristic`]s and expose them
//! through the [`Accessory`] trait; the registry and the protocol server only
//! ever talk to the trait.

use std::sync::Arc;

use remobridge_types::{CharacteristicKind, DeviceCore};
use serde::Serialize;

use crate::characteristic::Characteristic;

/// Manufacturer reported for the remote hubs themselves.
pub const HUB_MANUFACTURER: &str = "Nature Inc.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryCategory {
    Bridge,
    Sensor,
    Fan,
    AirConditioner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    TemperatureSensor,
    HumiditySensor,
    LightSensor,
    MotionSensor,
    Fan,
    HeaterCooler,
}

/// Identification block every accessory carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl AccessoryInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Info describing a remote hub: model is the hub's name.
    pub fn for_hub(name: impl Into<String>, hub: &DeviceCore) -> Self {
        Self {
            name: name.into(),
            manufacturer: HUB_MANUFACTURER.to_string(),
            model: hub.name.clone(),
            serial_number: hub.serial_number.clone(),
            firmware_revision: hub.firmware_version.clone(),
        }
    }
}

/// A group of related characteristics.
#[derive(Debug)]
pub struct Service {
    kind: ServiceKind,
    characteristics: Vec<Arc<Characteristic>>,
}

impl Service {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(Arc::new(characteristic));
        self
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn characteristics(&self) -> &[Arc<Characteristic>] {
        &self.characteristics
    }

    pub fn characteristic(&self, kind: CharacteristicKind) -> Option<&Arc<Characteristic>> {
        self.characteristics.iter().find(|c| c.kind() == kind)
    }
}

/// Something exposed to protocol clients as one accessory.
pub trait Accessory: Send + Sync {
    fn info(&self) -> &AccessoryInfo;

    fn category(&self) -> AccessoryCategory;

    fn services(&self) -> &[Service];

    /// First characteristic of `kind` across all services.
    fn characteristic(&self, kind: CharacteristicKind) -> Option<&Arc<Characteristic>> {
        self.services().iter().find_map(|s| s.characteristic(kind))
    }
}
