//! [`SensorAccessory`] – the environment sensors built into a remote hub.
//!
//! One accessory per hub that reports at least one reading.  Every read
//! re-resolves the hub by name against the shared snapshot cache, so a hub
//! that disappears from the account reads as unavailable instead of serving
//! a frozen value.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remobridge_remote::{Clock, RemoteSnapshotCache};
use remobridge_types::{
    BridgeError, CharacteristicKind, CharacteristicSchema, NumericRange, RemoteDevice,
    SensorKind, SensorReading, Value,
};
use tracing::debug;

use crate::accessory::{Accessory, AccessoryCategory, AccessoryInfo, Service, ServiceKind};
use crate::characteristic::{Characteristic, Readable};

/// A positive motion reading older than this counts as "no motion".
pub const MOTION_RECENCY: chrono::Duration = chrono::Duration::minutes(5);

const SENSOR_KINDS: [SensorKind; 4] = [
    SensorKind::Temperature,
    SensorKind::Humidity,
    SensorKind::Illumination,
    SensorKind::Movement,
];

/// Whether `reading` signals motion at `now`.
///
/// The hub keeps reporting its last motion value, so only recent positive
/// readings count.
pub fn motion_detected(reading: &SensorReading, now: DateTime<Utc>) -> bool {
    reading.value > 0.0 && now.signed_duration_since(reading.created_at) < MOTION_RECENCY
}

fn schema_for(kind: SensorKind, reading: &SensorReading, now: DateTime<Utc>) -> CharacteristicSchema {
    match kind {
        SensorKind::Temperature => CharacteristicSchema::new(
            CharacteristicKind::CurrentTemperature,
            Value::Float(reading.value),
        )
        .with_range(NumericRange {
            min: -270.0,
            max: 100.0,
            step: 0.1,
        }),
        SensorKind::Humidity => CharacteristicSchema::new(
            CharacteristicKind::CurrentRelativeHumidity,
            Value::Float(reading.value),
        )
        .with_range(NumericRange {
            min: 0.0,
            max: 100.0,
            step: 1.0,
        }),
        SensorKind::Illumination => CharacteristicSchema::new(
            CharacteristicKind::CurrentAmbientLightLevel,
            Value::Float(reading.value),
        )
        .with_range(NumericRange {
            min: 0.0,
            max: 200.0,
            step: 1.0,
        }),
        SensorKind::Movement => CharacteristicSchema::new(
            CharacteristicKind::MotionDetected,
            Value::Bool(motion_detected(reading, now)),
        ),
    }
}

fn service_kind(kind: SensorKind) -> ServiceKind {
    match kind {
        SensorKind::Temperature => ServiceKind::TemperatureSensor,
        SensorKind::Humidity => ServiceKind::HumiditySensor,
        SensorKind::Illumination => ServiceKind::LightSensor,
        SensorKind::Movement => ServiceKind::MotionSensor,
    }
}

/// Reads one sensor kind of one hub from the snapshot cache.
struct SensorReader {
    cache: Arc<RemoteSnapshotCache>,
    clock: Arc<dyn Clock>,
    device_name: String,
    kind: SensorKind,
}

#[async_trait]
impl Readable for SensorReader {
    async fn read(&self) -> Result<Value, BridgeError> {
        let device = self.cache.device_by_name(&self.device_name).await?;
        let reading = device.reading(self.kind).ok_or_else(|| {
            BridgeError::NotFound(format!(
                "{:?} reading of device '{}'",
                self.kind, self.device_name
            ))
        })?;
        let value = match self.kind {
            SensorKind::Movement => Value::Bool(motion_detected(reading, self.clock.now())),
            _ => Value::Float(reading.value),
        };
        debug!(device = %self.device_name, kind = ?self.kind, ?value, "sensor read");
        Ok(value)
    }
}

pub struct SensorAccessory {
    info: AccessoryInfo,
    services: Vec<Service>,
}

impl SensorAccessory {
    /// Build the accessory for `device`, seeded with its current readings.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Mapping`] when the device carries no sensor at all.
    pub fn new(device: &RemoteDevice, cache: Arc<RemoteSnapshotCache>) -> Result<Self, BridgeError> {
        let clock = cache.clock();
        let now = clock.now();

        let services: Vec<Service> = SENSOR_KINDS
            .into_iter()
            .filter_map(|kind| device.reading(kind).map(|reading| (kind, reading)))
            .map(|(kind, reading)| {
                let reader = SensorReader {
                    cache: Arc::clone(&cache),
                    clock: Arc::clone(&clock),
                    device_name: device.name.clone(),
                    kind,
                };
                Service::new(service_kind(kind)).with_characteristic(
                    Characteristic::new(schema_for(kind, reading, now)).with_reader(Arc::new(reader)),
                )
            })
            .collect();

        if services.is_empty() {
            return Err(BridgeError::Mapping {
                appliance: device.name.clone(),
                details: "device reports no sensor readings".to_string(),
            });
        }

        Ok(Self {
            info: AccessoryInfo::for_hub(device.name.clone(), &device.core()),
            services,
        })
    }
}

impl Accessory for SensorAccessory {
    fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    fn category(&self) -> AccessoryCategory {
        AccessoryCategory::Sensor
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}
