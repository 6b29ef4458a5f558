//! [`AirConditionerAccessory`] – a cloud-controlled air conditioner exposed as
//! a heater/cooler.
//!
//! The state enumerations are restricted to what the appliance supports (see
//! [`AirConSchema`]).  Reads resolve the appliance afresh from the snapshot
//! cache; writes become settings deltas sent through the dispatcher.
//!
//! | Characteristic               | Remote side                               |
//! |------------------------------|-------------------------------------------|
//! | `Active`                     | power-off / power-on button               |
//! | `CurrentHeaterCoolerState`   | derived from mode and power button        |
//! | `TargetHeaterCoolerState`    | operation mode, or power-off for `Off`    |
//! | `Cooling/HeatingThreshold…`  | target temperature                        |
//! | `CurrentTemperature`         | temperature sensor of the hub             |

use std::sync::Arc;

use async_trait::async_trait;
use remobridge_remote::{CommandDispatcher, RemoteSnapshotCache};
use remobridge_types::{
    AirConSettings, BUTTON_POWER_OFF, BUTTON_POWER_ON, BridgeError, CharacteristicKind,
    CharacteristicSchema, CurrentHeaterCoolerState, NumericRange, OperationMode, RemoteAppliance,
    RemoteDevice, SensorKind, SettingsDelta, TargetHeaterCoolerState, Value,
};
use tracing::{debug, info, warn};

use crate::accessory::{Accessory, AccessoryCategory, AccessoryInfo, Service, ServiceKind};
use crate::characteristic::{Characteristic, Readable, Writable};
use crate::mapper::AirConSchema;

/// Current state implied by `settings`.
pub fn current_state(settings: &AirConSettings, schema: &AirConSchema) -> CurrentHeaterCoolerState {
    if settings.is_powered_off() {
        return CurrentHeaterCoolerState::Inactive;
    }
    let state = match settings.operation_mode {
        OperationMode::Cool => CurrentHeaterCoolerState::Cooling,
        OperationMode::Warm => CurrentHeaterCoolerState::Heating,
        _ => CurrentHeaterCoolerState::Idle,
    };
    if schema.current_states.contains(&state) {
        state
    } else {
        CurrentHeaterCoolerState::Idle
    }
}

/// Target state implied by `settings`.
///
/// Modes without a target state of their own (dry, blow) report `Off`.
pub fn target_state(settings: &AirConSettings, schema: &AirConSchema) -> TargetHeaterCoolerState {
    if settings.is_powered_off() {
        return TargetHeaterCoolerState::Off;
    }
    let state = match settings.operation_mode {
        OperationMode::Cool => TargetHeaterCoolerState::Cool,
        OperationMode::Warm => TargetHeaterCoolerState::Heat,
        OperationMode::Auto => TargetHeaterCoolerState::Auto,
        _ => TargetHeaterCoolerState::Off,
    };
    if schema.supports_target(state) {
        state
    } else {
        TargetHeaterCoolerState::Off
    }
}

/// Settings change that realises `target`.
pub fn delta_for_target(target: TargetHeaterCoolerState) -> SettingsDelta {
    match target {
        TargetHeaterCoolerState::Off => SettingsDelta::button(BUTTON_POWER_OFF),
        TargetHeaterCoolerState::Cool => SettingsDelta::mode(OperationMode::Cool),
        TargetHeaterCoolerState::Heat => SettingsDelta::mode(OperationMode::Warm),
        TargetHeaterCoolerState::Auto => SettingsDelta::mode(OperationMode::Auto),
    }
}

/// Temperature of the hub `device_id`, or of any other hub when that one has
/// no thermometer.  The flag is `true` when the fallback was used.
pub fn pick_temperature(devices: &[RemoteDevice], device_id: &str) -> Option<(f64, bool)> {
    let own = devices
        .iter()
        .find(|d| d.id == device_id)
        .and_then(|d| d.reading(SensorKind::Temperature));
    if let Some(reading) = own {
        return Some((reading.value, false));
    }
    devices
        .iter()
        .filter(|d| d.id != device_id)
        .find_map(|d| d.reading(SensorKind::Temperature))
        .map(|reading| (reading.value, true))
}

fn parse_temperature(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AirConField {
    Active,
    CurrentState,
    TargetState,
    Threshold(OperationMode),
    CurrentTemperature,
}

/// Everything a characteristic of one air conditioner needs to reach it.
struct AirConLink {
    appliance_id: String,
    name: String,
    device_id: String,
    schema: AirConSchema,
    cache: Arc<RemoteSnapshotCache>,
    dispatcher: Arc<CommandDispatcher>,
}

struct AirConChannel {
    link: Arc<AirConLink>,
    field: AirConField,
}

impl AirConChannel {
    async fn settings(&self) -> Result<AirConSettings, BridgeError> {
        let appliance = self.link.cache.appliance_by_id(&self.link.appliance_id).await?;
        appliance.settings.ok_or_else(|| {
            BridgeError::NotFound(format!("settings of appliance '{}'", self.link.name))
        })
    }

    async fn send(&self, delta: SettingsDelta) -> Result<(), BridgeError> {
        info!(appliance = %self.link.name, ?delta, "updating air conditioner");
        self.link
            .dispatcher
            .send_appliance_command(&self.link.appliance_id, &delta)
            .await
    }

    async fn current_temperature(&self) -> Result<Value, BridgeError> {
        let devices = self.link.cache.devices().await?;
        match pick_temperature(&devices.payload, &self.link.device_id) {
            Some((value, fallback)) => {
                if fallback {
                    warn!(
                        appliance = %self.link.name,
                        "hub has no thermometer, using another hub's temperature"
                    );
                }
                Ok(Value::Float(value))
            }
            None => Err(BridgeError::NotFound(format!(
                "temperature reading for '{}'",
                self.link.name
            ))),
        }
    }
}

#[async_trait]
impl Readable for AirConChannel {
    async fn read(&self) -> Result<Value, BridgeError> {
        let schema = &self.link.schema;
        let value = match self.field {
            AirConField::CurrentTemperature => self.current_temperature().await?,
            AirConField::Active => Value::Int(i64::from(!self.settings().await?.is_powered_off())),
            AirConField::CurrentState => {
                Value::Int(current_state(&self.settings().await?, schema).code())
            }
            AirConField::TargetState => {
                Value::Int(target_state(&self.settings().await?, schema).code())
            }
            AirConField::Threshold(mode) => {
                let settings = self.settings().await?;
                let setpoint = parse_temperature(&settings.temperature).ok_or_else(|| {
                    BridgeError::NotFound(format!(
                        "temperature setting of '{}' ({:?})",
                        self.link.name, settings.temperature
                    ))
                })?;
                // The setpoint follows the active mode, so it may lie outside
                // this threshold's bounds.
                let clamped = match schema.threshold_range(mode) {
                    Some(range) => setpoint.clamp(range.min, range.max),
                    None => setpoint,
                };
                Value::Float(clamped)
            }
        };
        debug!(appliance = %self.link.name, field = ?self.field, ?value, "air conditioner read");
        Ok(value)
    }
}

#[async_trait]
impl Writable for AirConChannel {
    async fn write(&self, value: Value) -> Result<(), BridgeError> {
        match self.field {
            AirConField::Active => {
                let button = if value.as_i64() == Some(0) {
                    BUTTON_POWER_OFF
                } else {
                    BUTTON_POWER_ON
                };
                self.send(SettingsDelta::button(button)).await
            }
            AirConField::TargetState => {
                let target = value
                    .as_i64()
                    .and_then(TargetHeaterCoolerState::from_code)
                    .filter(|t| self.link.schema.supports_target(*t))
                    .ok_or_else(|| BridgeError::InvalidValue {
                        characteristic: CharacteristicKind::TargetHeaterCoolerState,
                        details: format!("{value:?} is not a supported target state"),
                    })?;
                self.send(delta_for_target(target)).await
            }
            AirConField::Threshold(mode) => {
                let temperature = value.as_f64().unwrap_or_default();
                debug!(appliance = %self.link.name, mode = mode.as_str(), temperature, "threshold changed");
                self.send(SettingsDelta::temperature(temperature.to_string()))
                    .await
            }
            AirConField::CurrentState => Err(BridgeError::ReadOnly(
                CharacteristicKind::CurrentHeaterCoolerState,
            )),
            AirConField::CurrentTemperature => {
                Err(BridgeError::ReadOnly(CharacteristicKind::CurrentTemperature))
            }
        }
    }
}

pub struct AirConditionerAccessory {
    info: AccessoryInfo,
    services: Vec<Service>,
    link: Arc<AirConLink>,
}

impl AirConditionerAccessory {
    /// Build the accessory for `appliance`.  `devices` seeds the current
    /// temperature.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Mapping`] when a supported mode carries a malformed
    /// temperature range.
    pub fn new(
        appliance: &RemoteAppliance,
        devices: &[RemoteDevice],
        cache: Arc<RemoteSnapshotCache>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Result<Self, BridgeError> {
        let schema = AirConSchema::from_appliance(appliance)?;
        let settings = appliance.settings.clone().unwrap_or_default();
        let seeded_temperature = parse_temperature(&settings.temperature);

        let link = Arc::new(AirConLink {
            appliance_id: appliance.id.clone(),
            name: appliance.nickname.clone(),
            device_id: appliance.device.id.clone(),
            schema: schema.clone(),
            cache,
            dispatcher,
        });
        let channel = |field: AirConField| {
            Arc::new(AirConChannel {
                link: Arc::clone(&link),
                field,
            })
        };

        let mut service = Service::new(ServiceKind::HeaterCooler)
            .with_characteristic({
                let c = channel(AirConField::Active);
                Characteristic::new(
                    CharacteristicSchema::new(
                        CharacteristicKind::Active,
                        Value::Int(i64::from(!settings.is_powered_off())),
                    )
                    .with_valid_values(vec![0, 1]),
                )
                .with_reader(c.clone())
                .with_writer(c)
            })
            .with_characteristic(
                Characteristic::new(
                    CharacteristicSchema::new(
                        CharacteristicKind::CurrentHeaterCoolerState,
                        Value::Int(current_state(&settings, &schema).code()),
                    )
                    .with_valid_values(schema.current_codes()),
                )
                .with_reader(channel(AirConField::CurrentState)),
            )
            .with_characteristic({
                let c = channel(AirConField::TargetState);
                Characteristic::new(
                    CharacteristicSchema::new(
                        CharacteristicKind::TargetHeaterCoolerState,
                        Value::Int(target_state(&settings, &schema).code()),
                    )
                    .with_valid_values(schema.target_codes()),
                )
                .with_reader(c.clone())
                .with_writer(c)
            });

        let thresholds = [
            (OperationMode::Cool, CharacteristicKind::CoolingThresholdTemperature),
            (OperationMode::Warm, CharacteristicKind::HeatingThresholdTemperature),
        ];
        for (mode, kind) in thresholds {
            let Some(range) = schema.threshold_range(mode) else { continue };
            let c = channel(AirConField::Threshold(mode));
            let initial = seeded_temperature
                .unwrap_or(range.min)
                .clamp(range.min, range.max);
            service = service.with_characteristic(
                Characteristic::new(
                    CharacteristicSchema::new(kind, Value::Float(initial)).with_range(range),
                )
                .with_reader(c.clone())
                .with_writer(c),
            );
        }

        let current_temperature = pick_temperature(devices, &appliance.device.id)
            .map(|(value, _)| value)
            .unwrap_or_default();
        service = service.with_characteristic(
            Characteristic::new(
                CharacteristicSchema::new(
                    CharacteristicKind::CurrentTemperature,
                    Value::Float(current_temperature),
                )
                .with_range(NumericRange {
                    min: -270.0,
                    max: 100.0,
                    step: 0.1,
                }),
            )
            .with_reader(channel(AirConField::CurrentTemperature)),
        );

        let model = appliance.model.clone().unwrap_or_default();
        info!(
            appliance = %appliance.nickname,
            targets = ?schema.target_states,
            "air conditioner mapped"
        );
        Ok(Self {
            info: AccessoryInfo {
                name: appliance.nickname.clone(),
                manufacturer: model.manufacturer,
                model: model.remote_name,
                serial_number: appliance.id.clone(),
                firmware_revision: String::new(),
            },
            services: vec![service],
            link,
        })
    }

    pub fn schema(&self) -> &AirConSchema {
        &self.link.schema
    }
}

impl Accessory for AirConditionerAccessory {
    fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    fn category(&self) -> AccessoryCategory {
        AccessoryCategory::AirConditioner
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characteristic::{STATUS_OK, STATUS_UNAVAILABLE};
    use remobridge_remote::{Clock, ManualClock, NoDelay, RecordedCommand, StubRemote};
    use remobridge_types::{AirConRange, AirConSpec, DeviceCore, ModeRange, SensorReading};
    use std::collections::HashMap;

    fn aircon(mode: OperationMode, button: &str, modes: &[OperationMode]) -> RemoteAppliance {
        RemoteAppliance {
            id: "ac-1".into(),
            nickname: "Bedroom AC".into(),
            appliance_type: "AC".into(),
            image: "ico_ac_1".into(),
            device: DeviceCore {
                id: "hub-1".into(),
                name: "Bedroom Remo".into(),
                ..DeviceCore::default()
            },
            model: None,
            settings: Some(AirConSettings {
                temperature: "26".into(),
                operation_mode: mode,
                button: button.into(),
            }),
            aircon: Some(AirConSpec {
                range: AirConRange {
                    modes: modes
                        .iter()
                        .map(|m| {
                            (
                                *m,
                                ModeRange {
                                    temperature: ["20", "21", "26", "30"]
                                        .iter()
                                        .map(|s| s.to_string())
                                        .collect(),
                                },
                            )
                        })
                        .collect(),
                },
            }),
            signals: vec![],
        }
    }

    fn hub(id: &str, temperature: Option<f64>) -> RemoteDevice {
        let mut newest_events = HashMap::new();
        if let Some(value) = temperature {
            newest_events.insert(
                SensorKind::Temperature,
                SensorReading {
                    value,
                    created_at: ManualClock::new().now(),
                },
            );
        }
        RemoteDevice {
            id: id.into(),
            name: id.into(),
            serial_number: String::new(),
            firmware_version: String::new(),
            newest_events,
        }
    }

    struct Fixture {
        remote: Arc<StubRemote>,
        clock: Arc<ManualClock>,
        accessory: AirConditionerAccessory,
    }

    fn fixture(appliance: RemoteAppliance, devices: Vec<RemoteDevice>) -> Fixture {
        let remote = Arc::new(StubRemote::builder().build());
        remote.set_appliances(vec![appliance.clone()]);
        remote.set_devices(devices.clone());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(RemoteSnapshotCache::new(remote.clone()).with_clock(clock.clone()));
        let dispatcher =
            Arc::new(CommandDispatcher::new(remote.clone()).with_delay_policy(Arc::new(NoDelay)));
        let accessory = AirConditionerAccessory::new(&appliance, &devices, cache, dispatcher).unwrap();
        Fixture {
            remote,
            clock,
            accessory,
        }
    }

    fn settings_sent(remote: &StubRemote) -> Vec<SettingsDelta> {
        remote
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::Settings { delta, .. } => Some(delta),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn seeding_follows_mode_and_power_button() {
        let f = fixture(
            aircon(OperationMode::Cool, "", &[OperationMode::Cool, OperationMode::Warm]),
            vec![],
        );
        let a = &f.accessory;
        assert_eq!(
            a.characteristic(CharacteristicKind::CurrentHeaterCoolerState).unwrap().value(),
            Value::Int(CurrentHeaterCoolerState::Cooling.code())
        );
        assert_eq!(
            a.characteristic(CharacteristicKind::TargetHeaterCoolerState).unwrap().value(),
            Value::Int(TargetHeaterCoolerState::Cool.code())
        );
        assert_eq!(a.characteristic(CharacteristicKind::Active).unwrap().value(), Value::Int(1));

        let f = fixture(
            aircon(OperationMode::Warm, BUTTON_POWER_OFF, &[OperationMode::Warm]),
            vec![],
        );
        let a = &f.accessory;
        assert_eq!(
            a.characteristic(CharacteristicKind::CurrentHeaterCoolerState).unwrap().value(),
            Value::Int(CurrentHeaterCoolerState::Inactive.code())
        );
        assert_eq!(a.characteristic(CharacteristicKind::Active).unwrap().value(), Value::Int(0));
    }

    #[test]
    fn thresholds_only_for_supported_modes() {
        let f = fixture(aircon(OperationMode::Cool, "", &[OperationMode::Cool]), vec![]);
        let a = &f.accessory;
        let cooling = a
            .characteristic(CharacteristicKind::CoolingThresholdTemperature)
            .unwrap();
        assert_eq!(cooling.value(), Value::Float(26.0));
        assert_eq!(
            cooling.schema().range,
            Some(NumericRange {
                min: 20.0,
                max: 30.0,
                step: 1.0
            })
        );
        assert!(a
            .characteristic(CharacteristicKind::HeatingThresholdTemperature)
            .is_none());
        assert_eq!(
            a.characteristic(CharacteristicKind::TargetHeaterCoolerState)
                .unwrap()
                .schema()
                .valid_values,
            Some(vec![3, 2])
        );
    }

    #[tokio::test]
    async fn target_writes_become_mode_or_power_off() {
        let f = fixture(
            aircon(OperationMode::Cool, "", &[OperationMode::Cool, OperationMode::Warm]),
            vec![],
        );
        let target = f
            .accessory
            .characteristic(CharacteristicKind::TargetHeaterCoolerState)
            .unwrap();
        target.write(Value::Int(1)).await.unwrap();
        target.write(Value::Int(3)).await.unwrap();
        assert_eq!(
            settings_sent(&f.remote),
            vec![
                SettingsDelta::mode(OperationMode::Warm),
                SettingsDelta::button(BUTTON_POWER_OFF)
            ]
        );
    }

    #[tokio::test]
    async fn unsupported_target_is_rejected_without_dispatch() {
        let f = fixture(aircon(OperationMode::Cool, "", &[OperationMode::Cool]), vec![]);
        let target = f
            .accessory
            .characteristic(CharacteristicKind::TargetHeaterCoolerState)
            .unwrap();
        let err = target.write(Value::Int(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidValue { .. }));
        assert!(f.remote.commands().is_empty());
    }

    #[tokio::test]
    async fn active_toggle_presses_power_buttons() {
        let f = fixture(aircon(OperationMode::Cool, "", &[OperationMode::Cool]), vec![]);
        let active = f.accessory.characteristic(CharacteristicKind::Active).unwrap();
        active.write(Value::Int(0)).await.unwrap();
        active.write(Value::Bool(true)).await.unwrap();
        assert_eq!(
            settings_sent(&f.remote),
            vec![
                SettingsDelta::button(BUTTON_POWER_OFF),
                SettingsDelta::button(BUTTON_POWER_ON)
            ]
        );
    }

    #[tokio::test]
    async fn threshold_write_sends_temperature_text() {
        let f = fixture(aircon(OperationMode::Cool, "", &[OperationMode::Cool]), vec![]);
        let cooling = f
            .accessory
            .characteristic(CharacteristicKind::CoolingThresholdTemperature)
            .unwrap();
        cooling.write(Value::Float(24.0)).await.unwrap();
        cooling.write(Value::Float(24.5)).await.unwrap();
        assert_eq!(
            settings_sent(&f.remote),
            vec![SettingsDelta::temperature("24"), SettingsDelta::temperature("24.5")]
        );
        assert!(cooling.write(Value::Float(35.0)).await.is_err());
    }

    #[tokio::test]
    async fn reads_track_the_fresh_appliance() {
        let f = fixture(aircon(OperationMode::Cool, "", &[OperationMode::Cool]), vec![]);
        let current = f
            .accessory
            .characteristic(CharacteristicKind::CurrentHeaterCoolerState)
            .unwrap();
        let cooling = f
            .accessory
            .characteristic(CharacteristicKind::CoolingThresholdTemperature)
            .unwrap();
        assert_eq!(cooling.read().await.value, Value::Float(26.0));

        let mut updated = aircon(OperationMode::Cool, BUTTON_POWER_OFF, &[OperationMode::Cool]);
        if let Some(settings) = updated.settings.as_mut() {
            settings.temperature = "22".into();
        }
        f.remote.set_appliances(vec![updated]);
        f.clock.advance(chrono::Duration::seconds(10));

        assert_eq!(cooling.read().await.value, Value::Float(22.0));
        assert_eq!(
            current.read().await.value,
            Value::Int(CurrentHeaterCoolerState::Inactive.code())
        );
    }

    #[tokio::test]
    async fn threshold_reads_stay_within_their_own_range() {
        let mut appliance = aircon(
            OperationMode::Warm,
            "",
            &[OperationMode::Cool, OperationMode::Warm],
        );
        if let Some(spec) = appliance.aircon.as_mut() {
            spec.range.modes.insert(
                OperationMode::Warm,
                ModeRange {
                    temperature: ["14", "16", "30"].iter().map(|s| s.to_string()).collect(),
                },
            );
        }
        if let Some(settings) = appliance.settings.as_mut() {
            settings.temperature = "16".into();
        }
        let f = fixture(appliance, vec![]);
        let cooling = f
            .accessory
            .characteristic(CharacteristicKind::CoolingThresholdTemperature)
            .unwrap();
        let heating = f
            .accessory
            .characteristic(CharacteristicKind::HeatingThresholdTemperature)
            .unwrap();

        assert_eq!(cooling.read().await.value, Value::Float(20.0));
        assert_eq!(heating.read().await.value, Value::Float(16.0));
        assert_eq!(cooling.value(), Value::Float(20.0));
    }

    #[tokio::test]
    async fn current_temperature_falls_back_to_other_hub() {
        let f = fixture(
            aircon(OperationMode::Cool, "", &[OperationMode::Cool]),
            vec![hub("hub-1", None), hub("hub-2", Some(24.5))],
        );
        let temperature = f
            .accessory
            .characteristic(CharacteristicKind::CurrentTemperature)
            .unwrap();
        assert_eq!(temperature.value(), Value::Float(24.5));
        let response = temperature.read().await;
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.value, Value::Float(24.5));
    }

    #[tokio::test]
    async fn current_temperature_without_any_thermometer_is_unavailable() {
        let f = fixture(
            aircon(OperationMode::Cool, "", &[OperationMode::Cool]),
            vec![hub("hub-1", None)],
        );
        let response = f
            .accessory
            .characteristic(CharacteristicKind::CurrentTemperature)
            .unwrap()
            .read()
            .await;
        assert_eq!(response.status, STATUS_UNAVAILABLE);
    }

    #[test]
    fn own_hub_temperature_wins() {
        let devices = vec![hub("hub-2", Some(30.0)), hub("hub-1", Some(21.0))];
        assert_eq!(pick_temperature(&devices, "hub-1"), Some((21.0, false)));
        assert_eq!(pick_temperature(&devices, "hub-9"), Some((30.0, true)));
        assert_eq!(pick_temperature(&[], "hub-1"), None);
    }
}
