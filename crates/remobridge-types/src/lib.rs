use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Button value the remote API uses for "power off".
pub const BUTTON_POWER_OFF: &str = "power-off";
/// Button value the remote API uses for "power on" (the empty button).
pub const BUTTON_POWER_ON: &str = "";

// ─────────────────────────────────────────────────────────────────────────────
// Remote devices
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of sensor reading a remote device reports in its `newest_events` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    #[serde(rename = "te")]
    Temperature,
    #[serde(rename = "hu")]
    Humidity,
    #[serde(rename = "il")]
    Illumination,
    #[serde(rename = "mo")]
    Movement,
}

/// The latest value reported for one sensor kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "val")]
    pub value: f64,
    pub created_at: DateTime<Utc>,
}

/// Identity of a remote hub, as embedded in appliance records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCore {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub firmware_version: String,
}

/// A remote hub together with its most recent sensor readings.
///
/// Snapshots are replaced wholesale on every refresh and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub newest_events: HashMap<SensorKind, SensorReading>,
}

impl RemoteDevice {
    /// Latest reading for `kind`, if the device carries that sensor.
    pub fn reading(&self, kind: SensorKind) -> Option<&SensorReading> {
        self.newest_events.get(&kind)
    }

    /// Identity subset of this device.
    pub fn core(&self) -> DeviceCore {
        DeviceCore {
            id: self.id.clone(),
            name: self.name.clone(),
            serial_number: self.serial_number.clone(),
            firmware_version: self.firmware_version.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote appliances
// ─────────────────────────────────────────────────────────────────────────────

/// Air-conditioner operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Cool,
    Warm,
    Dry,
    Blow,
    Auto,
    /// Anything the remote reports that this bridge does not model, including
    /// the empty string.
    #[default]
    #[serde(other)]
    Unknown,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::Cool => "cool",
            OperationMode::Warm => "warm",
            OperationMode::Dry => "dry",
            OperationMode::Blow => "blow",
            OperationMode::Auto => "auto",
            OperationMode::Unknown => "",
        }
    }
}

/// Classification of an appliance for accessory construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplianceKind {
    AirConditioner,
    InfraredFan,
    Other,
}

/// Manufacturer metadata for a preset appliance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplianceModel {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub remote_name: String,
}

/// Current air-conditioner settings as last reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirConSettings {
    /// Target temperature as text, e.g. `"26"` or `"26.5"`.
    #[serde(rename = "temp", default)]
    pub temperature: String,
    #[serde(rename = "mode", default)]
    pub operation_mode: OperationMode,
    /// [`BUTTON_POWER_OFF`] when the unit is off, empty otherwise.
    #[serde(default)]
    pub button: String,
}

impl AirConSettings {
    pub fn is_powered_off(&self) -> bool {
        self.button == BUTTON_POWER_OFF
    }
}

/// Temperature values a single operation mode accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeRange {
    #[serde(rename = "temp", default)]
    pub temperature: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirConRange {
    #[serde(default)]
    pub modes: HashMap<OperationMode, ModeRange>,
}

/// Capabilities of an air conditioner: the supported modes and their ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirConSpec {
    #[serde(default)]
    pub range: AirConRange,
}

/// A stored infrared command; `image` is the icon label the user picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
}

/// An appliance registered on the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAppliance {
    pub id: String,
    #[serde(default)]
    pub nickname: String,
    /// Raw appliance type: `"AC"`, `"IR"`, `"TV"`, `"LIGHT"`, …
    #[serde(rename = "type", default)]
    pub appliance_type: String,
    #[serde(default)]
    pub image: String,
    pub device: DeviceCore,
    #[serde(default)]
    pub model: Option<ApplianceModel>,
    #[serde(default)]
    pub settings: Option<AirConSettings>,
    #[serde(default)]
    pub aircon: Option<AirConSpec>,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl RemoteAppliance {
    pub fn kind(&self) -> ApplianceKind {
        match (self.appliance_type.as_str(), self.image.as_str()) {
            ("AC", _) => ApplianceKind::AirConditioner,
            ("IR", "ico_fan") => ApplianceKind::InfraredFan,
            _ => ApplianceKind::Other,
        }
    }

    /// Temperature range of `mode`, when the appliance supports that mode.
    pub fn mode_range(&self, mode: OperationMode) -> Option<&ModeRange> {
        self.aircon.as_ref()?.range.modes.get(&mode)
    }

    pub fn supports(&self, mode: OperationMode) -> bool {
        self.mode_range(mode).is_some()
    }
}

/// Partial air-conditioner update sent to the remote. `None` fields are left
/// untouched on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
}

impl SettingsDelta {
    pub fn mode(mode: OperationMode) -> Self {
        Self {
            operation_mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn temperature(temperature: impl Into<String>) -> Self {
        Self {
            temperature: Some(temperature.into()),
            ..Self::default()
        }
    }

    pub fn button(button: impl Into<String>) -> Self {
        Self {
            button: Some(button.into()),
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Characteristic value model
// ─────────────────────────────────────────────────────────────────────────────

/// A single characteristic value as exchanged with protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(v) => Some(v as f64),
            Value::Float(v) => Some(v),
            Value::Bool(_) => None,
        }
    }

    /// Integer view. Floats are accepted only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Float(v) if v.fract() == 0.0 => Some(v as i64),
            _ => None,
        }
    }

    /// Boolean view. Protocol clients commonly send `0`/`1` for booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }
}

/// Inclusive numeric bounds and step of a numeric characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicKind {
    CurrentTemperature,
    CurrentRelativeHumidity,
    CurrentAmbientLightLevel,
    MotionDetected,
    On,
    RotationSpeed,
    RotationDirection,
    Active,
    CurrentHeaterCoolerState,
    TargetHeaterCoolerState,
    CoolingThresholdTemperature,
    HeatingThresholdTemperature,
}

/// Static description of a characteristic: kind, seed value and constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicSchema {
    pub kind: CharacteristicKind,
    pub initial: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<NumericRange>,
    /// Legal values for enumerated characteristics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<i64>>,
}

impl CharacteristicSchema {
    pub fn new(kind: CharacteristicKind, initial: Value) -> Self {
        Self {
            kind,
            initial,
            range: None,
            valid_values: None,
        }
    }

    pub fn with_range(mut self, range: NumericRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_valid_values(mut self, values: Vec<i64>) -> Self {
        self.valid_values = Some(values);
        self
    }
}

/// Operating state an air conditioner is observed to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrentHeaterCoolerState {
    Inactive,
    Idle,
    Heating,
    Cooling,
}

impl CurrentHeaterCoolerState {
    pub fn code(self) -> i64 {
        match self {
            CurrentHeaterCoolerState::Inactive => 0,
            CurrentHeaterCoolerState::Idle => 1,
            CurrentHeaterCoolerState::Heating => 2,
            CurrentHeaterCoolerState::Cooling => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CurrentHeaterCoolerState::Inactive),
            1 => Some(CurrentHeaterCoolerState::Idle),
            2 => Some(CurrentHeaterCoolerState::Heating),
            3 => Some(CurrentHeaterCoolerState::Cooling),
            _ => None,
        }
    }
}

/// Operating state a controller asks an air conditioner to reach.
///
/// `Off` is carried as code 3, after the three standard codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetHeaterCoolerState {
    Auto,
    Heat,
    Cool,
    Off,
}

impl TargetHeaterCoolerState {
    pub fn code(self) -> i64 {
        match self {
            TargetHeaterCoolerState::Auto => 0,
            TargetHeaterCoolerState::Heat => 1,
            TargetHeaterCoolerState::Cool => 2,
            TargetHeaterCoolerState::Off => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TargetHeaterCoolerState::Auto),
            1 => Some(TargetHeaterCoolerState::Heat),
            2 => Some(TargetHeaterCoolerState::Cool),
            3 => Some(TargetHeaterCoolerState::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationDirection {
    Clockwise,
    CounterClockwise,
}

impl RotationDirection {
    pub fn code(self) -> i64 {
        match self {
            RotationDirection::Clockwise => 0,
            RotationDirection::CounterClockwise => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RotationDirection::Clockwise),
            1 => Some(RotationDirection::CounterClockwise),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared by the cache, the dispatcher and every accessory.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Remote API Error: {0}")]
    Remote(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Mapping Error on {appliance}: {details}")]
    Mapping { appliance: String, details: String },

    #[error("Invalid Value for {characteristic:?}: {details}")]
    InvalidValue {
        characteristic: CharacteristicKind,
        details: String,
    },

    #[error("Read Only: {0:?}")]
    ReadOnly(CharacteristicKind),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_JSON: &str = r#"{
        "name": "Living Remo",
        "id": "dev-1",
        "serial_number": "1W3200",
        "firmware_version": "Remo/1.0.62",
        "newest_events": {
            "te": {"val": 21.5, "created_at": "2024-01-01T10:00:00Z"},
            "mo": {"val": 1, "created_at": "2024-01-01T09:59:00Z"}
        }
    }"#;

    const AIRCON_JSON: &str = r#"{
        "id": "ac-1",
        "nickname": "Bedroom AC",
        "type": "AC",
        "image": "ico_ac_1",
        "device": {"id": "dev-1", "name": "Living Remo"},
        "model": {"manufacturer": "daikin", "remote_name": "arc123"},
        "settings": {"temp": "26", "mode": "cool", "button": ""},
        "aircon": {"range": {"modes": {
            "cool": {"temp": ["24", "25", "26"]},
            "blow": {"temp": [""]}
        }}}
    }"#;

    #[test]
    fn device_deserializes_sensor_map() {
        let device: RemoteDevice = serde_json::from_str(DEVICE_JSON).unwrap();
        assert_eq!(device.name, "Living Remo");
        let te = device.reading(SensorKind::Temperature).unwrap();
        assert!((te.value - 21.5).abs() < f64::EPSILON);
        assert!(device.reading(SensorKind::Movement).is_some());
        assert!(device.reading(SensorKind::Humidity).is_none());
    }

    #[test]
    fn aircon_deserializes_modes_and_settings() {
        let ac: RemoteAppliance = serde_json::from_str(AIRCON_JSON).unwrap();
        assert_eq!(ac.kind(), ApplianceKind::AirConditioner);
        assert!(ac.supports(OperationMode::Cool));
        assert!(!ac.supports(OperationMode::Warm));
        let settings = ac.settings.unwrap();
        assert_eq!(settings.operation_mode, OperationMode::Cool);
        assert!(!settings.is_powered_off());
    }

    #[test]
    fn unknown_and_empty_modes_fall_back_to_unknown() {
        let settings: AirConSettings =
            serde_json::from_str(r#"{"temp": "", "mode": "", "button": "power-off"}"#).unwrap();
        assert_eq!(settings.operation_mode, OperationMode::Unknown);
        assert!(settings.is_powered_off());

        let settings: AirConSettings = serde_json::from_str(r#"{"mode": "turbo"}"#).unwrap();
        assert_eq!(settings.operation_mode, OperationMode::Unknown);
    }

    #[test]
    fn ir_fan_is_classified_by_icon() {
        let fan = RemoteAppliance {
            id: "fan-1".into(),
            nickname: "Fan".into(),
            appliance_type: "IR".into(),
            image: "ico_fan".into(),
            device: DeviceCore::default(),
            model: None,
            settings: None,
            aircon: None,
            signals: vec![],
        };
        assert_eq!(fan.kind(), ApplianceKind::InfraredFan);

        let tv = RemoteAppliance {
            image: "ico_tv".into(),
            ..fan
        };
        assert_eq!(tv.kind(), ApplianceKind::Other);
    }

    #[test]
    fn settings_delta_skips_unset_fields() {
        let json = serde_json::to_string(&SettingsDelta::button(BUTTON_POWER_OFF)).unwrap();
        assert_eq!(json, r#"{"button":"power-off"}"#);
        let json = serde_json::to_string(&SettingsDelta::mode(OperationMode::Warm)).unwrap();
        assert_eq!(json, r#"{"operation_mode":"warm"}"#);
    }

    #[test]
    fn value_views() {
        let v: Value = serde_json::from_str("66").unwrap();
        assert_eq!(v, Value::Int(66));
        assert_eq!(v.as_f64(), Some(66.0));

        let v: Value = serde_json::from_str("26.5").unwrap();
        assert_eq!(v.as_i64(), None);
        assert_eq!(Value::Float(2.0).as_i64(), Some(2));

        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_bool(), None);
    }

    #[test]
    fn state_codes_roundtrip() {
        for state in [
            TargetHeaterCoolerState::Auto,
            TargetHeaterCoolerState::Heat,
            TargetHeaterCoolerState::Cool,
            TargetHeaterCoolerState::Off,
        ] {
            assert_eq!(TargetHeaterCoolerState::from_code(state.code()), Some(state));
        }
        assert_eq!(CurrentHeaterCoolerState::from_code(9), None);
        assert_eq!(
            RotationDirection::from_code(1),
            Some(RotationDirection::CounterClockwise)
        );
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::Mapping {
            appliance: "Fan".to_string(),
            details: "no speed signal".to_string(),
        };
        assert!(err.to_string().contains("Fan"));
        assert!(BridgeError::NotFound("dev".into()).to_string().contains("Not Found"));
    }
}
