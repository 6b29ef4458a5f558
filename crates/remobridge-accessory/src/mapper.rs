//! Capability mapping: from remote appliance metadata to characteristic
//! constraints.
//!
//! * [`range_to_min_max_step`] – a list of decimal strings to a
//!   [`NumericRange`].
//! * [`SignalIndex`] – classifies a fan's infrared signals by icon into speed
//!   levels and rotation directions.
//! * [`AirConSchema`] – the state enumerations and threshold ranges an air
//!   conditioner actually supports.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use remobridge_types::{
    BridgeError, CurrentHeaterCoolerState, NumericRange, OperationMode, RemoteAppliance,
    RotationDirection, Signal, TargetHeaterCoolerState,
};
use thiserror::Error;
use tracing::debug;

const SPEED_ICON_PATTERN: &str = r"^ico_number_(\d)$";
const DIRECTION_ICON_PATTERN: &str = r"^ico_(.*)ward$";

pub const DIRECTION_FORWARD: &str = "for";
pub const DIRECTION_BACKWARD: &str = "back";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    #[error("need at least two distinct values, got {0}")]
    TooFewValues(usize),
    #[error("'{0}' is not a number")]
    NotNumeric(String),
}

/// Turn an unordered list of decimal strings into min, max and step.
///
/// The step is the gap between the two smallest distinct values.
///
/// ```rust
/// use remobridge_accessory::mapper::range_to_min_max_step;
///
/// let values: Vec<String> = ["20", "18", "30", "22"].iter().map(|s| s.to_string()).collect();
/// let range = range_to_min_max_step(&values).unwrap();
/// assert_eq!((range.min, range.max, range.step), (18.0, 30.0, 2.0));
/// ```
pub fn range_to_min_max_step(values: &[String]) -> Result<NumericRange, RangeError> {
    let mut parsed = values
        .iter()
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| RangeError::NotNumeric(raw.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_by(f64::total_cmp);
    parsed.dedup();

    match parsed.as_slice() {
        [min, second, .., max] => Ok(NumericRange {
            min: *min,
            max: *max,
            step: second - min,
        }),
        [min, max] => Ok(NumericRange {
            min: *min,
            max: *max,
            step: max - min,
        }),
        other => Err(RangeError::TooFewValues(other.len())),
    }
}

fn mapping_error(appliance: &str, details: impl Into<String>) -> BridgeError {
    BridgeError::Mapping {
        appliance: appliance.to_string(),
        details: details.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fan signals
// ─────────────────────────────────────────────────────────────────────────────

/// How a fan's rotation direction maps onto its stored signals.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectionMode {
    /// Clockwise sends `forward`, counter-clockwise sends `backward`.
    Both { forward: Signal, backward: Signal },
    /// Only one direction signal is known; every write sends it.
    Single(Signal),
}

impl DirectionMode {
    pub fn signal_for(&self, direction: RotationDirection) -> &Signal {
        match (self, direction) {
            (DirectionMode::Both { forward, .. }, RotationDirection::Clockwise) => forward,
            (DirectionMode::Both { backward, .. }, RotationDirection::CounterClockwise) => backward,
            (DirectionMode::Single(signal), _) => signal,
        }
    }
}

/// A fan's signals indexed by speed level and direction token.
#[derive(Debug, Clone)]
pub struct SignalIndex {
    speeds: BTreeMap<u32, Signal>,
    directions: HashMap<String, Signal>,
    max_level: u32,
}

impl SignalIndex {
    /// Classify `signals` by icon.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Mapping`] when no positive speed level is found; such an
    /// appliance cannot be driven as a fan.
    pub fn from_signals(appliance: &str, signals: &[Signal]) -> Result<Self, BridgeError> {
        let speed_re = Regex::new(SPEED_ICON_PATTERN)
            .map_err(|e| mapping_error(appliance, format!("invalid speed pattern: {e}")))?;
        let direction_re = Regex::new(DIRECTION_ICON_PATTERN)
            .map_err(|e| mapping_error(appliance, format!("invalid direction pattern: {e}")))?;

        let mut speeds = BTreeMap::new();
        let mut directions = HashMap::new();
        let mut max_level = 0;

        for signal in signals {
            if let Some(level) = speed_re
                .captures(&signal.image)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            {
                debug!(appliance, level, signal_id = %signal.id, "speed signal");
                max_level = max_level.max(level);
                speeds.insert(level, signal.clone());
            }
            if let Some(caps) = direction_re.captures(&signal.image) {
                let token = caps[1].to_string();
                debug!(appliance, direction = %token, signal_id = %signal.id, "direction signal");
                directions.insert(token, signal.clone());
            }
        }

        if max_level == 0 {
            return Err(mapping_error(appliance, "no rotation speed signal found"));
        }
        Ok(Self {
            speeds,
            directions,
            max_level,
        })
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Percentage covered by one speed level (integer division).
    pub fn speed_step(&self) -> u32 {
        100 / self.max_level
    }

    /// Speed level a percentage value selects.
    pub fn level_for(&self, percent: f64) -> u32 {
        (percent.max(0.0) as u32) / self.speed_step()
    }

    pub fn speed_signal(&self, level: u32) -> Option<&Signal> {
        self.speeds.get(&level)
    }

    pub fn direction_signal(&self, token: &str) -> Option<&Signal> {
        self.directions.get(token)
    }

    /// `None` when neither a forward nor a backward signal exists.
    pub fn direction_mode(&self) -> Option<DirectionMode> {
        match (
            self.direction_signal(DIRECTION_FORWARD),
            self.direction_signal(DIRECTION_BACKWARD),
        ) {
            (Some(forward), Some(backward)) => Some(DirectionMode::Both {
                forward: forward.clone(),
                backward: backward.clone(),
            }),
            (Some(single), None) | (None, Some(single)) => Some(DirectionMode::Single(single.clone())),
            (None, None) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Air conditioner capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// States and threshold ranges one air conditioner supports.
///
/// `target_states` always contains `Off`; every other entry corresponds to an
/// operation mode the appliance reports.
#[derive(Debug, Clone, PartialEq)]
pub struct AirConSchema {
    pub current_states: Vec<CurrentHeaterCoolerState>,
    pub target_states: Vec<TargetHeaterCoolerState>,
    pub cooling_range: Option<NumericRange>,
    pub heating_range: Option<NumericRange>,
}

impl AirConSchema {
    pub fn from_appliance(appliance: &RemoteAppliance) -> Result<Self, BridgeError> {
        let name = appliance.nickname.as_str();
        let mut schema = Self {
            current_states: vec![
                CurrentHeaterCoolerState::Inactive,
                CurrentHeaterCoolerState::Idle,
            ],
            target_states: vec![TargetHeaterCoolerState::Off],
            cooling_range: None,
            heating_range: None,
        };

        let threshold = |mode: OperationMode| -> Result<Option<NumericRange>, BridgeError> {
            appliance
                .mode_range(mode)
                .map(|range| {
                    range_to_min_max_step(&range.temperature).map_err(|e| {
                        mapping_error(name, format!("{} temperature range: {e}", mode.as_str()))
                    })
                })
                .transpose()
        };

        if let Some(range) = threshold(OperationMode::Cool)? {
            debug!(appliance = name, min = range.min, max = range.max, "cooling supported");
            schema.current_states.push(CurrentHeaterCoolerState::Cooling);
            schema.target_states.push(TargetHeaterCoolerState::Cool);
            schema.cooling_range = Some(range);
        }
        if let Some(range) = threshold(OperationMode::Warm)? {
            debug!(appliance = name, min = range.min, max = range.max, "heating supported");
            schema.current_states.push(CurrentHeaterCoolerState::Heating);
            schema.target_states.push(TargetHeaterCoolerState::Heat);
            schema.heating_range = Some(range);
        }
        if appliance.supports(OperationMode::Auto) {
            schema.target_states.push(TargetHeaterCoolerState::Auto);
        }
        Ok(schema)
    }

    pub fn current_codes(&self) -> Vec<i64> {
        self.current_states.iter().map(|s| s.code()).collect()
    }

    pub fn target_codes(&self) -> Vec<i64> {
        self.target_states.iter().map(|s| s.code()).collect()
    }

    pub fn supports_target(&self, state: TargetHeaterCoolerState) -> bool {
        self.target_states.contains(&state)
    }

    /// Bounds of the threshold characteristic driven by `mode`.
    pub fn threshold_range(&self, mode: OperationMode) -> Option<NumericRange> {
        match mode {
            OperationMode::Cool => self.cooling_range,
            OperationMode::Warm => self.heating_range,
            _ => None,
        }
    }
}
