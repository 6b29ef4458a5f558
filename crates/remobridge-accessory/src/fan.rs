//! [`FanAccessory`] – an infrared fan driven by replaying stored signals.
//!
//! Speed levels and rotation directions come from the icons the user picked
//! for each signal (see [`SignalIndex`]).  The fan has no readable state on
//! the remote side, so characteristics only carry the last written value.

use std::sync::Arc;

use async_trait::async_trait;
use remobridge_remote::CommandDispatcher;
use remobridge_types::{
    BridgeError, CharacteristicKind, CharacteristicSchema, NumericRange, RemoteAppliance,
    RotationDirection, Signal, Value,
};
use tracing::{debug, error, info};

use crate::accessory::{Accessory, AccessoryCategory, AccessoryInfo, Service, ServiceKind};
use crate::characteristic::{Characteristic, Writable};
use crate::mapper::{DirectionMode, SignalIndex};

#[derive(Debug, Clone)]
enum FanControl {
    Power,
    Speed,
    Direction(DirectionMode),
}

struct FanWriter {
    name: String,
    index: Arc<SignalIndex>,
    dispatcher: Arc<CommandDispatcher>,
    control: FanControl,
}

impl FanWriter {
    async fn send(&self, signal: &Signal) -> Result<(), BridgeError> {
        self.dispatcher.send_signal(&signal.id).await?;
        debug!(fan = %self.name, signal_id = %signal.id, "signal sent");
        Ok(())
    }
}

#[async_trait]
impl Writable for FanWriter {
    async fn write(&self, value: Value) -> Result<(), BridgeError> {
        match &self.control {
            FanControl::Power => {
                let on = value.as_bool().unwrap_or(true);
                info!(fan = %self.name, on, "power changed");
                if on {
                    return Ok(());
                }
                match self.index.speed_signal(0) {
                    Some(signal) => self.send(signal).await,
                    None => {
                        debug!(fan = %self.name, "no level 0 signal, nothing to send");
                        Ok(())
                    }
                }
            }
            FanControl::Speed => {
                let percent = value.as_f64().unwrap_or_default();
                let level = self.index.level_for(percent);
                info!(fan = %self.name, percent, level, "rotation speed changed");
                match self.index.speed_signal(level) {
                    Some(signal) => self.send(signal).await,
                    None => {
                        error!(fan = %self.name, level, "no signal for target level");
                        Err(BridgeError::Mapping {
                            appliance: self.name.clone(),
                            details: format!("speed level {level} has no signal"),
                        })
                    }
                }
            }
            FanControl::Direction(mode) => {
                let direction = value
                    .as_i64()
                    .and_then(RotationDirection::from_code)
                    .ok_or_else(|| BridgeError::InvalidValue {
                        characteristic: CharacteristicKind::RotationDirection,
                        details: format!("{value:?} is not a rotation direction"),
                    })?;
                info!(fan = %self.name, ?direction, "rotation direction changed");
                self.send(mode.signal_for(direction)).await
            }
        }
    }
}

pub struct FanAccessory {
    info: AccessoryInfo,
    services: Vec<Service>,
    index: Arc<SignalIndex>,
}

impl FanAccessory {
    /// Build the fan from `appliance` and its stored `signals`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Mapping`] when no speed signal exists.
    pub fn new(
        appliance: &RemoteAppliance,
        signals: &[Signal],
        dispatcher: Arc<CommandDispatcher>,
    ) -> Result<Self, BridgeError> {
        let name = appliance.nickname.clone();
        let index = Arc::new(SignalIndex::from_signals(&name, signals)?);
        let writer = |control: FanControl| -> Arc<dyn Writable> {
            Arc::new(FanWriter {
                name: name.clone(),
                index: Arc::clone(&index),
                dispatcher: Arc::clone(&dispatcher),
                control,
            })
        };

        let step = f64::from(index.speed_step());
        let mut service = Service::new(ServiceKind::Fan)
            .with_characteristic(
                Characteristic::new(CharacteristicSchema::new(
                    CharacteristicKind::On,
                    Value::Bool(false),
                ))
                .with_writer(writer(FanControl::Power)),
            )
            .with_characteristic(
                Characteristic::new(
                    CharacteristicSchema::new(CharacteristicKind::RotationSpeed, Value::Float(0.0))
                        .with_range(NumericRange {
                            min: 0.0,
                            max: 100.0,
                            step,
                        }),
                )
                .with_writer(writer(FanControl::Speed)),
            );

        match index.direction_mode() {
            Some(mode) => {
                debug!(fan = %name, ?mode, "rotation direction supported");
                service = service.with_characteristic(
                    Characteristic::new(
                        CharacteristicSchema::new(
                            CharacteristicKind::RotationDirection,
                            Value::Int(RotationDirection::Clockwise.code()),
                        )
                        .with_valid_values(vec![
                            RotationDirection::Clockwise.code(),
                            RotationDirection::CounterClockwise.code(),
                        ]),
                    )
                    .with_writer(writer(FanControl::Direction(mode))),
                );
            }
            None => debug!(fan = %name, "no rotation direction signal"),
        }

        let model = appliance.model.clone().unwrap_or_default();
        Ok(Self {
            info: AccessoryInfo {
                name: name.clone(),
                manufacturer: model.manufacturer,
                model: model.remote_name,
                serial_number: appliance.id.clone(),
                firmware_revision: String::new(),
            },
            services: vec![service],
            index,
        })
    }

    pub fn signal_index(&self) -> &SignalIndex {
        &self.index
    }
}

impl Accessory for FanAccessory {
    fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    fn category(&self) -> AccessoryCategory {
        AccessoryCategory::Fan
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remobridge_remote::{NoDelay, RecordedCommand, StubRemote};
    use remobridge_types::DeviceCore;

    fn signal(id: &str, image: &str) -> Signal {
        Signal {
            id: id.into(),
            name: id.into(),
            image: image.into(),
        }
    }

    fn appliance() -> RemoteAppliance {
        RemoteAppliance {
            id: "fan-1".into(),
            nickname: "Ceiling Fan".into(),
            appliance_type: "IR".into(),
            image: "ico_fan".into(),
            device: DeviceCore::default(),
            model: None,
            settings: None,
            aircon: None,
            signals: vec![],
        }
    }

    fn build(signals: &[Signal]) -> (Arc<StubRemote>, Result<FanAccessory, BridgeError>) {
        let remote = Arc::new(StubRemote::builder().build());
        let dispatcher =
            Arc::new(CommandDispatcher::new(remote.clone()).with_delay_policy(Arc::new(NoDelay)));
        (remote, FanAccessory::new(&appliance(), signals, dispatcher))
    }

    fn sent(remote: &StubRemote) -> Vec<String> {
        remote
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::Signal { signal_id } => Some(signal_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn gapped_levels_with_both_directions() {
        let (remote, fan) = build(&[
            signal("one", "ico_number_1"),
            signal("three", "ico_number_3"),
            signal("fwd", "ico_forward"),
            signal("back", "ico_backward"),
        ]);
        let fan = fan.unwrap();
        assert_eq!(fan.signal_index().max_level(), 3);

        let speed = fan.characteristic(CharacteristicKind::RotationSpeed).unwrap();
        assert_eq!(speed.schema().range.unwrap().step, 33.0);

        let err = speed.write(Value::Int(66)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Mapping { .. }));
        assert!(remote.commands().is_empty());

        speed.write(Value::Int(99)).await.unwrap();
        assert_eq!(sent(&remote), vec!["three"]);

        let direction = fan
            .characteristic(CharacteristicKind::RotationDirection)
            .unwrap();
        direction.write(Value::Int(0)).await.unwrap();
        direction.write(Value::Int(1)).await.unwrap();
        assert_eq!(sent(&remote), vec!["three", "fwd", "back"]);
    }

    #[tokio::test]
    async fn speed_write_dispatches_matching_level() {
        let signals: Vec<_> = (1..=4)
            .map(|n| signal(&format!("s{n}"), &format!("ico_number_{n}")))
            .collect();
        let (remote, fan) = build(&signals);
        let fan = fan.unwrap();
        fan.characteristic(CharacteristicKind::RotationSpeed)
            .unwrap()
            .write(Value::Int(50))
            .await
            .unwrap();
        assert_eq!(sent(&remote), vec!["s2"]);
    }

    #[tokio::test]
    async fn single_direction_signal_is_sent_for_both_directions() {
        let (remote, fan) = build(&[signal("one", "ico_number_1"), signal("fwd", "ico_forward")]);
        let direction = fan
            .unwrap()
            .characteristic(CharacteristicKind::RotationDirection)
            .cloned()
            .unwrap();
        direction.write(Value::Int(0)).await.unwrap();
        direction.write(Value::Int(1)).await.unwrap();
        assert_eq!(sent(&remote), vec!["fwd", "fwd"]);
    }

    #[tokio::test]
    async fn direction_is_omitted_without_direction_signals() {
        let (_remote, fan) = build(&[signal("one", "ico_number_1")]);
        assert!(
            fan.unwrap()
                .characteristic(CharacteristicKind::RotationDirection)
                .is_none()
        );
    }

    #[tokio::test]
    async fn power_off_sends_level_zero_when_present() {
        let (remote, fan) = build(&[
            signal("off", "ico_number_0"),
            signal("one", "ico_number_1"),
            signal("two", "ico_number_2"),
        ]);
        let fan = fan.unwrap();
        let on = fan.characteristic(CharacteristicKind::On).unwrap();
        on.write(Value::Bool(true)).await.unwrap();
        assert!(remote.commands().is_empty());
        on.write(Value::Bool(false)).await.unwrap();
        assert_eq!(sent(&remote), vec!["off"]);
        assert_eq!(fan.signal_index().speed_step(), 50);
    }

    #[tokio::test]
    async fn power_off_without_level_zero_is_a_no_op() {
        let (remote, fan) = build(&[signal("one", "ico_number_1")]);
        let fan = fan.unwrap();
        fan.characteristic(CharacteristicKind::On)
            .unwrap()
            .write(Value::Bool(false))
            .await
            .unwrap();
        assert!(remote.commands().is_empty());
    }

    #[test]
    fn fan_without_speed_signals_fails_construction() {
        let (_remote, fan) = build(&[signal("fwd", "ico_forward")]);
        assert!(matches!(fan, Err(BridgeError::Mapping { .. })));
    }
}
