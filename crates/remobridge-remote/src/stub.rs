//! In-process test doubles: [`StubRemote`] and [`ManualClock`].
//!
//! `StubRemote` serves canned snapshots, counts fetches and records every
//! command it receives so tests can assert on what would have reached the
//! cloud.  Failure modes are toggled at runtime.
//!
//! # Example
//!
//! ```rust
//! use remobridge_remote::StubRemote;
//!
//! let remote = StubRemote::builder().build();
//! assert_eq!(remote.device_fetches(), 0);
//! assert!(remote.commands().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use remobridge_types::{RemoteAppliance, RemoteDevice, SettingsDelta, Signal};

use crate::api::{RemoteApi, RemoteError};
use crate::cache::Clock;

/// A command observed by [`StubRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Settings {
        appliance_id: String,
        delta: SettingsDelta,
    },
    Signal {
        signal_id: String,
    },
}

#[derive(Default)]
struct StubState {
    devices: Vec<RemoteDevice>,
    appliances: Vec<RemoteAppliance>,
    signals: HashMap<String, Vec<Signal>>,
    commands: Vec<RecordedCommand>,
    appliance_failure: Option<String>,
}

/// Scriptable [`RemoteApi`] double.
#[derive(Default)]
pub struct StubRemote {
    state: Mutex<StubState>,
    fail_fetches: AtomicBool,
    fail_commands: AtomicBool,
    device_fetches: AtomicUsize,
    appliance_fetches: AtomicUsize,
}

impl StubRemote {
    pub fn builder() -> StubRemoteBuilder {
        StubRemoteBuilder::default()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_devices(&self, devices: Vec<RemoteDevice>) {
        self.state().devices = devices;
    }

    pub fn set_appliances(&self, appliances: Vec<RemoteAppliance>) {
        self.state().appliances = appliances;
    }

    /// Make every subsequent `list_*` call fail (or succeed again).
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Fail only `list_appliances` with [`RemoteError::Unavailable`] carrying
    /// `reason`; `None` restores it.
    pub fn set_appliance_failure(&self, reason: Option<&str>) {
        self.state().appliance_failure = reason.map(str::to_string);
    }

    /// Make every subsequent command fail (or succeed again).
    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn device_fetches(&self) -> usize {
        self.device_fetches.load(Ordering::SeqCst)
    }

    pub fn appliance_fetches(&self) -> usize {
        self.appliance_fetches.load(Ordering::SeqCst)
    }

    /// Commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    fn check_fetch(&self) -> Result<(), RemoteError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("stub fetch failure".into()));
        }
        Ok(())
    }

    fn check_command(&self) -> Result<(), RemoteError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("stub command failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for StubRemote {
    async fn list_devices(&self) -> Result<Vec<RemoteDevice>, RemoteError> {
        self.device_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch()?;
        Ok(self.state().devices.clone())
    }

    async fn list_appliances(&self) -> Result<Vec<RemoteAppliance>, RemoteError> {
        self.appliance_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch()?;
        let state = self.state();
        if let Some(reason) = &state.appliance_failure {
            return Err(RemoteError::Unavailable(reason.clone()));
        }
        Ok(state.appliances.clone())
    }

    async fn update_aircon_settings(
        &self,
        appliance_id: &str,
        delta: &SettingsDelta,
    ) -> Result<(), RemoteError> {
        self.check_command()?;
        self.state().commands.push(RecordedCommand::Settings {
            appliance_id: appliance_id.to_string(),
            delta: delta.clone(),
        });
        Ok(())
    }

    async fn send_signal(&self, signal_id: &str) -> Result<(), RemoteError> {
        self.check_command()?;
        self.state().commands.push(RecordedCommand::Signal {
            signal_id: signal_id.to_string(),
        });
        Ok(())
    }

    async fn list_signals(&self, appliance_id: &str) -> Result<Vec<Signal>, RemoteError> {
        self.check_fetch()?;
        Ok(self
            .state()
            .signals
            .get(appliance_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Builder for [`StubRemote`].
#[derive(Default)]
pub struct StubRemoteBuilder {
    state: StubState,
}

impl StubRemoteBuilder {
    pub fn with_device(mut self, device: RemoteDevice) -> Self {
        self.state.devices.push(device);
        self
    }

    pub fn with_appliance(mut self, appliance: RemoteAppliance) -> Self {
        self.state.appliances.push(appliance);
        self
    }

    /// Signals served by `list_signals` for `appliance_id`.
    pub fn with_signals(mut self, appliance_id: impl Into<String>, signals: Vec<Signal>) -> Self {
        self.state.signals.insert(appliance_id.into(), signals);
        self
    }

    pub fn build(self) -> StubRemote {
        StubRemote {
            state: Mutex::new(self.state),
            ..StubRemote::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ManualClock
// ─────────────────────────────────────────────────────────────────────────────

/// A [`Clock`] that only moves when told to.
///
/// Starts at 2024-01-01T00:00:00Z.
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
