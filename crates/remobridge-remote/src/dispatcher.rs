//! Jittered command dispatch.
//!
//! A scene that switches several accessories at once would otherwise fire a
//! burst of requests at the cloud API.  [`CommandDispatcher`] waits a delay
//! drawn from a [`DelayPolicy`] before each call, spreading the burst out.
//! The wait happens on the calling task; nothing is locked while it sleeps.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use remobridge_types::{BridgeError, SettingsDelta};
use tracing::{debug, error};

use crate::api::RemoteApi;

/// Supplies the delay to wait before each outgoing command.
pub trait DelayPolicy: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Uniform random delay in `[0, max)`.
#[derive(Debug, Clone, Copy)]
pub struct UniformJitter {
    max: Duration,
}

impl UniformJitter {
    pub const DEFAULT_MAX: Duration = Duration::from_secs(5);

    pub fn new(max: Duration) -> Self {
        Self { max }
    }
}

impl Default for UniformJitter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX)
    }
}

impl DelayPolicy for UniformJitter {
    fn next_delay(&self) -> Duration {
        let max_ms = self.max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// Sends immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayPolicy for NoDelay {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Sends settings updates and infrared signals through a [`RemoteApi`].
///
/// Failures are returned to the caller as [`BridgeError::Remote`] and are not
/// retried.
pub struct CommandDispatcher {
    api: Arc<dyn RemoteApi>,
    delay: Arc<dyn DelayPolicy>,
}

impl CommandDispatcher {
    /// Dispatcher using [`UniformJitter`] with its default bound.
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            delay: Arc::new(UniformJitter::default()),
        }
    }

    pub fn with_delay_policy(mut self, delay: Arc<dyn DelayPolicy>) -> Self {
        self.delay = delay;
        self
    }

    async fn wait(&self) {
        let delay = self.delay.next_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "delaying remote command");
            tokio::time::sleep(delay).await;
        }
    }

    /// Apply a partial settings change to one air conditioner.
    pub async fn send_appliance_command(
        &self,
        appliance_id: &str,
        delta: &SettingsDelta,
    ) -> Result<(), BridgeError> {
        self.wait().await;
        debug!(appliance_id, ?delta, "sending settings update");
        self.api
            .update_aircon_settings(appliance_id, delta)
            .await
            .map_err(|err| {
                error!(appliance_id, error = %err, "settings update failed");
                BridgeError::from(err)
            })
    }

    /// Replay one stored infrared signal.
    pub async fn send_signal(&self, signal_id: &str) -> Result<(), BridgeError> {
        self.wait().await;
        debug!(signal_id, "sending signal");
        self.api.send_signal(signal_id).await.map_err(|err| {
            error!(signal_id, error = %err, "signal send failed");
            BridgeError::from(err)
        })
    }
}
