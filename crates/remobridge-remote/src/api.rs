//! The remote-API collaborator contract.
//!
//! The bridge never speaks HTTP directly.  It calls [`RemoteApi`], which is
//! implemented by [`NatureClient`][crate::http::NatureClient] in production
//! and by [`StubRemote`][crate::stub::StubRemote] in tests.

use async_trait::async_trait;
use remobridge_types::{BridgeError, RemoteAppliance, RemoteDevice, SettingsDelta, Signal};
use thiserror::Error;

/// Errors produced by a [`RemoteApi`] implementation.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The HTTP request failed or the API answered with an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The remote could not be reached for a reason other than HTTP.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

impl From<RemoteError> for BridgeError {
    fn from(err: RemoteError) -> Self {
        BridgeError::Remote(err.to_string())
    }
}

/// Typed RPC surface of the cloud smart-remote API.
///
/// # Contract
///
/// * `list_devices` / `list_appliances` – full snapshots; callers cache them.
/// * `update_aircon_settings` – apply a partial settings change to one
///   air conditioner.
/// * `send_signal` – replay one stored infrared signal.
/// * `list_signals` – stored signals of one appliance.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<RemoteDevice>, RemoteError>;

    async fn list_appliances(&self) -> Result<Vec<RemoteAppliance>, RemoteError>;

    async fn update_aircon_settings(
        &self,
        appliance_id: &str,
        delta: &SettingsDelta,
    ) -> Result<(), RemoteError>;

    async fn send_signal(&self, signal_id: &str) -> Result<(), RemoteError>;

    async fn list_signals(&self, appliance_id: &str) -> Result<Vec<Signal>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_converts_to_bridge_error() {
        let err: BridgeError = RemoteError::Unavailable("timeout".to_string()).into();
        assert_eq!(err, BridgeError::Remote("Remote unavailable: timeout".to_string()));
    }
}
