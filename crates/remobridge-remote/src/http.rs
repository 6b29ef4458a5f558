//! [`NatureClient`] – thin HTTP implementation of [`RemoteApi`].
//!
//! Only the five endpoints the bridge needs are covered.  Every request is
//! authenticated with the bearer token from the bridge configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use remobridge_remote::{NatureClient, RemoteApi};
//!
//! # async fn run() -> Result<(), remobridge_remote::RemoteError> {
//! let client = NatureClient::new("secret-token");
//! let devices = client.list_devices().await?;
//! println!("{} device(s)", devices.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use remobridge_types::{RemoteAppliance, RemoteDevice, SettingsDelta, Signal};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{RemoteApi, RemoteError};

/// Production base URL of the cloud API.
pub const DEFAULT_BASE_URL: &str = "https://api.nature.global";

/// Async client for the cloud smart-remote API.
///
/// Construct once at startup and share behind an `Arc<dyn RemoteApi>`.
pub struct NatureClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl NatureClient {
    /// Create a client for the production API authenticated with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (builder-style).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        debug!(path, "GET");
        let body = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(), RemoteError> {
        debug!(path, fields = form.len(), "POST");
        self.client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Form fields for an air-conditioner settings update.
pub(crate) fn settings_form(delta: &SettingsDelta) -> Vec<(&'static str, &str)> {
    let mut form = Vec::new();
    if let Some(mode) = delta.operation_mode {
        form.push(("operation_mode", mode.as_str()));
    }
    if let Some(temperature) = delta.temperature.as_deref() {
        form.push(("temperature", temperature));
    }
    if let Some(button) = delta.button.as_deref() {
        form.push(("button", button));
    }
    form
}

#[async_trait]
impl RemoteApi for NatureClient {
    async fn list_devices(&self) -> Result<Vec<RemoteDevice>, RemoteError> {
        self.get_json("/1/devices").await
    }

    async fn list_appliances(&self) -> Result<Vec<RemoteAppliance>, RemoteError> {
        self.get_json("/1/appliances").await
    }

    async fn update_aircon_settings(
        &self,
        appliance_id: &str,
        delta: &SettingsDelta,
    ) -> Result<(), RemoteError> {
        let path = format!("/1/appliances/{appliance_id}/aircon_settings");
        self.post_form(&path, &settings_form(delta)).await
    }

    async fn send_signal(&self, signal_id: &str) -> Result<(), RemoteError> {
        let path = format!("/1/signals/{signal_id}/send");
        self.post_form(&path, &[]).await
    }

    async fn list_signals(&self, appliance_id: &str) -> Result<Vec<Signal>, RemoteError> {
        self.get_json(&format!("/1/appliances/{appliance_id}/signals"))
            .await
    }
}
