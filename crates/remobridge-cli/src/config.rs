//! Bridge configuration – reads `~/.remobridge/config.toml` and prepares the
//! state directory.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use remobridge_remote::http::DEFAULT_BASE_URL;
use remobridge_server::DEFAULT_PORT;

/// Pairing codes are exactly eight digits.
const PIN_PATTERN: &str = "^[0-9]{8}$";

/// Persisted bridge configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Cloud API access token.
    #[serde(default)]
    pub token: String,

    /// Bridge name shown to controllers.
    #[serde(default = "default_name")]
    pub name: String,

    /// Eight-digit pairing code.
    #[serde(default = "default_pin")]
    pub pin: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "token",
                if self.token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("name", &self.name)
            .field("pin", &self.pin)
            .field("port", &self.port)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn default_name() -> String {
    "remobridge".to_string()
}
fn default_pin() -> String {
    "12344321".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            name: default_name(),
            pin: default_pin(),
            port: default_port(),
            api_base_url: default_api_base_url(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// `~/.remobridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// `~/.remobridge/db`, the bridge's state directory.
pub fn store_path() -> PathBuf {
    store_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".remobridge").join("config.toml")
}

pub(crate) fn store_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".remobridge").join("db")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `REMOBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REMOBRIDGE_TOKEN` | `token` |
/// | `REMOBRIDGE_NAME` | `name` |
/// | `REMOBRIDGE_PIN` | `pin` |
/// | `REMOBRIDGE_PORT` | `port` |
/// | `REMOBRIDGE_API_BASE_URL` | `api_base_url` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REMOBRIDGE_TOKEN") {
        cfg.token = v;
    }
    if let Ok(v) = std::env::var("REMOBRIDGE_NAME") {
        cfg.name = v;
    }
    if let Ok(v) = std::env::var("REMOBRIDGE_PIN") {
        cfg.pin = v;
    }
    if let Ok(v) = std::env::var("REMOBRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("REMOBRIDGE_API_BASE_URL") {
        cfg.api_base_url = v;
    }
}

/// Reject anything but an eight-digit pairing code.
pub fn validate_pin(pin: &str) -> Result<(), String> {
    let pattern = Regex::new(PIN_PATTERN).map_err(|e| format!("Bad pin pattern: {}", e))?;
    if pattern.is_match(pin) {
        Ok(())
    } else {
        Err(format!("Invalid pin {:?}: expected exactly 8 digits", pin))
    }
}

/// Create `dir` (and parents) restricted to the owner on Unix.
pub fn create_private_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}

/// Remove the state directory so the bridge starts from scratch.
pub fn reset_store(dir: &Path) -> Result<(), String> {
    if !dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(dir).map_err(|e| format!("Failed to reset {}: {}", dir.display(), e))
}
