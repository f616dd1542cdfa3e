//! Session configuration: an optional JSON file overlaid by environment variables.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::match_state::DEFAULT_MATCH_DURATION_SECS;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QR_HUNT_CONFIG_PATH";
const DEFAULT_PORT: u16 = 8080;

/// What this session is allowed to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Runs the match timer and may call the admin routes.
    #[default]
    Admin,
    /// Registers and scans only; never ticks the timer.
    Player,
}

impl FromStr for SessionRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(SessionRole::Admin),
            "player" => Ok(SessionRole::Player),
            other => Err(format!("unknown session role `{other}`")),
        }
    }
}

/// Remote document store backing the shared match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local only.
    #[default]
    None,
    /// CouchDB, behind the `couch-store` feature.
    Couch,
    /// MongoDB, behind the `mongo-store` feature.
    Mongo,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(StoreBackend::None),
            "couch" | "couchdb" => Ok(StoreBackend::Couch),
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Admin or player session.
    pub role: SessionRole,
    /// Initial and reset value of the countdown.
    pub match_duration_secs: u32,
    /// Backend the supervisor connects to.
    pub store: StoreBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            role: SessionRole::default(),
            match_duration_secs: DEFAULT_MATCH_DURATION_SECS,
            store: StoreBackend::default(),
        }
    }
}

impl AppConfig {
    /// Load the configuration file (if any), then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_overrides(|key| env::var(key).ok());
        info!(
            port = config.port,
            role = ?config.role,
            duration = config.match_duration_secs,
            store = ?config.store,
            "configuration loaded"
        );
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded config file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Overlay values found through `lookup`. Unparsable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parsed(&lookup, "PORT").or_else(|| parsed(&lookup, "SERVER_PORT")) {
            self.port = port;
        }
        if let Some(role) = parsed(&lookup, "QR_HUNT_ROLE") {
            self.role = role;
        }
        if let Some(seconds) = parsed::<u32, _>(&lookup, "QR_HUNT_MATCH_DURATION_SECS") {
            if seconds == 0 {
                warn!("ignoring zero match duration");
            } else {
                self.match_duration_secs = seconds;
            }
        }
        if let Some(store) = parsed(&lookup, "QR_HUNT_STORE") {
            self.store = store;
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key, value = %value, error = %err, "ignoring invalid environment override");
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    role: Option<SessionRole>,
    match_duration_secs: Option<u32>,
    store: Option<StoreBackend>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            port: value.port.unwrap_or(defaults.port),
            role: value.role.unwrap_or(defaults.role),
            match_duration_secs: value
                .match_duration_secs
                .filter(|seconds| *seconds > 0)
                .unwrap_or(defaults.match_duration_secs),
            store: value.store.unwrap_or(defaults.store),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
