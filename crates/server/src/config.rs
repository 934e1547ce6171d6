use std::{fs, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;
use turns::CoordinatorConfig;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub turn_duration_seconds: u64,
    pub remove_enabled: bool,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            turn_duration_seconds: turns::DEFAULT_TURN_DURATION.as_secs(),
            remove_enabled: true,
            event_buffer: 256,
        }
    }
}

impl Settings {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            turn_duration: Duration::from_secs(self.turn_duration_seconds),
            remove_enabled: self.remove_enabled,
        }
    }
}

/// File keys as written in `server.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    turn_duration_seconds: Option<u64>,
    remove_enabled: Option<bool>,
    event_buffer: Option<usize>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let file = match fs::read_to_string(SETTINGS_FILE) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {SETTINGS_FILE}"));
        }
    };
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml`, then environment variables.
pub fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        let file_cfg: FileSettings =
            toml::from_str(raw).with_context(|| format!("invalid {SETTINGS_FILE}"))?;
        if let Some(v) = file_cfg.bind_addr {
            settings.server_bind = v;
        }
        if let Some(v) = file_cfg.turn_duration_seconds {
            settings.turn_duration_seconds = v;
        }
        if let Some(v) = file_cfg.remove_enabled {
            settings.remove_enabled = v;
        }
        if let Some(v) = file_cfg.event_buffer {
            settings.event_buffer = v;
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = parsed_env(&env, "APP__TURN_DURATION_SECONDS") {
        settings.turn_duration_seconds = v;
    }
    if let Some(v) = parsed_env(&env, "APP__REMOVE_ENABLED") {
        settings.remove_enabled = v;
    }
    if let Some(v) = parsed_env(&env, "APP__EVENT_BUFFER") {
        settings.event_buffer = v;
    }

    anyhow::ensure!(
        settings.turn_duration_seconds > 0,
        "turn duration must be at least one second"
    );
    anyhow::ensure!(settings.event_buffer > 0, "event buffer must not be empty");
    Ok(settings)
}

fn parsed_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(%key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
