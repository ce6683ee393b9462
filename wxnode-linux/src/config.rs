//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use wxnode_core::LinkConfig;

/// Host configuration. File: `--config <path>`, else ~/.config/wxnode/config.toml
/// or /etc/wxnode/config.toml.
/// Env overrides: WXNODE_CHANNEL, WXNODE_BASE_PORT, WXNODE_DEVICE_NAME.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub radio: RadioConfig,
}

/// UDP radio simulation and host scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadioConfig {
    /// Address every channel socket binds to (default 127.0.0.1).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: Ipv4Addr,
    /// Channel N listens on base_port + N (default 47000). 0 picks ephemeral ports.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_sensor_interval_ms")]
    pub sensor_interval_ms: u64,
    #[serde(default = "default_weather_request_interval_ms")]
    pub weather_request_interval_ms: u64,
}

fn default_bind_addr() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}
fn default_base_port() -> u16 {
    47000
}
fn default_tick_interval_ms() -> u64 {
    50
}
fn default_sensor_interval_ms() -> u64 {
    10_000
}
fn default_weather_request_interval_ms() -> u64 {
    10 * 60 * 1000
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_port: default_base_port(),
            tick_interval_ms: default_tick_interval_ms(),
            sensor_interval_ms: default_sensor_interval_ms(),
            weather_request_interval_ms: default_weather_request_interval_ms(),
        }
    }
}

impl RadioConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }

    pub fn weather_request_interval(&self) -> Duration {
        Duration::from_millis(self.weather_request_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load config: default, then config file (if present), then env vars.
/// An explicit path must exist; the default paths are optional.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match explicit {
        Some(path) => read_file(path)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(path) => read_file(&path)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(ch) = var("WXNODE_CHANNEL").and_then(|s| s.parse::<u8>().ok()) {
        c.link.initial_channel = ch;
    }
    if let Some(p) = var("WXNODE_BASE_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.radio.base_port = p;
    }
    if let Some(name) = var("WXNODE_DEVICE_NAME").filter(|s| !s.is_empty()) {
        c.link.device_name = name;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/wxnode/config.toml"));
    }
    out.push(PathBuf::from("/etc/wxnode/config.toml"));
    out
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
