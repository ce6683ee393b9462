//! Link tuning. Every field has a default; hosts override them from TOML.

use std::time::Duration;

use serde::Deserialize;

use crate::chunk::DEFAULT_MAX_ASSEMBLED_BYTES;
use crate::pipeline::DEFAULT_QUEUE_DEPTH;
use crate::protocol::{DEFAULT_CHANNEL, MAX_SCAN_CHANNEL, MIN_SCAN_CHANNEL};
use crate::weather::{self, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};

/// Timing, queue and identity settings for `SlaveNode`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Channel used at start; 0 means the first scan channel.
    #[serde(default = "default_initial_channel")]
    pub initial_channel: u8,
    #[serde(default = "default_min_channel")]
    pub min_channel: u8,
    #[serde(default = "default_max_channel")]
    pub max_channel: u8,
    /// Dwell time per channel while scanning.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Silence after which the master is considered gone.
    #[serde(default = "default_master_timeout_ms")]
    pub master_timeout_ms: u64,
    /// Re-announce period while bound.
    #[serde(default = "default_hello_interval_ms")]
    pub hello_interval_ms: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_max_assembled_bytes")]
    pub max_assembled_bytes: usize,
    /// Sent in the Identity record (at most 23 bytes survive).
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

fn default_initial_channel() -> u8 {
    DEFAULT_CHANNEL
}
fn default_min_channel() -> u8 {
    MIN_SCAN_CHANNEL
}
fn default_max_channel() -> u8 {
    MAX_SCAN_CHANNEL
}
fn default_scan_interval_ms() -> u64 {
    300
}
fn default_master_timeout_ms() -> u64 {
    12_000
}
fn default_hello_interval_ms() -> u64 {
    7_000
}
fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}
fn default_max_assembled_bytes() -> usize {
    DEFAULT_MAX_ASSEMBLED_BYTES
}
fn default_device_name() -> String {
    "wxnode".to_string()
}
fn default_latitude() -> f64 {
    DEFAULT_LATITUDE
}
fn default_longitude() -> f64 {
    DEFAULT_LONGITUDE
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            initial_channel: default_initial_channel(),
            min_channel: default_min_channel(),
            max_channel: default_max_channel(),
            scan_interval_ms: default_scan_interval_ms(),
            master_timeout_ms: default_master_timeout_ms(),
            hello_interval_ms: default_hello_interval_ms(),
            queue_depth: default_queue_depth(),
            max_assembled_bytes: default_max_assembled_bytes(),
            device_name: default_device_name(),
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

impl LinkConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn master_timeout(&self) -> Duration {
        Duration::from_millis(self.master_timeout_ms)
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    /// URL the master fetches for this node's location.
    pub fn weather_url(&self) -> String {
        weather::current_weather_url(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_constants() {
        let c = LinkConfig::default();
        assert_eq!(c.initial_channel, 1);
        assert_eq!((c.min_channel, c.max_channel), (1, 13));
        assert_eq!(c.scan_interval(), Duration::from_millis(300));
        assert_eq!(c.master_timeout(), Duration::from_secs(12));
        assert_eq!(c.hello_interval(), Duration::from_secs(7));
        assert_eq!(c.queue_depth, 10);
        assert_eq!(c.max_assembled_bytes, 1024);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: LinkConfig = toml::from_str("initial_channel = 6\ndevice_name = \"porch\"").unwrap();
        assert_eq!(c.initial_channel, 6);
        assert_eq!(c.device_name, "porch");
        assert_eq!(c.hello_interval_ms, 7_000);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<LinkConfig>("channel = 6").is_err());
    }

    #[test]
    fn weather_url_uses_coordinates() {
        let c = LinkConfig {
            latitude: 0.5,
            longitude: 101.25,
            ..LinkConfig::default()
        };
        assert!(c
            .weather_url()
            .ends_with("latitude=0.5000000&longitude=101.2500000&current_weather=true"));
    }
}
