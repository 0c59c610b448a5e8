//! Minimal runtime configuration helpers.
//! Defaults match a local setup reading the `rdp_cdev` character device.

use crate::services::reader::{DEFAULT_INTERVAL, DEFAULT_PROGRESS_EVERY, ReaderSettings};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "rdp.sqlite3";
pub const DEFAULT_DEVICE_PATH: &str = "/dev/rdp_cdev";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path (or `:memory:`).
    pub database_url: String,
    pub device_path: PathBuf,
    pub read_interval: Duration,
    pub progress_every: NonZeroU32,
    /// Allow running without the acquisition thread.
    pub reader_enabled: bool,
    pub seed_demo_devices: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_blank("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let device_path = non_blank("RDP_DEVICE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_PATH));

        let read_interval = match non_blank("READ_INTERVAL_MS") {
            Some(s) => Duration::from_millis(
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| "READ_INTERVAL_MS must be a whole number of milliseconds".to_string())?,
            ),
            None => DEFAULT_INTERVAL,
        };

        let progress_every = match non_blank("PROGRESS_EVERY") {
            Some(s) => s
                .trim()
                .parse::<NonZeroU32>()
                .map_err(|_| "PROGRESS_EVERY must be a positive integer".to_string())?,
            None => DEFAULT_PROGRESS_EVERY,
        };

        let flag = |key: &str, default: bool| {
            non_blank(key)
                .map(|s| matches!(s.trim(), "1" | "true" | "TRUE"))
                .unwrap_or(default)
        };

        Ok(Config {
            database_url,
            device_path,
            read_interval,
            progress_every,
            reader_enabled: flag("READER_ENABLED", true),
            seed_demo_devices: flag("SEED_DEMO_DEVICES", true),
        })
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            interval: self.read_interval,
            progress_every: self.progress_every,
            seed_demo_devices: self.seed_demo_devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config_with(&[]).unwrap();
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.device_path, PathBuf::from(DEFAULT_DEVICE_PATH));
        assert_eq!(cfg.read_interval, Duration::from_millis(100));
        assert_eq!(cfg.progress_every.get(), 100);
        assert!(cfg.reader_enabled);
        assert!(cfg.seed_demo_devices);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config_with(&[
            ("DATABASE_URL", "/tmp/x.db"),
            ("RDP_DEVICE", "/tmp/cdev"),
            ("READ_INTERVAL_MS", "5"),
            ("PROGRESS_EVERY", "10"),
            ("READER_ENABLED", "false"),
            ("SEED_DEMO_DEVICES", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url, "/tmp/x.db");
        assert_eq!(cfg.device_path, PathBuf::from("/tmp/cdev"));
        let settings = cfg.reader_settings();
        assert_eq!(settings.interval, Duration::from_millis(5));
        assert_eq!(settings.progress_every.get(), 10);
        assert!(!settings.seed_demo_devices);
        assert!(!cfg.reader_enabled);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config_with(&[("DATABASE_URL", "  "), ("READ_INTERVAL_MS", "")]).unwrap();
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.read_interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config_with(&[("READ_INTERVAL_MS", "fast")]).is_err());
        assert!(config_with(&[("PROGRESS_EVERY", "0")]).is_err());
    }
}
