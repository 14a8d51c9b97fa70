use super::types::{EngineSettings, WebSettings};
use crate::error_handling::types::ConfigError;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;

/// Application configuration loaded from a TOML file.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration. Values are range-checked on load; a failing check
/// is a [`ConfigError`], never a panic.
///
/// ```toml
/// [engine]
/// proximity_window_ms = 2000
/// orphan_grace_ms = 500
/// queue_capacity = 1024
/// max_sessions = 50
///
/// [web]
/// enabled = true
/// bind_address = "127.0.0.1"
/// port = 9380
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub web: WebSettings,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "engine.proximity_window_ms",
            self.engine.proximity_window_ms,
            1,
            60_000,
        )?;
        check_range("engine.orphan_grace_ms", self.engine.orphan_grace_ms, 0, 10_000)?;
        check_range(
            "engine.queue_capacity",
            self.engine.queue_capacity as u64,
            1,
            1_000_000,
        )?;
        check_range("engine.max_sessions", self.engine.max_sessions as u64, 1, 10_000)?;

        if self.web.enabled {
            if self.web.bind_address.parse::<IpAddr>().is_err() {
                return Err(ConfigError::BadAddress(self.web.bind_address.clone()));
            }
            if self.web.port < 1024 {
                return Err(ConfigError::NotInRange(format!(
                    "web.port = {} (expected 1024..=65535)",
                    self.web.port
                )));
            }
        }
        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::NotInRange(format!(
            "{} = {} (expected {}..={})",
            name, value, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.proximity_window_ms, 2_000);
        assert_eq!(config.engine.orphan_grace_ms, 500);
        assert_eq!(config.engine.max_sessions, 50);
        assert!(config.web.enabled);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").expect("empty config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            [engine]
            proximity_window_ms = 750

            [web]
            enabled = false
            "#,
        )
        .expect("partial config");
        assert_eq!(config.engine.proximity_window_ms, 750);
        assert_eq!(config.engine.queue_capacity, 1_024);
        assert!(!config.web.enabled);
    }

    #[test]
    fn from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[engine]\nmax_sessions = 3\n[web]\nport = 9999").expect("write");
        let config = Config::from_file(file.path()).expect("load");
        assert_eq!(config.engine.max_sessions, 3);
        assert_eq!(config.web.port, 9999);
    }

    #[test]
    fn rejects_out_of_range_window() {
        let err = Config::from_toml("[engine]\nproximity_window_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn rejects_privileged_port() {
        let err = Config::from_toml("[web]\nport = 80").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn rejects_bad_bind_address() {
        let err = Config::from_toml("[web]\nbind_address = \"not-an-ip\"").unwrap_err();
        assert!(matches!(err, ConfigError::BadAddress(_)));
    }

    #[test]
    fn disabled_web_skips_address_checks() {
        let config = Config::from_toml("[web]\nenabled = false\nport = 80").expect("config");
        assert!(!config.web.enabled);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::from_toml("[engine").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }
}
