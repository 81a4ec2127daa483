//! # Configuration Management
//!
//! This module loads and saves the device configuration as `tide-config.toml`
//! and converts it from a parsed `config.h`. It is the Rust face of the eight
//! constants the firmware is built with:
//!
//! | Macro | Field |
//! |---|---|
//! | `CFG_WIFI_SSID` | `wifi.ssid` |
//! | `CFG_WIFI_PASSWORD` | `wifi.password` |
//! | `LATITUDE` / `LONGITUDE` | `location.latitude` / `location.longitude` |
//! | `TIMEZONE` | `location.timezone` |
//! | `TIMEZONE_POSIX` | `location.timezone_posix` (derived when omitted) |
//! | `TIDE_STATION` | `stations.tide` |
//! | `BUOY_STATION` | `stations.buoy` |
//!
//! Credentials can be kept out of the file entirely: `TIDE_WIFI_SSID` and
//! `TIDE_WIFI_PASSWORD` override whatever the file holds.

use crate::header::{self, HeaderError};
use crate::secrets::Secret;
use crate::timezone::{self, TimezoneError};
use crate::{GeoPosition, StationId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "tide-config.toml";

/// Environment variable overriding `wifi.ssid`.
pub const ENV_WIFI_SSID: &str = "TIDE_WIFI_SSID";

/// Environment variable overriding `wifi.password`.
pub const ENV_WIFI_PASSWORD: &str = "TIDE_WIFI_PASSWORD";

/// Errors that can occur while loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config file format: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config header: {0}")]
    Header(#[from] HeaderError),

    #[error("timezone: {0}")]
    Timezone(#[from] TimezoneError),
}

/// Device configuration loaded from tide-config.toml or config.h
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Wireless network the device joins
    pub wifi: WifiConfig,
    /// Fixed position and local time rules
    pub location: LocationConfig,
    /// Data sources polled by the firmware
    pub stations: StationsConfig,
}

/// Wi-Fi station credentials
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WifiConfig {
    /// Network name (`CFG_WIFI_SSID`)
    pub ssid: String,
    /// WPA passphrase (`CFG_WIFI_PASSWORD`); empty for an open network
    #[serde(default)]
    pub password: Secret,
}

/// Geographic position and timezone
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LocationConfig {
    /// Degrees north (`LATITUDE`)
    pub latitude: f64,
    /// Degrees east (`LONGITUDE`)
    pub longitude: f64,
    /// IANA zone name (`TIMEZONE`)
    pub timezone: String,
    /// POSIX rule for `tzset()` (`TIMEZONE_POSIX`); derived from `timezone` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_posix: Option<String>,
}

/// Tide gauge and buoy identifiers
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StationsConfig {
    /// NOAA CO-OPS tide station (`TIDE_STATION`)
    pub tide: StationId,
    /// NDBC buoy station (`BUOY_STATION`)
    pub buoy: StationId,
}

impl Default for Config {
    fn default() -> Self {
        Config::example()
    }
}

impl Config {
    /// The values shipped in `config.example.h`: placeholder credentials,
    /// Santa Cruz, CA, the Monterey tide gauge and the Monterey Bay buoy.
    pub fn example() -> Self {
        Config {
            wifi: WifiConfig {
                ssid: "YOUR_WIFI_SSID".to_string(),
                password: Secret::new("YOUR_WIFI_PASSWORD"),
            },
            location: LocationConfig {
                latitude: 36.97,
                longitude: -122.01,
                timezone: "America/Los_Angeles".to_string(),
                timezone_posix: Some("PST8PDT,M3.2.0,M11.1.0".to_string()),
            },
            stations: StationsConfig {
                tide: StationId::from("9413450"),
                buoy: StationId::from("46236"),
            },
        }
    }

    /// Load configuration from the specified TOML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Config>(contents)?)
    }

    /// Load configuration from the specified path.
    /// Falls back to the example configuration if the file doesn't exist or is invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_path(&path) {
            Ok(config) => {
                eprintln!(
                    "Loaded configuration for tide station {} / buoy {}",
                    config.stations.tide, config.stations.buoy
                );
                config
            }
            Err(ConfigError::Io(_)) => {
                eprintln!("Info: No config file found, using example configuration");
                Self::default()
            }
            Err(e) => {
                eprintln!("Warning: {}", e);
                eprintln!("Using example configuration");
                Self::default()
            }
        }
    }

    /// Load from either a TOML file or a C header, chosen by extension.
    pub fn load_any<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("h") => Self::from_header_file(path),
            _ => Self::load_from_path(path),
        }
    }

    /// Build a configuration from the text of a `config.h`.
    pub fn from_header_str(text: &str) -> Result<Self, ConfigError> {
        Ok(header::parse(text)?.to_config()?)
    }

    pub fn from_header_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_header_str(&text)
    }

    /// Replace credentials from `TIDE_WIFI_SSID` / `TIDE_WIFI_PASSWORD`.
    ///
    /// Takes the variables as pairs so callers can pass `std::env::vars()`.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            match key.as_ref() {
                ENV_WIFI_SSID => self.wifi.ssid = value.into(),
                ENV_WIFI_PASSWORD => self.wifi.password = Secret::new(value),
                _ => {}
            }
        }
        self
    }

    /// Save current configuration as pretty TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(())
    }

    pub fn position(&self) -> GeoPosition {
        GeoPosition {
            latitude: self.location.latitude,
            longitude: self.location.longitude,
        }
    }

    /// The POSIX TZ string the firmware will use: the configured one, or one
    /// derived from the IANA name for `year`.
    pub fn effective_posix(&self, year: i32) -> Result<String, ConfigError> {
        match &self.location.timezone_posix {
            Some(posix) => Ok(posix.clone()),
            None => Ok(timezone::derive_posix(&self.location.timezone, year)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[wifi]
ssid = "HarborNet"
password = "correct horse"

[location]
latitude = 43.6567
longitude = -70.2467
timezone = "America/New_York"

[stations]
tide = "8418150"
buoy = "44007"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.wifi.ssid, "YOUR_WIFI_SSID");
        assert_eq!(config.location.latitude, 36.97);
        assert_eq!(config.location.longitude, -122.01);
        assert_eq!(config.location.timezone, "America/Los_Angeles");
        assert_eq!(config.stations.tide.as_str(), "9413450");
        assert_eq!(config.stations.buoy.as_str(), "46236");
    }

    #[test]
    fn test_parse_toml_without_posix() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.wifi.ssid, "HarborNet");
        assert_eq!(config.wifi.password.expose(), "correct horse");
        assert_eq!(config.location.timezone_posix, None);
        assert_eq!(
            config.effective_posix(2025).unwrap(),
            "EST5EDT,M3.2.0,M11.1.0"
        );
    }

    #[test]
    fn test_missing_password_means_open_network() {
        let toml_str = SAMPLE.replace("password = \"correct horse\"\n", "");
        let config = Config::from_toml_str(&toml_str).unwrap();
        assert!(config.wifi.password.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = Config::from_toml_str("[wifi]\nssid = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::example();
        config.save(temp_file.path()).unwrap();

        let loaded = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_or_default("/nonexistent/path");
        // Should fallback to the example
        assert_eq!(config.stations.tide.as_str(), "9413450");
        assert!(matches!(
            Config::load_from_path("/nonexistent/path"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides_replace_credentials() {
        let config = Config::example().with_env_overrides([
            ("TIDE_WIFI_SSID", "Boathouse"),
            ("TIDE_WIFI_PASSWORD", "s3cret-pass"),
            ("HOME", "/root"),
        ]);
        assert_eq!(config.wifi.ssid, "Boathouse");
        assert_eq!(config.wifi.password.expose(), "s3cret-pass");
        assert_eq!(config.stations.tide.as_str(), "9413450");
    }

    #[test]
    fn test_debug_output_hides_password() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("correct horse"));
        assert!(debug.contains("HarborNet"));
    }

    #[test]
    fn test_load_any_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let header_path = dir.path().join("config.h");
        fs::write(&header_path, header::render(&Config::example(), 2025).unwrap()).unwrap();
        let toml_path = dir.path().join("tide-config.toml");
        Config::example().save(&toml_path).unwrap();

        assert_eq!(Config::load_any(&header_path).unwrap(), Config::example());
        assert_eq!(Config::load_any(&toml_path).unwrap(), Config::example());
    }
}
