//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;
use vaccimap_core::{Coordinates, Permission};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// First level of the profile namespace: application instance, then subject.
    pub app_instance_id: String,
    pub log_level: Level,
    pub session_store_path: PathBuf,
    pub otp_ttl: Duration,
    pub verifier_token: String,
    pub location_permission: Permission,
    pub device_location: Option<Coordinates>,
    pub schedule_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds the configuration from an explicit set of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url =
            var("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let app_instance_id = var("APP_INSTANCE_ID").unwrap_or_else(|| "vaccimap-local".to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let session_store_path = var("SESSION_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.vaccimap/session.json"));

        let otp_ttl_secs = match var("OTP_TTL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue("OTP_TTL_SECS".to_string(), format!("'{}' is not a positive number", raw))
                })?,
            None => 300,
        };

        let verifier_token =
            var("VERIFIER_TOKEN").unwrap_or_else(|| "terminal-human-check".to_string());

        // --- Device location stand-ins ---
        let location_permission = match var("LOCATION_PERMISSION").as_deref() {
            None => Permission::Granted,
            Some(raw) if raw.eq_ignore_ascii_case("granted") => Permission::Granted,
            Some(raw) if raw.eq_ignore_ascii_case("denied") => Permission::Denied,
            Some(raw) => {
                return Err(ConfigError::InvalidValue(
                    "LOCATION_PERMISSION".to_string(),
                    format!("'{}' must be 'granted' or 'denied'", raw),
                ))
            }
        };

        let device_location = match (var("DEVICE_LATITUDE"), var("DEVICE_LONGITUDE")) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(
                parse_degrees("DEVICE_LATITUDE", &lat, 90.0)?,
                parse_degrees("DEVICE_LONGITUDE", &lon, 180.0)?,
            )),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("DEVICE_LONGITUDE".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("DEVICE_LATITUDE".to_string())),
        };

        let schedule_path = var("SCHEDULE_PATH").map(PathBuf::from);

        Ok(Self {
            database_url,
            app_instance_id,
            log_level,
            session_store_path,
            otp_ttl: Duration::from_secs(otp_ttl_secs),
            verifier_token,
            location_permission,
            device_location,
            schedule_path,
        })
    }
}

fn parse_degrees(name: &str, raw: &str, limit: f64) -> Result<f64, ConfigError> {
    raw.parse::<f64>()
        .ok()
        .filter(|deg| deg.is_finite() && deg.abs() <= limit)
        .ok_or_else(|| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not within ±{}", raw, limit))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = Config::from_vars(&vars(&[("DATABASE_URL", "postgres://localhost/vaccimap")])).unwrap();
        assert_eq!(config.app_instance_id, "vaccimap-local");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.otp_ttl, Duration::from_secs(300));
        assert_eq!(config.location_permission, Permission::Granted);
        assert_eq!(config.device_location, None);
        assert_eq!(config.schedule_path, None);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "DATABASE_URL"));
    }

    #[test]
    fn device_location_needs_both_coordinates() {
        let config = Config::from_vars(&vars(&[
            ("DATABASE_URL", "postgres://x"),
            ("DEVICE_LATITUDE", "12.97"),
            ("DEVICE_LONGITUDE", "77.59"),
            ("LOCATION_PERMISSION", "Denied"),
        ]))
        .unwrap();
        assert_eq!(config.device_location, Some(Coordinates::new(12.97, 77.59)));
        assert_eq!(config.location_permission, Permission::Denied);

        let err = Config::from_vars(&vars(&[("DATABASE_URL", "postgres://x"), ("DEVICE_LATITUDE", "12.97")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "DEVICE_LONGITUDE"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for (name, value) in [("DEVICE_LATITUDE", "91"), ("OTP_TTL_SECS", "0"), ("RUST_LOG", "loud")] {
            let mut set = vars(&[
                ("DATABASE_URL", "postgres://x"),
                ("DEVICE_LATITUDE", "10"),
                ("DEVICE_LONGITUDE", "10"),
            ]);
            set.insert(name.to_string(), value.to_string());
            assert!(matches!(Config::from_vars(&set), Err(ConfigError::InvalidValue(..))), "{name}");
        }
    }
}
