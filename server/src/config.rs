//! Server configuration from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use recipebox_core::DEFAULT_CHANGE_BUFFER;

pub const DEFAULT_PORT: u16 = 3000;

/// How long a login session stays valid.
pub const DEFAULT_SESSION_DAYS: i64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session_days: i64,
    /// Changes a publication may fall behind before it is closed.
    pub change_buffer: usize,
    /// JSON settings file with default accounts and recipes.
    pub settings_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`: Postgres connection string
    ///
    /// Optional:
    /// - `RECIPEBOX_BIND_ADDR`: listen address (default: "0.0.0.0:3000")
    /// - `RECIPEBOX_SESSION_DAYS`: session lifetime in days (default: 30)
    /// - `RECIPEBOX_CHANGE_BUFFER`: publication change buffer (default: 256)
    /// - `RECIPEBOX_SETTINGS`: path to a settings JSON file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let bind_addr = parse_or(&lookup, "RECIPEBOX_BIND_ADDR", || {
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
        })?;

        let session_days = parse_or(&lookup, "RECIPEBOX_SESSION_DAYS", || DEFAULT_SESSION_DAYS)?;
        if session_days <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "RECIPEBOX_SESSION_DAYS".to_string(),
                value: session_days.to_string(),
            });
        }

        let change_buffer = parse_or(&lookup, "RECIPEBOX_CHANGE_BUFFER", || DEFAULT_CHANGE_BUFFER)?;

        let settings_path = lookup("RECIPEBOX_SETTINGS")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            bind_addr,
            session_days,
            change_buffer,
            settings_path,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default()),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/recipebox")]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.session_days, 30);
        assert_eq!(config.change_buffer, 256);
        assert!(config.settings_path.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::MissingEnvVar(name)) if name == "DATABASE_URL"
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://db/recipebox"),
            ("RECIPEBOX_BIND_ADDR", "127.0.0.1:8080"),
            ("RECIPEBOX_SESSION_DAYS", "7"),
            ("RECIPEBOX_CHANGE_BUFFER", "16"),
            ("RECIPEBOX_SETTINGS", "config/settings.json"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.session_days, 7);
        assert_eq!(config.change_buffer, 16);
        assert_eq!(
            config.settings_path,
            Some(PathBuf::from("config/settings.json"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (name, value) in [
            ("RECIPEBOX_BIND_ADDR", "not an address"),
            ("RECIPEBOX_SESSION_DAYS", "soon"),
            ("RECIPEBOX_SESSION_DAYS", "0"),
            ("RECIPEBOX_CHANGE_BUFFER", "-1"),
        ] {
            let result = config(&[("DATABASE_URL", "postgres://db"), (name, value)]);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{name}={value}"
            );
        }
    }
}
