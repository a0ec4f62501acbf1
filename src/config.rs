//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query evaluation settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Zone used to read date strings when a statement has no `tz()`
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Divide two integers as floats instead of truncating
    #[serde(default)]
    pub integer_float_division: bool,

    /// Bound parameters applied to every query
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            integer_float_division: false,
            params: Map::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("influxql").join("config.toml")),
            Some(PathBuf::from("/etc/influxql/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(tz) = var("INFLUXQL_TIMEZONE") {
            self.query.timezone = tz;
        }
        if let Some(division) = var("INFLUXQL_INTEGER_FLOAT_DIVISION") {
            match division.parse() {
                Ok(v) => self.query.integer_float_division = v,
                Err(_) => tracing::warn!(
                    "Ignoring INFLUXQL_INTEGER_FLOAT_DIVISION={:?}: expected true or false",
                    division
                ),
            }
        }

        if let Some(level) = var("INFLUXQL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("INFLUXQL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// The configured zone, or `None` if the name is unknown
    pub fn timezone(&self) -> Option<chrono_tz::Tz> {
        self.query.timezone.parse().ok()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# InfluxQL Configuration
#
# Environment variables override these settings:
# - INFLUXQL_TIMEZONE
# - INFLUXQL_INTEGER_FLOAT_DIVISION
# - INFLUXQL_LOG_LEVEL
# - INFLUXQL_LOG_FORMAT

[query]
# Time zone for date strings in WHERE clauses without tz()
timezone = "UTC"

# Divide integers as floats (7 / 2 = 3.5 instead of 3)
integer_float_division = false

# Default bound parameters, referenced as $name in queries
[query.params]
# host = "server01"
# cpu = { ident = "cpu" }

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.query.timezone, "UTC");
        assert!(!config.query.integer_float_division);
        assert!(config.query.params.is_empty());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.timezone(), Some(chrono_tz::UTC));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[query]
timezone = "Europe/Paris"
integer_float_division = true

[query.params]
host = "server01"
m = {{ ident = "cpu" }}

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timezone(), Some(chrono_tz::Europe::Paris));
        assert!(config.query.integer_float_division);
        assert_eq!(config.query.params["host"], Value::String("server01".to_string()));
        assert_eq!(config.query.params["m"]["ident"], Value::String("cpu".to_string()));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.query.timezone, "UTC");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[query\ntimezone = 1").unwrap();
        let err = Config::load(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INFLUXQL_TIMEZONE", "Asia/Tokyo"),
            ("INFLUXQL_INTEGER_FLOAT_DIVISION", "true"),
            ("INFLUXQL_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.query.timezone, "Asia/Tokyo");
        assert!(config.query.integer_float_division);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_invalid_division_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| {
            (k == "INFLUXQL_INTEGER_FLOAT_DIVISION").then(|| "maybe".to_string())
        });
        assert!(!config.query.integer_float_division);
    }

    #[test]
    fn test_generated_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, generate_default_config()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.query.timezone, "UTC");
        assert!(config.query.params.is_empty());
        assert_eq!(config.logging.level, "warn");
    }
}
