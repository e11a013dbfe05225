//! Configuration management for the load-test server.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Environment variables (highest priority)
//! 2. TOML configuration file
//! 3. Default values (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "guardload.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Guardrail endpoint under test
    #[serde(default)]
    pub target: TargetEndpointConfig,

    /// Load runner tuning
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration (host, port)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// REST API port (default: 8090)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Max seconds to wait for an active run to persist on shutdown (default: 15)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

/// Guardrail endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEndpointConfig {
    /// Rule-run URL every request is POSTed to
    #[serde(default = "default_target_url")]
    pub url: String,

    /// Per-request timeout in milliseconds (default: 10000)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Load runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Where history records are written (default: "performance_history")
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// History backend: local or memory (default: "local")
    #[serde(default = "default_history_backend")]
    pub history_backend: String,

    /// Pause between requests of one worker in milliseconds (default: 10)
    #[serde(default = "default_worker_pause")]
    pub worker_pause_ms: u64,

    /// Share of each step stage spent ramping up workers (default: 0.2)
    #[serde(default = "default_ramp_up_fraction")]
    pub ramp_up_fraction: f64,

    /// History points returned by status polls (default: 60)
    #[serde(default = "default_status_history_points")]
    pub status_history_points: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Runtime knobs handed to [`crate::LoadRunner`].
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub worker_pause: Duration,
    pub ramp_up_fraction: f64,
    pub status_history_points: usize,
    pub sample_interval: Duration,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_shutdown_timeout() -> u64 {
    15
}

fn default_target_url() -> String {
    "http://127.0.0.1:8000/api/input/instance/rule/run".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("performance_history")
}

fn default_history_backend() -> String {
    "local".to_string()
}

fn default_worker_pause() -> u64 {
    10
}

fn default_ramp_up_fraction() -> f64 {
    0.2
}

fn default_status_history_points() -> usize {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl Default for TargetEndpointConfig {
    fn default() -> Self {
        Self {
            url: default_target_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            history_dir: default_history_dir(),
            history_backend: default_history_backend(),
            worker_pause_ms: default_worker_pause(),
            ramp_up_fraction: default_ramp_up_fraction(),
            status_history_points: default_status_history_points(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        RunnerConfig::default().settings()
    }
}

impl TargetEndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RunnerConfig {
    pub fn settings(&self) -> RunnerSettings {
        RunnerSettings {
            worker_pause: Duration::from_millis(self.worker_pause_ms),
            ramp_up_fraction: self.ramp_up_fraction,
            status_history_points: self.status_history_points,
            sample_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file doesn't exist or has invalid TOML syntax.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError { path, source: e })
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Reads `GUARDLOAD_CONFIG` (or `guardload.toml` if present), otherwise
    /// starts from defaults, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("GUARDLOAD_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `GUARDLOAD_HOST` - Server host address
    /// - `GUARDLOAD_PORT` - REST API port
    /// - `GUARDLOAD_TARGET_URL` - Guardrail rule-run URL
    /// - `GUARDLOAD_HISTORY_DIR` - History record directory
    /// - `GUARDLOAD_LOG_LEVEL` - Log level
    /// - `GUARDLOAD_LOG_FORMAT` - Log format
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GUARDLOAD_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("GUARDLOAD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(url) = std::env::var("GUARDLOAD_TARGET_URL") {
            self.target.url = url;
        }

        if let Ok(dir) = std::env::var("GUARDLOAD_HISTORY_DIR") {
            self.runner.history_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("GUARDLOAD_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("GUARDLOAD_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        if !(self.target.url.starts_with("http://") || self.target.url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "target.url must be an http(s) URL, got {:?}",
                self.target.url
            )));
        }

        if self.target.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "target.request_timeout_ms must be > 0".to_string(),
            ));
        }

        let valid_backends = ["local", "memory"];
        if !valid_backends.contains(&self.runner.history_backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "runner.history_backend must be one of: {}",
                valid_backends.join(", ")
            )));
        }

        if self.runner.history_backend == "local" && self.runner.history_dir.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "runner.history_dir cannot be empty".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.runner.ramp_up_fraction) {
            return Err(ConfigError::ValidationError(
                "runner.ramp_up_fraction must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.runner.status_history_points == 0 {
            return Err(ConfigError::ValidationError(
                "runner.status_history_points must be > 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file
    #[error("Failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 8090);
        assert_eq!(
            config.target.url,
            "http://127.0.0.1:8000/api/input/instance/rule/run"
        );
        assert_eq!(config.target.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.runner.history_dir, PathBuf::from("performance_history"));
        assert_eq!(config.runner.status_history_points, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_from_runner_config() {
        let settings = RunnerConfig::default().settings();
        assert_eq!(settings.worker_pause, Duration::from_millis(10));
        assert_eq!(settings.ramp_up_fraction, 0.2);
        assert_eq!(settings.sample_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation_bad_ramp() {
        let mut config = Config::default();
        config.runner.ramp_up_fraction = 1.0;

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("ramp_up_fraction"));
    }

    #[test]
    fn test_config_validation_bad_target() {
        let mut config = Config::default();
        config.target.url = "ftp://example".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("logging.level must be"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [target]
            url = "http://guardrail:8000/api/input/instance/rule/run"
            request_timeout_ms = 2500

            [runner]
            history_backend = "memory"
            ramp_up_fraction = 0.25
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.target.request_timeout(), Duration::from_millis(2500));
        assert_eq!(config.runner.history_backend, "memory");
        assert_eq!(config.runner.ramp_up_fraction, 0.25);
        // Untouched sections keep their defaults
        assert_eq!(config.runner.worker_pause_ms, 10);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/guardload.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("GUARDLOAD_PORT", "9999");
        std::env::set_var("GUARDLOAD_TARGET_URL", "http://10.0.0.5:8000/run");
        std::env::set_var("GUARDLOAD_HISTORY_DIR", "/tmp/guardload-history");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.target.url, "http://10.0.0.5:8000/run");
        assert_eq!(
            config.runner.history_dir,
            PathBuf::from("/tmp/guardload-history")
        );

        // Clean up
        std::env::remove_var("GUARDLOAD_PORT");
        std::env::remove_var("GUARDLOAD_TARGET_URL");
        std::env::remove_var("GUARDLOAD_HISTORY_DIR");
    }
}
