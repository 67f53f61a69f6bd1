//! Configuration management for cmdstream.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::{CommandOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FINAL_SEND_GRACE};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution configuration.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Relay one event per line instead of one aggregated event.
    pub streaming: bool,
    /// Kill the process after this many milliseconds.
    pub timeout_ms: Option<u64>,
    /// Capacity of every internal channel.
    pub channel_capacity: usize,
    /// How long the aggregated result may wait for a receiver once cancelled.
    pub final_send_grace_ms: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            streaming: false,
            timeout_ms: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            final_send_grace_ms: DEFAULT_FINAL_SEND_GRACE.as_millis() as u64,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unset variables are skipped; set but malformed ones are rejected.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CMDSTREAM_STREAMING") {
            self.execution.streaming = parse_bool(&value)
                .ok_or(ConfigError::InvalidValue("CMDSTREAM_STREAMING", value))?;
        }

        if let Some(value) = lookup("CMDSTREAM_TIMEOUT_MS") {
            self.execution.timeout_ms = Some(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("CMDSTREAM_TIMEOUT_MS", value))?,
            );
        }

        if let Some(value) = lookup("CMDSTREAM_CHANNEL_CAPACITY") {
            self.execution.channel_capacity = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CMDSTREAM_CHANNEL_CAPACITY", value))?;
        }

        if let Some(level) = lookup("CMDSTREAM_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if args.stream {
            self.execution.streaming = true;
        }

        if let Some(timeout_ms) = args.timeout_ms {
            self.execution.timeout_ms = Some(timeout_ms);
        }

        if let Some(capacity) = args.buffer {
            self.execution.channel_capacity = capacity;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to options for a [`Command`](crate::Command).
    pub fn to_options(&self) -> Result<CommandOptions, ConfigError> {
        if self.execution.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "channel_capacity",
                self.execution.channel_capacity.to_string(),
            ));
        }

        Ok(CommandOptions::new()
            .streaming(self.execution.streaming)
            .channel_capacity(self.execution.channel_capacity)
            .final_send_grace(Duration::from_millis(self.execution.final_send_grace_ms)))
    }

    /// Execution timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.execution.timeout_ms.map(Duration::from_millis)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A setting holds a value that cannot be used.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.execution.streaming);
        assert!(config.execution.timeout_ms.is_none());
        assert_eq!(config.execution.channel_capacity, 1);
        assert_eq!(config.execution.final_send_grace_ms, 100);
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "execution": {
                "streaming": true,
                "timeout_ms": 2500,
                "channel_capacity": 16
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.execution.streaming);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.execution.channel_capacity, 16);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{ "execution": { "timeout_ms": 50 } }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.execution.streaming); // Default
        assert_eq!(config.execution.channel_capacity, 1); // Default
        assert_eq!(config.execution.timeout_ms, Some(50));
    }

    #[test]
    fn test_config_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_config_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/cmdstream.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("CMDSTREAM_STREAMING", "true"),
                ("CMDSTREAM_TIMEOUT_MS", "750"),
                ("CMDSTREAM_CHANNEL_CAPACITY", "8"),
                ("RUST_LOG", "trace"),
            ]))
            .unwrap();

        assert!(config.execution.streaming);
        assert_eq!(config.execution.timeout_ms, Some(750));
        assert_eq!(config.execution.channel_capacity, 8);
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_env_log_level_beats_rust_log() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("CMDSTREAM_LOG_LEVEL", "info"), ("RUST_LOG", "trace")]))
            .unwrap();
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_apply_env_invalid_value() {
        let mut config = Config::default();
        let result = config.apply_env_from(env(&[("CMDSTREAM_TIMEOUT_MS", "later")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("CMDSTREAM_TIMEOUT_MS", _))
        ));

        let result = config.apply_env_from(env(&[("CMDSTREAM_STREAMING", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.execution.timeout_ms = Some(10_000);

        let args = Args {
            stream: true,
            timeout_ms: Some(200),
            buffer: Some(32),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert!(config.execution.streaming);
        assert_eq!(config.execution.timeout_ms, Some(200));
        assert_eq!(config.execution.channel_capacity, 32);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_apply_args_keeps_unset_values() {
        let mut config = Config::default();
        config.execution.streaming = true;
        config.execution.timeout_ms = Some(300);

        config.apply_args(&Args::default());

        assert!(config.execution.streaming);
        assert_eq!(config.execution.timeout_ms, Some(300));
    }

    #[test]
    fn test_to_options() {
        let mut config = Config::default();
        config.execution.streaming = true;
        config.execution.channel_capacity = 4;
        config.execution.final_send_grace_ms = 20;

        let options = config.to_options().unwrap();
        assert!(options.streaming);
        assert_eq!(options.channel_capacity, 4);
        assert_eq!(options.final_send_grace, Duration::from_millis(20));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.execution.channel_capacity = 0;
        assert!(config.to_options().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"channel_capacity\""));
        assert!(json.contains("\"level\""));
    }
}
