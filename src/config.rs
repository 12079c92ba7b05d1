//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::SyntheticConfig;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broadcast server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Reason sent with the close frame on shutdown
    #[serde(default = "default_close_reason")]
    pub close_reason: String,

    /// How long a publish worker waits for a frame (ms)
    #[serde(default = "default_frame_timeout")]
    pub frame_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9002
}

fn default_close_reason() -> String {
    "Goodbye!".to_string()
}

fn default_frame_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

impl ServerConfig {
    /// Socket address string for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            close_reason: default_close_reason(),
            frame_timeout_ms: default_frame_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Capture backends the binary can drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    #[default]
    Synthetic,
}

/// Capture device configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub backend: DeviceBackend,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_fps() -> u32 {
    30
}

impl DeviceConfig {
    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: DeviceBackend::default(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
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

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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

    /// First existing config file among the standard locations
    pub fn default_path() -> Option<PathBuf> {
        let candidates = [
            dirs::config_dir().map(|p| p.join("depthcast").join("config.toml")),
            Some(PathBuf::from("/etc/depthcast/config.toml")),
            Some(PathBuf::from("./depthcast.toml")),
        ];

        candidates.into_iter().flatten().find(|path| path.exists())
    }

    /// Load from the default location, or environment only if there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                Self::load_with_env(&path)
            }
            None => {
                tracing::info!("Using default config with environment overrides");
                Ok(Self::from_env())
            }
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("DEPTHCAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DEPTHCAST_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(level) = lookup("DEPTHCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DEPTHCAST_LOG_FORMAT") {
            if let Some(f) = LogFormat::from_name(&format) {
                self.logging.format = f;
            }
        }
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
    r#"# Depthcast Configuration
#
# Environment variables override these settings:
# - DEPTHCAST_HOST
# - DEPTHCAST_PORT
# - DEPTHCAST_LOG_LEVEL
# - DEPTHCAST_LOG_FORMAT

[server]
# Address to listen on
host = "0.0.0.0"
port = 9002

# Reason sent to clients when the server shuts down
close_reason = "Goodbye!"

# How long a publish worker waits for a new frame (ms)
frame_timeout_ms = 30

# Connections beyond this are refused
max_connections = 1000

[device]
# Capture backend: synthetic
backend = "synthetic"

# Frame geometry for both streams
width = 640
height = 480

# Frames per second
fps = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

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
        assert_eq!(config.server.addr(), "0.0.0.0:9002");
        assert_eq!(config.server.close_reason, "Goodbye!");
        assert_eq!(config.server.frame_timeout(), Duration::from_millis(30));
        assert_eq!(config.device.backend, DeviceBackend::Synthetic);
        assert_eq!(config.device.synthetic_config(), SyntheticConfig::default());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_generated_config_matches_defaults() {
        let parsed = Config::parse(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.server.addr(), defaults.server.addr());
        assert_eq!(parsed.server.close_reason, defaults.server.close_reason);
        assert_eq!(parsed.server.frame_timeout_ms, defaults.server.frame_timeout_ms);
        assert_eq!(parsed.server.max_connections, defaults.server.max_connections);
        assert_eq!(parsed.device.width, defaults.device.width);
        assert_eq!(parsed.device.height, defaults.device.height);
        assert_eq!(parsed.device.fps, defaults.device.fps);
        assert_eq!(parsed.logging.level, defaults.logging.level);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9100\n\n[logging]\nformat = \"json\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.device.fps, 30);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[device]\nbackend = \"kinect9000\"\n").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DEPTHCAST_HOST", "127.0.0.1"),
            ("DEPTHCAST_PORT", "9300"),
            ("DEPTHCAST_LOG_LEVEL", "debug"),
            ("DEPTHCAST_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.addr(), "127.0.0.1:9300");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "DEPTHCAST_PORT" => Some("not-a-port".to_string()),
            "DEPTHCAST_LOG_FORMAT" => Some("xml".to_string()),
            _ => None,
        });

        assert_eq!(config.server.port, 9002);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
