//! Relay configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Lower bound for the telemetry interval; smaller values are clamped.
const MIN_TELEMETRY_INTERVAL_MS: u64 = 10;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telemetry publisher settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Network configuration for the HTTP/WebSocket listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "courier_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Whether to log every inbound frame and routing decision.
    #[serde(default)]
    pub trace_events: bool,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Delay between two snapshots sent to one subscriber, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_TELEMETRY_INTERVAL_MS))
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            trace_events: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `COURIER_HOST` overrides `server.host`
/// - `COURIER_PORT` overrides `server.port`
/// - `COURIER_LOG_LEVEL` overrides `logging.level`
/// - `COURIER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `COURIER_TRACE_EVENTS` overrides `logging.trace_events`
/// - `COURIER_TELEMETRY_INTERVAL_MS` overrides `telemetry.interval_ms`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `COURIER_*` overrides using `lookup` to read variables.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("COURIER_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("COURIER_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("COURIER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("COURIER_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
    if let Some(trace) = lookup("COURIER_TRACE_EVENTS") {
        config.logging.trace_events = is_truthy(&trace);
    }
    if let Some(interval) = lookup("COURIER_TELEMETRY_INTERVAL_MS") {
        if let Ok(parsed) = interval.parse() {
            config.telemetry.interval_ms = parsed;
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Some("/nonexistent/courier.toml")).expect("defaults");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.telemetry.interval(), Duration::from_secs(1));
        assert!(!config.logging.trace_events);
    }

    #[test]
    fn file_values_are_read() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[server]\nport = 9100\n\n[logging]\nlevel = \"debug\"\ntrace_events = true\n\n[telemetry]\ninterval_ms = 250"
        )
        .expect("write config");

        let config = load_config(file.path().to_str()).expect("parses");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.trace_events);
        assert_eq!(config.telemetry.interval(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[server\nport = ").expect("write config");
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("COURIER_PORT", "7000"),
            ("COURIER_HOST", "0.0.0.0"),
            ("COURIER_LOG_JSON", "1"),
            ("COURIER_TELEMETRY_INTERVAL_MS", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert!(config.logging.json);
        assert_eq!(
            config.telemetry.interval(),
            Duration::from_millis(MIN_TELEMETRY_INTERVAL_MS),
            "interval is clamped"
        );
    }
}
