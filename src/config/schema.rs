//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bootloader.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the bootloader server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BootloaderConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Request reading limits.
    pub http: HttpConfig,

    /// Live output streaming settings.
    pub stream: StreamConfig,

    /// Script execution settings.
    pub runner: RunnerConfig,

    /// Where uploaded files and the index document live.
    pub storage: StorageConfig,

    /// WiFi station / access point bring-up.
    pub network: NetworkConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:80").
    pub bind_address: String,

    /// Maximum concurrently served connections.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            max_connections: 5,
        }
    }
}

/// Limits applied while reading a request off the socket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for receiving one request, in seconds.
    pub read_timeout_secs: u64,

    /// Size of each socket read.
    pub read_chunk_size: usize,

    /// Hard cap on buffered request bytes (headers + body).
    pub max_request_bytes: usize,
}

impl HttpConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10,
            read_chunk_size: 1024,
            max_request_bytes: 1024 * 1024,
        }
    }
}

/// Live output channel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Idle wait between drains of an empty channel, in milliseconds.
    pub poll_interval_ms: u64,

    /// Lines buffered between the script worker and the drain loop.
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            channel_capacity: 64,
        }
    }
}

/// Script runner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Program that executes uploaded scripts.
    pub interpreter: String,

    /// Arguments passed to the interpreter. The script source arrives on stdin.
    pub interpreter_args: Vec<String>,

    /// Extension accepted by `GET /run?file=*.<ext>`.
    pub script_extension: String,

    /// How long a stop waits for the worker to exit.
    pub stop_timeout_secs: u64,
}

impl RunnerConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string(), "-".to_string()],
            script_extension: "py".to_string(),
            stop_timeout_secs: 10,
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded files.
    pub root: String,

    /// Index document served on `GET /`, relative to `root`.
    pub index_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            index_file: "bootloader_index.html".to_string(),
        }
    }
}

/// How the device joins a network before serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// The host already has connectivity.
    #[default]
    Disabled,
    /// Join an existing WiFi network.
    Station,
    /// Open a hotspot.
    AccessPoint,
}

/// Network bring-up configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    pub ssid: String,
    pub password: String,

    /// Association / activation timeout in seconds.
    pub timeout_secs: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Disabled,
            ssid: String::new(),
            password: String::new(),
            timeout_secs: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional persistent log file.
    pub log_file: Option<String>,

    /// Size at which the log file is rotated.
    pub log_max_bytes: u64,

    /// Number of rotated files kept (`0` truncates in place).
    pub log_backups: u32,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            log_max_bytes: 1_000_000,
            log_backups: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: BootloaderConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:80");
        assert_eq!(config.http.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.stream.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.runner.interpreter_args, vec!["-u", "-"]);
        assert_eq!(config.network.mode, NetworkMode::Disabled);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: BootloaderConfig = toml::from_str(
            r#"
            [runner]
            interpreter = "micropython"

            [network]
            mode = "access_point"
            ssid = "alvik"
            password = "12345678"
            "#,
        )
        .unwrap();

        assert_eq!(config.runner.interpreter, "micropython");
        assert_eq!(config.runner.script_extension, "py");
        assert_eq!(config.network.mode, NetworkMode::AccessPoint);
        assert_eq!(config.network.timeout_secs, 20);
    }
}
