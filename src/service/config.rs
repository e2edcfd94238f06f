use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

/// Boundary sent by mjpg-streamer, used when the server does not announce one.
pub const DEFAULT_BOUNDARY: &str = "--boundarydonotcross";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub hostname: String,
    pub port: u16,
    pub path: String,
    pub boundary: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            hostname: String::new(),
            port: 0,
            path: "/".to_string(),
            boundary: DEFAULT_BOUNDARY.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_ms: u64,
    /// Also bounds how long a stop request can go unnoticed.
    pub read_timeout_ms: u64,
    pub read_buffer_size: usize,
    /// Largest frame accepted; bigger parts are skipped.
    pub frame_buffer_size: usize,
    pub reconnect_backoff_ms: u64,
    pub max_reconnect_backoff_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            connect_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            read_buffer_size: 16 * 1024,
            frame_buffer_size: 1024 * 1024,
            reconnect_backoff_ms: 1_000,
            max_reconnect_backoff_ms: 30_000,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn max_reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_backoff_ms)
    }
}

/// Options for the downstream rescale stage; the extractor ignores them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RescaleConfig {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub hardware_accel: bool,
}

impl Default for RescaleConfig {
    fn default() -> Self {
        RescaleConfig {
            width: 0,
            height: 0,
            quality: 75,
            hardware_accel: false,
        }
    }
}

impl RescaleConfig {
    pub fn is_enabled(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// export traces and metrics over OTLP
    pub otlp: bool,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub stream: StreamConfig,
    pub network: NetworkConfig,
    pub rescale: RescaleConfig,
    pub output: OutputConfig,
    pub telemetry: TelemetryConfig,
}

impl ProxyConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ProxyConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(config::Environment::with_prefix("MJPEG_PROXY").separator("__"))
            .build()?;

        let proxy_config: ProxyConfig = config.try_deserialize()?;
        Ok(proxy_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: &str| Err(AppError::InvalidValue(msg.to_string()));
        if self.stream.hostname.trim().is_empty() {
            return invalid("stream.hostname is required");
        }
        if self.stream.port == 0 {
            return invalid("stream.port is required");
        }
        if !self.stream.path.starts_with('/') {
            return invalid("stream.path must start with '/'");
        }
        if self.stream.boundary.is_empty() {
            return invalid("stream.boundary must not be empty");
        }
        let network = &self.network;
        if network.connect_timeout_ms == 0 || network.read_timeout_ms == 0 {
            return invalid("network timeouts must be positive");
        }
        if network.read_buffer_size == 0 || network.frame_buffer_size == 0 {
            return invalid("network buffer sizes must be positive");
        }
        if network.max_reconnect_backoff_ms < network.reconnect_backoff_ms {
            return invalid("network.max_reconnect_backoff_ms is below reconnect_backoff_ms");
        }
        if !(1..=100).contains(&self.rescale.quality) {
            return invalid("rescale.quality must be within 1..=100");
        }
        Ok(())
    }
}
