pub use app_error::{AppError, AppResult};
pub use client::StreamClient;
pub use config::{
    NetworkConfig, OutputConfig, ProxyConfig, RescaleConfig, StreamConfig, TelemetryConfig,
    DEFAULT_BOUNDARY,
};
pub use shutdown::StopFlag;
pub use tracing_config::{setup_local_tracing, setup_tracing, OtelGuard};

mod app_error;
mod client;
mod config;
mod shutdown;
mod tracing_config;
