pub mod network;
pub mod service;
pub mod sink;

pub use network::{FrameExtractor, SearchPattern};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, ProxyConfig, StopFlag, StreamClient,
};
pub use sink::{FrameSink, LatestFrame};
