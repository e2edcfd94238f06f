// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("telemetry setup error: {0}")]
    Telemetry(String),

    /// stream errors, recovered by reconnecting
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// multipart errors, recovered by skipping the part
    #[error("malformed protocol : {0}")]
    MalformedProtocol(String),

    #[error("frame of {declared} bytes exceeds buffer capacity {capacity}")]
    FrameTooLarge { declared: usize, capacity: usize },

    /// fatal, never retried
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl AppError {
    /// Whether the stream client should drop the session and reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::IoError(_)
                | AppError::ConnectionError(_)
                | AppError::Timeout(_)
                | AppError::MalformedProtocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, ErrorKind};

    #[test]
    fn test_connection_error_classification() {
        let reset: AppError = io::Error::new(ErrorKind::ConnectionReset, "reset").into();
        assert!(reset.is_connection_error());
        assert!(AppError::Timeout("read".into()).is_connection_error());
        assert!(!AppError::ResourceExhausted("frame buffer".into()).is_connection_error());
        assert!(!AppError::InvalidValue("port".into()).is_connection_error());
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = AppError::FrameTooLarge {
            declared: 2048,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "frame of 2048 bytes exceeds buffer capacity 1024"
        );
    }
}
