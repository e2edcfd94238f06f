use crate::{AppError, AppResult};

/// Largest response head accepted before the multipart body starts.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Status line and headers of the streaming HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

/// Offset just past the `\r\n\r\n` that ends the head, if present.
pub fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|index| index + 4)
}

impl ResponseHead {
    /// Parses a complete head, as delimited by [`find_head_end`].
    pub fn parse(bytes: &[u8]) -> AppResult<ResponseHead> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| AppError::MalformedProtocol("response head is not valid UTF-8".into()))?;
        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or_default();

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(AppError::MalformedProtocol(format!(
                "unexpected status line: {:?}",
                status_line
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                AppError::MalformedProtocol(format!("missing status code: {:?}", status_line))
            })?;
        let reason = parts.next().unwrap_or_default().to_string();

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(ResponseHead {
            status,
            reason,
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Rejects anything but a 2xx answer.
    pub fn ensure_success(&self) -> AppResult<()> {
        if (200..300).contains(&self.status) {
            Ok(())
        } else {
            Err(AppError::MalformedProtocol(format!(
                "server answered {} {}",
                self.status, self.reason
            )))
        }
    }

    /// Multipart delimiter announced in `Content-Type`, always `--`-prefixed.
    pub fn boundary(&self) -> Option<String> {
        let content_type = self.header("Content-Type")?;
        content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|value| !value.is_empty())
            .map(|value| {
                if value.starts_with("--") {
                    value.to_string()
                } else {
                    format!("--{}", value)
                }
            })
    }
}
