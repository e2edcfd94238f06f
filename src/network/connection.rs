use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Duration};
use tracing::debug;

use super::response_head::{find_head_end, ResponseHead, MAX_HEAD_SIZE};
use crate::service::{NetworkConfig, StreamConfig};
use crate::{AppError, AppResult};

/// Result of one bounded socket read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Closed,
    TimedOut,
}

/// Builds the request line and headers for the stream.
///
/// HTTP/1.0 keeps servers from switching to chunked transfer encoding.
pub fn stream_request(config: &StreamConfig) -> String {
    format!(
        "GET {} HTTP/1.0\r\nHost: {}:{}\r\nUser-Agent: {}/{}\r\nAccept: multipart/x-mixed-replace\r\n\r\n",
        config.path,
        config.hostname,
        config.port,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

/// One TCP/HTTP session with the camera.
///
/// Created by [`StreamSession::connect`] once the response head has been
/// accepted; dropped on any read error, timeout or end of stream. Body bytes
/// that arrived together with the head are kept in `pending` and must be
/// consumed before reading from the socket.
#[derive(Debug)]
pub struct StreamSession {
    stream: TcpStream,
    peer: String,
    head: ResponseHead,
    pending: BytesMut,
}

impl StreamSession {
    pub async fn connect(config: &StreamConfig, network: &NetworkConfig) -> AppResult<StreamSession> {
        let peer = format!("{}:{}", config.hostname, config.port);
        let mut stream = time::timeout(
            network.connect_timeout(),
            TcpStream::connect((config.hostname.as_str(), config.port)),
        )
        .await
        .map_err(|_| AppError::Timeout(format!("connecting to {}", peer)))?
        .map_err(|e| AppError::ConnectionError(format!("connect to {} failed: {}", peer, e)))?;
        stream.set_nodelay(true)?;

        stream
            .write_all(stream_request(config).as_bytes())
            .await
            .map_err(|e| AppError::ConnectionError(format!("send request to {} failed: {}", peer, e)))?;

        let mut pending = BytesMut::with_capacity(network.read_buffer_size);
        let head = read_head(&mut stream, &mut pending, network.read_timeout()).await?;
        head.ensure_success()?;
        debug!(
            "stream session to {} established, status {} {}",
            peer, head.status, head.reason
        );

        Ok(StreamSession {
            stream,
            peer,
            head,
            pending,
        })
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Body bytes received along with the response head.
    pub fn take_pending(&mut self) -> BytesMut {
        std::mem::take(&mut self.pending)
    }

    /// Appends whatever the socket has to `buffer`, waiting at most `timeout`.
    pub async fn read_chunk(&mut self, buffer: &mut BytesMut, timeout: Duration) -> AppResult<ReadOutcome> {
        match time::timeout(timeout, self.stream.read_buf(buffer)).await {
            Err(_) => Ok(ReadOutcome::TimedOut),
            Ok(Ok(0)) => Ok(ReadOutcome::Closed),
            Ok(Ok(n)) => Ok(ReadOutcome::Data(n)),
            Ok(Err(e)) => Err(AppError::ConnectionError(format!(
                "read from {} failed: {}",
                self.peer, e
            ))),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        debug!("stream session to {} closed", self.peer);
    }
}

async fn read_head(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    timeout: Duration,
) -> AppResult<ResponseHead> {
    loop {
        if let Some(end) = find_head_end(buffer) {
            let head = buffer.split_to(end);
            return ResponseHead::parse(&head);
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(AppError::MalformedProtocol(format!(
                "response head exceeds {} bytes",
                MAX_HEAD_SIZE
            )));
        }
        let read = time::timeout(timeout, stream.read_buf(buffer))
            .await
            .map_err(|_| AppError::Timeout("waiting for response head".into()))??;
        if read == 0 {
            return Err(AppError::ConnectionError(
                "connection closed before response head".into(),
            ));
        }
    }
}
