use bytes::BytesMut;
use rand::Rng;
use tokio::runtime;
use tokio::time::{self, Duration, Instant};
use tracing::{error, info, warn};

use crate::network::{ExtractorStats, FrameExtractor, ReadOutcome, StreamSession};
use crate::sink::FrameSink;
use crate::{AppError, AppResult};

use super::{NetworkConfig, ProxyConfig, StopFlag, StreamConfig};

/// Why a session's read loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Closed,
}

/// Exponential reconnect delay with up to 10% jitter.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        base + rand::thread_rng().gen_range(Duration::ZERO..=base / 10)
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Resolves once `stop` is set, checking it every `slice`.
async fn wait_for_stop(stop: &StopFlag, slice: Duration) {
    while !stop.is_stopped() {
        time::sleep(slice).await;
    }
}

/// Connection manager for one MJPEG stream.
///
/// Owns the frame extractor and the sink; each (re)connect creates a fresh
/// [`StreamSession`] that lives only inside [`StreamClient::run`]. Run one
/// client per camera; clients share nothing.
pub struct StreamClient<S> {
    stream: StreamConfig,
    network: NetworkConfig,
    extractor: FrameExtractor,
    read_buffer: BytesMut,
    sink: S,
    stop: StopFlag,
}

impl<S: FrameSink> StreamClient<S> {
    /// Allocates the frame buffer; failure to do so is fatal.
    pub fn new(config: &ProxyConfig, sink: S, stop: StopFlag) -> AppResult<StreamClient<S>> {
        config.validate()?;
        let extractor = FrameExtractor::new(
            &config.stream.boundary,
            config.network.frame_buffer_size,
        )?;
        Ok(StreamClient {
            stream: config.stream.clone(),
            network: config.network.clone(),
            extractor,
            read_buffer: BytesMut::with_capacity(config.network.read_buffer_size),
            sink,
            stop,
        })
    }

    /// Builds a single-threaded runtime and blocks until the stop flag is set
    /// or a fatal error occurs. Meant for a dedicated thread.
    pub fn start(config: &ProxyConfig, sink: S, stop: StopFlag) -> AppResult<()> {
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        let mut client = StreamClient::new(config, sink, stop)?;
        let result = rt.block_on(client.run());
        client.close();
        result
    }

    /// Streams until stopped, reconnecting after connection errors.
    ///
    /// Returns `Ok(())` once the stop flag has been observed; only
    /// non-recoverable errors are returned.
    pub async fn run(&mut self) -> AppResult<()> {
        let mut backoff = Backoff::new(
            self.network.reconnect_backoff(),
            self.network.max_reconnect_backoff(),
        );
        let peer = format!("{}:{}{}", self.stream.hostname, self.stream.port, self.stream.path);

        while !self.stop.is_stopped() {
            let frames_before = self.extractor.stats().frames;
            let result = self.stream_once().await;
            // a frame never spans two sessions
            self.extractor.reset();

            match result {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Closed) => info!("stream {} closed by peer", peer),
                Err(err) if err.is_connection_error() => {
                    warn!("stream {} failed: {}", peer, err)
                }
                Err(err) => {
                    error!("stream {} aborted: {}", peer, err);
                    return Err(err);
                }
            }

            if self.extractor.stats().frames > frames_before {
                backoff.reset();
            }
            let delay = backoff.next_delay();
            info!(
                monotonic_counter.reconnects = 1u64,
                "reconnecting to {} in {:?}", peer, delay
            );
            if !self.sleep_unless_stopped(delay).await {
                break;
            }
        }

        info!("stream client for {} stopped", peer);
        Ok(())
    }

    async fn stream_once(&mut self) -> AppResult<SessionEnd> {
        // connect and head read are not bounded by the read timeout alone
        let mut session = tokio::select! {
            session = StreamSession::connect(&self.stream, &self.network) => session?,
            _ = wait_for_stop(&self.stop, self.network.read_timeout()) => {
                return Ok(SessionEnd::Stopped)
            }
        };
        let boundary = session
            .head()
            .boundary()
            .unwrap_or_else(|| self.stream.boundary.clone());
        self.extractor.set_boundary(&boundary)?;
        info!(
            "streaming from {}{} with boundary {}",
            session.peer(),
            self.stream.path,
            boundary
        );

        let pending = session.take_pending();
        self.extractor.feed(&pending, &mut self.sink);

        let read_timeout = self.network.read_timeout();
        loop {
            if self.stop.is_stopped() {
                return Ok(SessionEnd::Stopped);
            }
            self.read_buffer.clear();
            match session.read_chunk(&mut self.read_buffer, read_timeout).await? {
                ReadOutcome::Data(_) => {
                    self.extractor.feed(&self.read_buffer, &mut self.sink);
                }
                ReadOutcome::Closed => return Ok(SessionEnd::Closed),
                ReadOutcome::TimedOut if self.stop.is_stopped() => {
                    return Ok(SessionEnd::Stopped)
                }
                ReadOutcome::TimedOut => {
                    return Err(AppError::Timeout(format!(
                        "no data from {} for {:?}",
                        session.peer(),
                        read_timeout
                    )))
                }
            }
        }
    }

    /// Sleeps in slices no longer than the read timeout; `false` if stopped.
    async fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        let slice = self.network.read_timeout();
        let deadline = Instant::now() + delay;
        loop {
            if self.stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            time::sleep((deadline - now).min(slice)).await;
        }
    }

    pub fn stats(&self) -> ExtractorStats {
        self.extractor.stats()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Releases the frame buffer and hands the sink back.
    pub fn close(self) -> S {
        let stats = self.extractor.stats();
        info!(
            "stream client closed after {} frames ({} bytes), {} parts without length, {} oversized",
            stats.frames, stats.frame_bytes, stats.missing_length, stats.oversized
        );
        self.sink
    }
}
