use tracing::{debug, warn};

use super::{FrameBuffer, SearchPattern};
use crate::sink::FrameSink;
use crate::{AppError, AppResult};

const CONTENT_LENGTH_HEADER: &str = "Content-Length:";
/// `\r\n\r\n` as the last four bytes seen, most recent in the low byte.
const HEADER_END: u32 = u32::from_be_bytes(*b"\r\n\r\n");

/// Parser phase of the current multipart part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SeekBoundary,
    SeekHeaderEnd,
    AccumulatePayload,
}

/// Progress through the value of a `Content-Length:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthField {
    Idle,
    LeadingSpace,
    Digits(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorStats {
    pub frames: u64,
    pub frame_bytes: u64,
    pub missing_length: u64,
    pub oversized: u64,
}

/// Incremental multipart frame extractor.
///
/// Bytes are pushed in whatever pieces the socket delivers. A single call to
/// [`FrameExtractor::feed`] may finish one frame, parse the next part's
/// headers and start its payload; partial boundaries and headers are carried
/// over to the next call through the search pattern state and
/// `last_four_bytes`.
///
/// Malformed parts (no `Content-Length`, or a length larger than the buffer)
/// are dropped and parsing resumes at the next boundary.
#[derive(Debug)]
pub struct FrameExtractor {
    phase: Phase,
    boundary: SearchPattern,
    content_length: SearchPattern,
    length_field: LengthField,
    declared_length: Option<usize>,
    last_four_bytes: u32,
    frame_length: usize,
    buffer: FrameBuffer,
    stats: ExtractorStats,
}

impl FrameExtractor {
    pub fn new(boundary: &str, capacity: usize) -> AppResult<FrameExtractor> {
        if boundary.is_empty() {
            return Err(AppError::InvalidValue(
                "multipart boundary must not be empty".into(),
            ));
        }
        Ok(FrameExtractor {
            phase: Phase::SeekBoundary,
            boundary: SearchPattern::new(boundary),
            content_length: SearchPattern::ignore_ascii_case(CONTENT_LENGTH_HEADER),
            length_field: LengthField::Idle,
            declared_length: None,
            last_four_bytes: 0,
            frame_length: 0,
            buffer: FrameBuffer::with_capacity(capacity)?,
            stats: ExtractorStats::default(),
        })
    }

    /// Consumes `chunk`, handing every frame it completes to `sink`.
    ///
    /// Returns the number of frames emitted by this call.
    pub fn feed<S>(&mut self, mut chunk: &[u8], sink: &mut S) -> usize
    where
        S: FrameSink + ?Sized,
    {
        let mut emitted = 0;
        while !chunk.is_empty() {
            let consumed = match self.phase {
                Phase::SeekBoundary => self.seek_boundary(chunk),
                Phase::SeekHeaderEnd => self.seek_header_end(chunk),
                Phase::AccumulatePayload => self.accumulate(chunk),
            };
            chunk = &chunk[consumed..];

            if self.phase == Phase::AccumulatePayload && self.buffer.len() == self.frame_length {
                sink.on_frame(self.buffer.as_slice());
                emitted += 1;
                self.stats.frames += 1;
                self.stats.frame_bytes += self.frame_length as u64;
                debug!(
                    monotonic_counter.frames_extracted = 1u64,
                    histogram.frame_bytes = self.frame_length as u64,
                    "frame extracted"
                );
                self.reset();
            }
        }
        emitted
    }

    /// Drops any partial frame and waits for the next boundary.
    pub fn reset(&mut self) {
        self.phase = Phase::SeekBoundary;
        self.boundary.reset();
        self.content_length.reset();
        self.length_field = LengthField::Idle;
        self.declared_length = None;
        self.last_four_bytes = 0;
        self.frame_length = 0;
        self.buffer.clear();
    }

    /// Switches to a new boundary, e.g. the one announced by a fresh session.
    pub fn set_boundary(&mut self, boundary: &str) -> AppResult<()> {
        if boundary.is_empty() {
            return Err(AppError::InvalidValue(
                "multipart boundary must not be empty".into(),
            ));
        }
        if self.boundary.as_bytes() != boundary.as_bytes() {
            self.boundary = SearchPattern::new(boundary);
        }
        self.reset();
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn boundary(&self) -> &[u8] {
        self.boundary.as_bytes()
    }

    fn seek_boundary(&mut self, chunk: &[u8]) -> usize {
        for (index, &byte) in chunk.iter().enumerate() {
            self.scan_content_length(byte);
            if self.boundary.push(byte) {
                self.phase = Phase::SeekHeaderEnd;
                self.last_four_bytes = 0;
                return index + 1;
            }
        }
        chunk.len()
    }

    fn seek_header_end(&mut self, chunk: &[u8]) -> usize {
        for (index, &byte) in chunk.iter().enumerate() {
            self.last_four_bytes = (self.last_four_bytes << 8) | u32::from(byte);
            self.scan_content_length(byte);
            if self.last_four_bytes == HEADER_END {
                if let Err(err) = self.begin_payload() {
                    self.discard_part(err);
                }
                return index + 1;
            }
        }
        chunk.len()
    }

    fn accumulate(&mut self, chunk: &[u8]) -> usize {
        let wanted = self.frame_length - self.buffer.len();
        let take = wanted.min(chunk.len());
        if let Err(err) = self.buffer.extend_from_slice(&chunk[..take]) {
            self.discard_part(err);
        }
        take
    }

    fn scan_content_length(&mut self, byte: u8) {
        self.length_field = match (self.length_field, byte) {
            (LengthField::LeadingSpace, b' ' | b'\t') => LengthField::LeadingSpace,
            (LengthField::LeadingSpace, b'0'..=b'9') => {
                LengthField::Digits(usize::from(byte - b'0'))
            }
            (LengthField::Digits(value), b'0'..=b'9') => LengthField::Digits(
                // saturate so an absurd length is rejected as oversized
                value
                    .saturating_mul(10)
                    .saturating_add(usize::from(byte - b'0')),
            ),
            (LengthField::Digits(value), _) => {
                self.declared_length = Some(value);
                LengthField::Idle
            }
            _ => LengthField::Idle,
        };
        if self.content_length.push(byte) {
            self.length_field = LengthField::LeadingSpace;
        }
    }

    fn begin_payload(&mut self) -> AppResult<()> {
        let declared = self.declared_length.take().ok_or_else(|| {
            AppError::MalformedProtocol("part headers without Content-Length".into())
        })?;
        if declared > self.buffer.capacity() {
            return Err(AppError::FrameTooLarge {
                declared,
                capacity: self.buffer.capacity(),
            });
        }
        self.buffer.clear();
        self.frame_length = declared;
        self.phase = Phase::AccumulatePayload;
        Ok(())
    }

    fn discard_part(&mut self, err: AppError) {
        match err {
            AppError::FrameTooLarge { .. } => self.stats.oversized += 1,
            _ => self.stats.missing_length += 1,
        }
        warn!(
            monotonic_counter.parts_discarded = 1u64,
            "discarding multipart part: {}", err
        );
        self.reset();
    }
}
