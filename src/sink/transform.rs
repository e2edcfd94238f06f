use tracing::warn;

use super::FrameSink;
use crate::AppResult;

/// A per-frame conversion applied before publication, e.g. a JPEG rescaler.
pub trait FrameTransform {
    /// Writes the converted frame into `out`, which arrives empty.
    fn transform(&mut self, frame: &[u8], out: &mut Vec<u8>) -> AppResult<()>;
}

/// Copies frames unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl FrameTransform for Passthrough {
    fn transform(&mut self, frame: &[u8], out: &mut Vec<u8>) -> AppResult<()> {
        out.extend_from_slice(frame);
        Ok(())
    }
}

/// Sink adapter running `transform` before handing frames to `inner`.
///
/// Frames the transform rejects (typically corrupt JPEGs) are dropped.
#[derive(Debug)]
pub struct Transformed<T, S> {
    transform: T,
    inner: S,
    scratch: Vec<u8>,
    dropped: u64,
}

impl<T: FrameTransform, S: FrameSink> Transformed<T, S> {
    pub fn new(transform: T, inner: S) -> Self {
        Transformed {
            transform,
            inner,
            scratch: Vec::new(),
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<T: FrameTransform, S: FrameSink> FrameSink for Transformed<T, S> {
    fn on_frame(&mut self, frame: &[u8]) {
        self.scratch.clear();
        match self.transform.transform(frame, &mut self.scratch) {
            Ok(()) => self.inner.on_frame(&self.scratch),
            Err(err) => {
                self.dropped += 1;
                warn!("dropping frame of {} bytes: {}", frame.len(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;

    /// Accepts only frames carrying the JPEG start-of-image marker.
    struct RequireSoi;

    impl FrameTransform for RequireSoi {
        fn transform(&mut self, frame: &[u8], out: &mut Vec<u8>) -> AppResult<()> {
            if !frame.starts_with(&[0xFF, 0xD8]) {
                return Err(AppError::InvalidValue("not a JPEG".into()));
            }
            out.extend(frame.iter().rev());
            Ok(())
        }
    }

    #[test]
    fn test_passthrough() {
        let mut frames = Vec::new();
        {
            let mut sink = Transformed::new(Passthrough, |frame: &[u8]| frames.push(frame.to_vec()));
            sink.on_frame(b"abc");
        }
        assert_eq!(frames, vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_rejected_frames_are_dropped() {
        let mut frames = Vec::new();
        let dropped = {
            let mut sink = Transformed::new(RequireSoi, |frame: &[u8]| frames.push(frame.to_vec()));
            sink.on_frame(b"garbage");
            sink.on_frame(&[0xFF, 0xD8, 0x01]);
            sink.dropped()
        };
        assert_eq!(dropped, 1);
        assert_eq!(frames, vec![vec![0x01, 0xD8, 0xFF]]);
    }
}
