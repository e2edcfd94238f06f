//! Frame sinks
//!
//! A [`FrameSink`] receives every completed frame synchronously on the stream
//! worker. The slice passed to [`FrameSink::on_frame`] points into the
//! extractor's reusable buffer and is only valid for the duration of the call;
//! sinks that need the bytes later must copy them. Because the call is
//! synchronous, a slow sink slows down socket reads, which is the only
//! backpressure the client applies.
//!
//! # Provided sinks
//!
//! - [`LatestFrame`]: shared handle holding the most recent frame, with
//!   waiters woken on every publish
//! - [`SnapshotFile`]: keeps a file on disk replaced by each new frame
//! - [`Fanout`]: forwards each frame to several sinks in order
//! - [`Transformed`]: runs a [`FrameTransform`] (e.g. a rescaler) before the
//!   inner sink

pub use latest_frame::{FrameSnapshot, LatestFrame};
pub use snapshot_file::SnapshotFile;
pub use transform::{FrameTransform, Passthrough, Transformed};

mod latest_frame;
mod snapshot_file;
mod transform;

pub trait FrameSink {
    fn on_frame(&mut self, frame: &[u8]);
}

impl<F> FrameSink for F
where
    F: FnMut(&[u8]),
{
    fn on_frame(&mut self, frame: &[u8]) {
        self(frame)
    }
}

/// Forwards every frame to each inner sink, in insertion order.
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn FrameSink + Send>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl FrameSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FrameSink for Fanout {
    fn on_frame(&mut self, frame: &[u8]) {
        for sink in self.sinks.iter_mut() {
            sink.on_frame(frame);
        }
    }
}
