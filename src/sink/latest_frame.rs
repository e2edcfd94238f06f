use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::FrameSink;

/// One published frame and its position in the publish order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub sequence: u64,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct State {
    sequence: u64,
    frame: Bytes,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    updated: Condvar,
}

/// Latest-frame publisher shared between the stream worker and readers.
///
/// The stream worker publishes through the [`FrameSink`] impl; any number of
/// clones can read the newest frame or block until a newer one arrives.
/// Frames are copied out of the extractor's buffer on publish, so readers
/// never observe a frame being overwritten.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    shared: Arc<Shared>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: &[u8]) {
        let data = Bytes::copy_from_slice(frame);
        {
            let mut state = self.shared.state.lock();
            state.frame = data;
            state.sequence += 1;
        }
        self.shared.updated.notify_all();
    }

    /// Newest frame, or `None` before the first publish.
    pub fn snapshot(&self) -> Option<FrameSnapshot> {
        let state = self.shared.state.lock();
        (state.sequence > 0).then(|| FrameSnapshot {
            sequence: state.sequence,
            data: state.frame.clone(),
        })
    }

    /// Blocks until a frame newer than `seen` is published or `timeout`
    /// elapses.
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> Option<FrameSnapshot> {
        let mut state = self.shared.state.lock();
        if state.sequence <= seen {
            self.shared
                .updated
                .wait_while_for(&mut state, |state| state.sequence <= seen, timeout);
        }
        (state.sequence > seen).then(|| FrameSnapshot {
            sequence: state.sequence,
            data: state.frame.clone(),
        })
    }

    pub fn sequence(&self) -> u64 {
        self.shared.state.lock().sequence
    }
}

impl FrameSink for LatestFrame {
    fn on_frame(&mut self, frame: &[u8]) {
        self.publish(frame);
    }
}
