//! Network Module Implementation
//!
//! This module turns the byte stream of an MJPEG-over-HTTP response into
//! discrete JPEG frames.
//!
//! # Architecture
//!
//! The network module is built on tokio's async I/O primitives and consists of:
//! - Session handling for one TCP/HTTP connection to the camera
//! - Response head parsing, which also discovers the multipart boundary
//! - An incremental frame extractor fed with whatever the socket returns
//!
//! # Components
//!
//! - `StreamSession`: connects, sends the request and reads bounded chunks
//! - `ResponseHead`: status line and headers of the streaming response
//! - `SearchPattern`: chunk-boundary-safe substring matcher
//! - `FrameBuffer`: fixed-capacity payload buffer, allocated once
//! - `FrameExtractor`: boundary / headers / payload state machine
//!
//! # Features
//!
//! - Frames reassembled across arbitrary read splits
//! - Frame size validation against the buffer capacity
//! - Malformed parts skipped without dropping the connection

pub use connection::{stream_request, ReadOutcome, StreamSession};
pub use extractor::{ExtractorStats, FrameExtractor, Phase};
pub use frame_buffer::FrameBuffer;
pub use response_head::{find_head_end, ResponseHead};
pub use search_pattern::SearchPattern;
mod connection;
mod extractor;
mod frame_buffer;
mod response_head;
mod search_pattern;
