//! Sensor Device Interface
//!
//! The boundary between the broadcast core and the capture hardware:
//!
//! - **queue**: Blocking frame queue fed by capture callbacks
//! - **synthetic**: Test-pattern backend that runs without hardware
//! - **error**: Device failure types
//!
//! # Architecture
//!
//! ```text
//! Capture thread (driver-owned):
//!   raw frame → FrameQueue::push
//!
//! Publish worker:
//!   DeviceProxy::next_frame → FrameQueue::pop(timeout) → Frame
//! ```
//!
//! Backend-specific pixel formats stay behind [`DeviceProxy`]; depth frames are
//! always 16-bit samples and video frames are always packed RGB triples by the
//! time they leave a backend.

pub mod error;
pub mod queue;
pub mod synthetic;

pub use error::{DeviceError, DeviceResult};
pub use queue::FrameQueue;
pub use synthetic::{SyntheticConfig, SyntheticDevice};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How long a publish worker waits for a frame before re-checking for shutdown
pub const FRAME_POP_TIMEOUT: Duration = Duration::from_millis(30);

/// The two sensor streams a device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Depth,
    Video,
}

impl StreamKind {
    /// Streams in the order the server starts them
    pub const ALL: [StreamKind; 2] = [StreamKind::Video, StreamKind::Depth];

    /// Topic name subscribers use for this stream
    pub fn topic(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Video => "video",
        }
    }

    /// Raw samples per pixel in frames of this kind
    pub fn samples_per_pixel(&self) -> usize {
        match self {
            StreamKind::Depth => 1,
            StreamKind::Video => 3,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// One captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One depth sample per pixel
    Depth(Vec<u16>),
    /// Packed RGB, three bytes per pixel
    Video(Vec<u8>),
}

impl Frame {
    pub fn kind(&self) -> StreamKind {
        match self {
            Frame::Depth(_) => StreamKind::Depth,
            Frame::Video(_) => StreamKind::Video,
        }
    }
}

/// Frame geometry of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixels per frame
    pub fn rect_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capability set every capture backend provides.
///
/// Implementations are shared between the publish workers and the shutdown
/// path, so all methods take `&self` and use interior mutability.
pub trait DeviceProxy: Send + Sync {
    /// Fixed geometry of the given stream for this device session
    fn resolution(&self, kind: StreamKind) -> Resolution;

    /// Pixels per frame of the given stream
    fn frame_rect_size(&self, kind: StreamKind) -> usize {
        self.resolution(kind).rect_size()
    }

    /// Begin capturing the given stream. Starting a running stream is a no-op.
    fn start_stream(&self, kind: StreamKind) -> DeviceResult<()>;

    /// Stop capturing the given stream. Stopping a stopped stream is a no-op.
    fn stop_stream(&self, kind: StreamKind) -> DeviceResult<()>;

    /// Wait up to `timeout` for the next captured frame of the given stream
    fn next_frame(&self, kind: StreamKind, timeout: Duration) -> Option<Frame>;
}
