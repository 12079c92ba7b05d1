//! Frame Publishers
//!
//! A publisher turns raw device frames into protocol messages for one topic:
//!
//! ```text
//! DeviceProxy::next_frame → pixel transform (RGBA) → Message::encode → Channel::publish
//! ```
//!
//! - **depth**: 16-bit depth samples → inverted greyscale RGBA
//! - **video**: packed RGB → RGBA
//!
//! Both publishers allocate their RGBA and wire buffers once, sized to the
//! device's frame geometry, and reuse them for every frame.

mod depth;
mod video;

pub use depth::{depth_to_rgba, DepthPublisher};
pub use video::{rgb_to_rgba, VideoPublisher};

use std::borrow::Cow;

use crate::device::StreamKind;
use crate::protocol::{now_millis, Message, Payload, ProtocolResult};
use crate::websocket::Channel;

/// Bytes per output pixel
pub const RGBA_BYTES: usize = 4;

/// One topic's frame source
pub trait Publisher: Send {
    /// Stream this publisher pulls from
    fn kind(&self) -> StreamKind;

    /// Pull at most one frame and publish it on `channel`.
    ///
    /// Returns `Ok(false)` when no usable frame arrived within the device
    /// timeout; that is the normal idle case, not an error.
    fn publish_new_data(&mut self, channel: &Channel) -> ProtocolResult<bool>;
}

/// Reusable output buffers shared by both publishers
struct FrameEncoder {
    kind: StreamKind,
    rgba: Vec<u8>,
    wire: Vec<u8>,
    last_timestamp: u64,
}

impl FrameEncoder {
    fn new(kind: StreamKind, rect_size: usize) -> Self {
        Self {
            kind,
            rgba: vec![0; rect_size * RGBA_BYTES],
            wire: Vec::new(),
            last_timestamp: 0,
        }
    }

    fn pixel_count(&self) -> usize {
        self.rgba.len() / RGBA_BYTES
    }

    /// Encode the current RGBA buffer and fan it out
    fn publish(&mut self, channel: &Channel) -> ProtocolResult<usize> {
        // Wall-clock steps backwards must not reorder a topic's timestamps
        let timestamp = now_millis().max(self.last_timestamp);
        self.last_timestamp = timestamp;

        let message = Message {
            timestamp,
            payload: Payload::DeviceData {
                kind: self.kind,
                bytes: Cow::Borrowed(self.rgba.as_slice()),
            },
        };
        message.encode_into(&mut self.wire)?;

        Ok(channel.publish(&self.wire))
    }
}
