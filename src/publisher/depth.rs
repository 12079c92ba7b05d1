use std::sync::Arc;
use std::time::Duration;

use super::{FrameEncoder, Publisher, RGBA_BYTES};
use crate::device::{DeviceProxy, Frame, StreamKind};
use crate::protocol::ProtocolResult;
use crate::websocket::Channel;

/// Publishes depth frames as inverted greyscale
pub struct DepthPublisher {
    device: Arc<dyn DeviceProxy>,
    timeout: Duration,
    encoder: FrameEncoder,
}

impl DepthPublisher {
    pub fn new(device: Arc<dyn DeviceProxy>, timeout: Duration) -> Self {
        let rect_size = device.frame_rect_size(StreamKind::Depth);
        Self {
            device,
            timeout,
            encoder: FrameEncoder::new(StreamKind::Depth, rect_size),
        }
    }
}

impl Publisher for DepthPublisher {
    fn kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn publish_new_data(&mut self, channel: &Channel) -> ProtocolResult<bool> {
        let samples = match self.device.next_frame(StreamKind::Depth, self.timeout) {
            Some(Frame::Depth(samples)) => samples,
            Some(other) => {
                tracing::warn!(got = %other.kind(), "Discarding non-depth frame");
                return Ok(false);
            }
            None => return Ok(false),
        };

        if samples.len() != self.encoder.pixel_count() {
            tracing::warn!(
                expected = self.encoder.pixel_count(),
                got = samples.len(),
                "Discarding depth frame with wrong sample count"
            );
            return Ok(false);
        }

        depth_to_rgba(&samples, &mut self.encoder.rgba);
        self.encoder.publish(channel)?;
        Ok(true)
    }
}

/// Map each depth sample to an opaque grey pixel.
///
/// Only the low byte of the sample is kept and then inverted, so near and far
/// readings wrap through the greyscale range every 256 units.
pub fn depth_to_rgba(samples: &[u16], rgba: &mut [u8]) {
    for (pixel, &sample) in rgba.chunks_exact_mut(RGBA_BYTES).zip(samples) {
        let value = 255 - sample as u8;
        pixel.copy_from_slice(&[value, value, value, 255]);
    }
}
