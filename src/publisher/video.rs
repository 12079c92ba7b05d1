use std::sync::Arc;
use std::time::Duration;

use super::{FrameEncoder, Publisher, RGBA_BYTES};
use crate::device::{DeviceProxy, Frame, StreamKind};
use crate::protocol::ProtocolResult;
use crate::websocket::Channel;

const RGB_BYTES: usize = 3;

/// Publishes colour frames with an opaque alpha channel added
pub struct VideoPublisher {
    device: Arc<dyn DeviceProxy>,
    timeout: Duration,
    encoder: FrameEncoder,
}

impl VideoPublisher {
    pub fn new(device: Arc<dyn DeviceProxy>, timeout: Duration) -> Self {
        let rect_size = device.frame_rect_size(StreamKind::Video);
        Self {
            device,
            timeout,
            encoder: FrameEncoder::new(StreamKind::Video, rect_size),
        }
    }
}

impl Publisher for VideoPublisher {
    fn kind(&self) -> StreamKind {
        StreamKind::Video
    }

    fn publish_new_data(&mut self, channel: &Channel) -> ProtocolResult<bool> {
        let rgb = match self.device.next_frame(StreamKind::Video, self.timeout) {
            Some(Frame::Video(rgb)) => rgb,
            Some(other) => {
                tracing::warn!(got = %other.kind(), "Discarding non-video frame");
                return Ok(false);
            }
            None => return Ok(false),
        };

        let expected = self.encoder.pixel_count() * StreamKind::Video.samples_per_pixel();
        if rgb.len() != expected {
            tracing::warn!(
                expected,
                got = rgb.len(),
                "Discarding video frame with wrong byte count"
            );
            return Ok(false);
        }

        rgb_to_rgba(&rgb, &mut self.encoder.rgba);
        self.encoder.publish(channel)?;
        Ok(true)
    }
}

/// Copy packed RGB into RGBA with alpha 255
pub fn rgb_to_rgba(rgb: &[u8], rgba: &mut [u8]) {
    for (pixel, color) in rgba
        .chunks_exact_mut(RGBA_BYTES)
        .zip(rgb.chunks_exact(RGB_BYTES))
    {
        pixel[..RGB_BYTES].copy_from_slice(color);
        pixel[RGB_BYTES] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_rgba() {
        let rgb = [10, 20, 30, 0, 0, 0, 255, 128, 1];
        let mut rgba = [7u8; 12];
        rgb_to_rgba(&rgb, &mut rgba);

        assert_eq!(rgba, [10, 20, 30, 255, 0, 0, 0, 255, 255, 128, 1, 255]);
    }
}
