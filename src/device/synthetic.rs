//! Synthetic Device
//!
//! A capture backend that needs no hardware. Each started stream owns a
//! capture thread that renders a moving test pattern at a fixed rate and pushes
//! it into the stream's [`FrameQueue`], the same way a driver callback would.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{DeviceError, DeviceProxy, DeviceResult, Frame, FrameQueue, Resolution, StreamKind};

/// Depth samples wrap at 11 bits, matching structured-light sensors
const DEPTH_RANGE: u64 = 2048;

/// RGB colour bars, left to right
const COLOR_BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Frame mode of the synthetic device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Frames per second for each stream
    pub fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Test-pattern capture backend
pub struct SyntheticDevice {
    resolution: Resolution,
    frame_interval: Duration,
    depth: CaptureStream<u16>,
    video: CaptureStream<u8>,
}

impl SyntheticDevice {
    /// Create a device with the given frame mode
    pub fn new(config: SyntheticConfig) -> DeviceResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(DeviceError::InvalidMode(format!(
                "resolution must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        if config.fps == 0 {
            return Err(DeviceError::InvalidMode("fps must be non-zero".to_string()));
        }

        Ok(Self {
            resolution: Resolution::new(config.width, config.height),
            frame_interval: Duration::from_secs(1) / config.fps,
            depth: CaptureStream::new(),
            video: CaptureStream::new(),
        })
    }

    /// Whether the capture thread for `kind` is running
    pub fn is_streaming(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Depth => self.depth.is_running(),
            StreamKind::Video => self.video.is_running(),
        }
    }
}

impl DeviceProxy for SyntheticDevice {
    fn resolution(&self, _kind: StreamKind) -> Resolution {
        self.resolution
    }

    fn start_stream(&self, kind: StreamKind) -> DeviceResult<()> {
        let resolution = self.resolution;
        match kind {
            StreamKind::Depth => self.depth.start(kind, self.frame_interval, move |tick| {
                depth_pattern(resolution, tick)
            }),
            StreamKind::Video => self.video.start(kind, self.frame_interval, move |tick| {
                video_pattern(resolution, tick)
            }),
        }
    }

    fn stop_stream(&self, kind: StreamKind) -> DeviceResult<()> {
        match kind {
            StreamKind::Depth => self.depth.stop(kind),
            StreamKind::Video => self.video.stop(kind),
        }
    }

    fn next_frame(&self, kind: StreamKind, timeout: Duration) -> Option<Frame> {
        match kind {
            StreamKind::Depth => self.depth.frames.pop(timeout).map(Frame::Depth),
            StreamKind::Video => self.video.frames.pop(timeout).map(Frame::Video),
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        for kind in StreamKind::ALL {
            if let Err(e) = self.stop_stream(kind) {
                tracing::warn!(stream = %kind, error = %e, "Failed to stop stream on drop");
            }
        }
    }
}

/// A running capture thread and the handle that stops it
struct Capture {
    /// Dropping this wakes the thread and ends its loop
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// One stream's queue and capture thread
struct CaptureStream<T> {
    frames: Arc<FrameQueue<T>>,
    capture: Mutex<Option<Capture>>,
}

impl<T: Send + 'static> CaptureStream<T> {
    fn new() -> Self {
        Self {
            frames: Arc::new(FrameQueue::new()),
            capture: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn start<F>(&self, kind: StreamKind, interval: Duration, mut render: F) -> DeviceResult<()>
    where
        F: FnMut(u64) -> Vec<T> + Send + 'static,
    {
        let mut capture = self.lock();
        if capture.is_some() {
            return Ok(());
        }

        let (stop, stopped) = bounded::<()>(1);
        let frames = Arc::clone(&self.frames);

        let thread = thread::Builder::new()
            .name(format!("{}-capture", kind))
            .spawn(move || {
                let mut tick = 0u64;
                let mut deadline = Instant::now();
                loop {
                    frames.push(render(tick));
                    tick = tick.wrapping_add(1);

                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now;
                    }

                    match stopped.recv_timeout(deadline - now) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| DeviceError::StartStream {
                kind,
                reason: e.to_string(),
            })?;

        *capture = Some(Capture { stop, thread });
        tracing::debug!(stream = %kind, "Capture thread started");
        Ok(())
    }

    fn stop(&self, kind: StreamKind) -> DeviceResult<()> {
        let capture = self.lock().take();

        if let Some(Capture { stop, thread }) = capture {
            drop(stop);
            thread.join().map_err(|_| DeviceError::StopStream {
                kind,
                reason: "capture thread panicked".to_string(),
            })?;
            tracing::debug!(stream = %kind, "Capture thread stopped");
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Capture>> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Diagonal 11-bit gradient drifting one step per tick
fn depth_pattern(resolution: Resolution, tick: u64) -> Vec<u16> {
    let mut samples = Vec::with_capacity(resolution.rect_size());
    for y in 0..resolution.height as u64 {
        for x in 0..resolution.width as u64 {
            samples.push(((x + y + tick) % DEPTH_RANGE) as u16);
        }
    }
    samples
}

/// Vertical colour bars scrolling one pixel per tick
fn video_pattern(resolution: Resolution, tick: u64) -> Vec<u8> {
    let width = resolution.width as u64;
    let mut row = Vec::with_capacity(width as usize * 3);
    for x in 0..width {
        let bar = ((x + tick) % width) * COLOR_BARS.len() as u64 / width;
        row.extend_from_slice(&COLOR_BARS[bar as usize]);
    }

    let mut pixels = Vec::with_capacity(resolution.rect_size() * 3);
    for _ in 0..resolution.height {
        pixels.extend_from_slice(&row);
    }
    pixels
}
