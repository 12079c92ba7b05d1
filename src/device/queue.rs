//! Frame Queue
//!
//! Hand-off between a capture callback and a publish worker.
//!
//! Push never waits on the consumer and the queue is unbounded: a consumer
//! that falls behind accumulates frames rather than throttling the device.
//! Pop waits at most `timeout` so the consumer loop can observe shutdown
//! between frames.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;

/// FIFO of whole frames
///
/// The queue holds both ends of its channel, so it never disconnects while
/// it exists.
pub struct FrameQueue<T> {
    sender: Sender<Vec<T>>,
    receiver: Receiver<Vec<T>>,
}

impl<T> FrameQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Append a frame and wake one waiting consumer
    pub fn push(&self, frame: Vec<T>) {
        // Cannot fail: `self.receiver` keeps the channel connected
        let _ = self.sender.send(frame);
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` if the queue is still empty when the timeout elapses.
    pub fn pop(&self, timeout: Duration) -> Option<Vec<T>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Number of frames waiting
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_pop_returns_frames_in_push_order() {
        let queue = FrameQueue::new();
        for i in 0..5u16 {
            queue.push(vec![i; 4]);
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5u16 {
            let frame = queue.pop(Duration::from_secs(1)).unwrap();
            assert_eq!(frame, vec![i; 4]);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_on_empty_queue_times_out() {
        let queue: FrameQueue<u8> = FrameQueue::new();
        let timeout = Duration::from_millis(50);

        let start = Instant::now();
        let frame = queue.pop(timeout);
        let elapsed = start.elapsed();

        assert!(frame.is_none());
        assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
        assert!(elapsed < timeout * 2, "overslept: {:?}", elapsed);
    }

    #[test]
    fn test_pop_wakes_on_push_from_another_thread() {
        let queue = Arc::new(FrameQueue::new());
        let producer = Arc::clone(&queue);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(vec![7u8, 8, 9]);
        });

        let start = Instant::now();
        let frame = queue.pop(Duration::from_secs(5));
        assert_eq!(frame, Some(vec![7, 8, 9]));
        assert!(start.elapsed() < Duration::from_secs(5));

        handle.join().unwrap();
    }

    #[test]
    fn test_frames_are_not_torn_across_threads() {
        let queue = Arc::new(FrameQueue::new());
        let producer = Arc::clone(&queue);

        let handle = thread::spawn(move || {
            for i in 0..200u16 {
                producer.push(vec![i; 64]);
            }
        });

        let mut received = 0u16;
        while received < 200 {
            if let Some(frame) = queue.pop(Duration::from_millis(500)) {
                assert!(frame.iter().all(|&s| s == received));
                received += 1;
            }
        }

        handle.join().unwrap();
    }
}
