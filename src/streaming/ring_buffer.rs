//! Bounded frame queue between the tick and the device callback
//!
//! - Producer: the tick, pushing one tick's mixed frames at a time
//! - Consumer: the audio device callback on its own thread
//!
//! Storage is fixed at creation. Positions are atomics that only grow; the
//! mutex guards the slice copy and is never held across a callback.

use crate::{CsndError, Result, StereoFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest accepted capacity (frames)
const MAX_CAPACITY: usize = 1 << 24;

/// Single-producer, single-consumer queue of stereo frames
///
/// Capacity is rounded up to a power of two. Positions are free-running
/// counters, so every slot is usable and a full queue holds `capacity`
/// frames.
#[derive(Debug)]
pub struct FrameQueue {
    buffer: Mutex<Vec<StereoFrame>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    capacity: usize,
    mask: usize,
}

impl FrameQueue {
    /// Create a queue holding at least `requested_capacity` frames
    ///
    /// # Errors
    ///
    /// Returns [`CsndError::ConfigError`] for a zero or oversized capacity.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(CsndError::ConfigError(
                "Frame queue capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();
        if capacity > MAX_CAPACITY {
            return Err(CsndError::ConfigError(format!(
                "Frame queue capacity {capacity} exceeds maximum {MAX_CAPACITY}"
            )));
        }

        Ok(FrameQueue {
            buffer: Mutex::new(vec![[0, 0]; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Storage capacity in frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames ready to be popped
    pub fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Whether no frame is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free slots for the producer
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// Push frames; returns how many fit (the rest are not queued)
    pub fn push(&self, frames: &[StereoFrame]) -> usize {
        let mut buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = self.capacity - write_pos.wrapping_sub(read_pos);

        let to_write = frames.len().min(available);
        if to_write == 0 {
            return 0;
        }

        let write_idx = write_pos & self.mask;
        if write_idx + to_write <= self.capacity {
            buf[write_idx..write_idx + to_write].copy_from_slice(&frames[..to_write]);
        } else {
            let first_part = self.capacity - write_idx;
            buf[write_idx..].copy_from_slice(&frames[..first_part]);
            buf[..to_write - first_part].copy_from_slice(&frames[first_part..to_write]);
        }
        drop(buf);

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Pop up to `dest.len()` frames into the front of `dest`
    pub fn pop(&self, dest: &mut [StereoFrame]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = write_pos.wrapping_sub(read_pos);

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let read_idx = read_pos & self.mask;
        if read_idx + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&buf[read_idx..read_idx + to_read]);
        } else {
            let first_part = self.capacity - read_idx;
            dest[..first_part].copy_from_slice(&buf[read_idx..]);
            dest[first_part..to_read].copy_from_slice(&buf[..to_read - first_part]);
        }
        drop(buf);

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Discard every queued frame
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }

    /// Fill level in `[0.0, 1.0]`
    pub fn fill_percentage(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_QUEUE_CAPACITY;
    use std::sync::Arc;

    #[test]
    fn test_queue_power_of_two() {
        let queue = FrameQueue::new(1000).unwrap();
        assert_eq!(queue.capacity(), 1024);
        assert!(queue.is_empty());
        assert_eq!(queue.free(), 1024);
    }

    #[test]
    fn test_push_and_pop() {
        let queue = FrameQueue::new(16).unwrap();
        let frames = [[1, -1], [2, -2], [3, -3]];
        assert_eq!(queue.push(&frames), 3);
        assert_eq!(queue.len(), 3);

        let mut dest = [[0, 0]; 8];
        assert_eq!(queue.pop(&mut dest), 3);
        assert_eq!(&dest[..3], &frames);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wrap_around_keeps_order() {
        let queue = FrameQueue::new(16).unwrap();
        let mut next = 0i16;
        let mut expected = 0i16;

        for _ in 0..10 {
            let batch: Vec<StereoFrame> = (0..7)
                .map(|_| {
                    next += 1;
                    [next, -next]
                })
                .collect();
            assert_eq!(queue.push(&batch), 7);

            let mut dest = [[0, 0]; 7];
            assert_eq!(queue.pop(&mut dest), 7);
            for frame in dest {
                expected += 1;
                assert_eq!(frame, [expected, -expected]);
            }
        }
    }

    #[test]
    fn test_overflow_drops_excess() {
        let queue = FrameQueue::new(8).unwrap();
        assert_eq!(queue.push(&[[1, 1]; 20]), 8);
        assert_eq!(queue.free(), 0);
        assert_eq!(queue.push(&[[2, 2]]), 0);
    }

    #[test]
    fn test_default_capacity_is_fully_usable() {
        let queue = FrameQueue::new(FRAME_QUEUE_CAPACITY).unwrap();
        let frames = vec![[3, -3]; FRAME_QUEUE_CAPACITY + 16];
        assert_eq!(queue.push(&frames), FRAME_QUEUE_CAPACITY);
        assert_eq!(queue.len(), FRAME_QUEUE_CAPACITY);
        assert_eq!(queue.fill_percentage(), 1.0);

        // a full queue still wraps correctly once drained
        let mut dest = vec![[0, 0]; 100];
        assert_eq!(queue.pop(&mut dest), 100);
        assert_eq!(queue.push(&[[4, -4]; 100]), 100);
        assert_eq!(queue.free(), 0);
    }

    #[test]
    fn test_clear() {
        let queue = FrameQueue::new(16).unwrap();
        queue.push(&[[1, 1]; 5]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.fill_percentage(), 0.0);
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(FrameQueue::new(0).is_err());
        assert!(FrameQueue::new(MAX_CAPACITY + 1).is_err());
    }

    #[test]
    fn test_cross_thread_transfer() {
        let queue = Arc::new(FrameQueue::new(64).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut sent = 0i16;
                while sent < 1000 {
                    if queue.push(&[[sent, sent]]) == 1 {
                        sent += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::new();
        let mut dest = [[0, 0]; 16];
        while received.len() < 1000 {
            let n = queue.pop(&mut dest);
            received.extend_from_slice(&dest[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert!(received.iter().enumerate().all(|(i, f)| f[0] == i as i16));
    }
}
