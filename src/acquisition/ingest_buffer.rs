// src/acquisition/ingest_buffer.rs
//! Shared sample buffer between device transports and the phase controller

use crate::Sample;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Holds samples contributed since the last drain.
///
/// Transports push from their own tasks; the phase controller drains on
/// every poll tick. Both sides take the same lock, so a drain never observes
/// a partially appended batch.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    samples: Mutex<Vec<Sample>>,
    total_pushed: AtomicU64,
}

impl IngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with room for `capacity` samples before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(capacity)),
            total_pushed: AtomicU64::new(0),
        }
    }

    /// Append samples to the tail
    pub fn push(&self, samples: &[Sample]) {
        if samples.is_empty() {
            return;
        }
        self.samples.lock().extend_from_slice(samples);
        self.total_pushed
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
    }

    /// Return and clear everything buffered so far
    pub fn drain_all(&self) -> Vec<Sample> {
        let mut guard = self.samples.lock();
        let capacity = guard.capacity();
        std::mem::replace(&mut *guard, Vec::with_capacity(capacity))
    }

    /// Drop buffered samples without returning them
    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Count of every sample ever pushed, including drained and cleared ones
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_and_drain() {
        let buffer = IngestBuffer::new();
        buffer.push(&[1.0, 2.0]);
        buffer.push(&[3.0]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.drain_all(), vec![1.0, 2.0, 3.0]);
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_empty_push_is_noop() {
        let buffer = IngestBuffer::new();
        buffer.push(&[]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_pushed(), 0);
    }

    #[test]
    fn test_push_after_drain_goes_to_next_drain() {
        let buffer = IngestBuffer::new();
        buffer.push(&[1.0]);

        let first = buffer.drain_all();
        buffer.push(&[2.0]);

        assert_eq!(first, vec![1.0]);
        assert_eq!(buffer.drain_all(), vec![2.0]);
    }

    #[test]
    fn test_clear_keeps_counter() {
        let buffer = IngestBuffer::with_capacity(16);
        buffer.push(&[1.0, 2.0, 3.0]);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.total_pushed(), 3);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let buffer = Arc::new(IngestBuffer::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let buffer = buffer.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..250 {
                    buffer.push(&[1.0, 1.0]);
                }
            }));
        }

        let mut drained = 0;
        while drained < 2000 {
            drained += buffer.drain_all().len();
            thread::yield_now();
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(drained + buffer.len(), 2000);
        assert_eq!(buffer.total_pushed(), 2000);
    }
}
