// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera ring buffer — fixed-capacity, single-producer / multi-consumer.
//!
//! Holds the last `N` frames for one camera. The appender (the RTSP worker
//! or the push sink) never blocks and never waits on a reader; readers clone
//! an `Arc<Frame>` handle under a short-lived lock, so no reader ever aliases
//! the appender's next write and no reader can torn-read a frame's fields.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::frame::Frame;

pub struct RingBuffer {
    capacity: usize,
    frames: RwLock<VecDeque<Arc<Frame>>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be > 0");
        Self { capacity, frames: RwLock::new(VecDeque::with_capacity(capacity)) }
    }

    /// Append a frame, evicting the oldest one if the buffer is already full.
    /// O(1) amortized; never blocks on a reader.
    pub fn append(&self, frame: Frame) {
        let mut guard = self.frames.write();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(Arc::new(frame));
    }

    /// The most recently appended frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.read().back().cloned()
    }

    /// The last `k` frames (k clamped to `capacity`) in append order.
    pub fn snapshot(&self, k: usize) -> Vec<Arc<Frame>> {
        let guard = self.frames.read();
        let k = k.min(guard.len());
        guard.iter().rev().take(k).rev().cloned().collect()
    }

    /// Current number of held frames.
    pub fn fill(&self) -> usize {
        self.frames.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DecodedImage, FrameSource};

    fn frame(seq: u64) -> Frame {
        Frame {
            image: DecodedImage::new(1, 1, 1, vec![0]),
            timestamp: seq as f64,
            source: FrameSource::HttpPush,
            seq,
        }
    }

    #[test]
    fn empty_buffer_has_no_latest() {
        let rb = RingBuffer::new(4);
        assert!(rb.latest().is_none());
        assert_eq!(rb.fill(), 0);
    }

    #[test]
    fn append_and_latest() {
        let rb = RingBuffer::new(4);
        rb.append(frame(0));
        rb.append(frame(1));
        assert_eq!(rb.latest().unwrap().seq, 1);
        assert_eq!(rb.fill(), 2);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let rb = RingBuffer::new(5);
        for i in 0..7u64 {
            rb.append(frame(i));
        }
        assert_eq!(rb.fill(), 5);
        let snap = rb.snapshot(5);
        let seqs: Vec<u64> = snap.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn snapshot_respects_k_and_order() {
        let rb = RingBuffer::new(5);
        for i in 0..7u64 {
            rb.append(frame(i));
        }
        let snap = rb.snapshot(3);
        let seqs: Vec<u64> = snap.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6]);
    }

    #[test]
    fn snapshot_k_greater_than_fill_returns_all() {
        let rb = RingBuffer::new(5);
        rb.append(frame(0));
        rb.append(frame(1));
        let snap = rb.snapshot(100);
        assert_eq!(snap.len(), 2);
    }
}
