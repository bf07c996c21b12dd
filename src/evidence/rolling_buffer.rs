// src/evidence/rolling_buffer.rs
//
// Fixed-capacity FIFO of the most recent raw frames. Always fed, whatever
// the violation state; finalization takes a copy of it as pre-event context.

use crate::types::SharedFrame;
use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 300; // ~10s at 30fps

pub struct RollingFrameBuffer {
    frames: VecDeque<SharedFrame>,
    capacity: usize,
}

impl Default for RollingFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingFrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: SharedFrame) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Oldest-first copy, detached from later pushes.
    pub fn snapshot(&self) -> Vec<SharedFrame> {
        self.frames.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
