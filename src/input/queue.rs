// src/input/queue.rs

//! Bounded hand-off between the input context and the drive loop.
//!
//! One producer pushes without blocking; one consumer drains everything at
//! the top of a cycle. When the queue is full the oldest event is discarded
//! and counted, so the newest input always gets through.

use crate::engine::InputEvent;
use log::warn;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct InputQueue {
    capacity: usize,
    events: Mutex<VecDeque<InputEvent>>,
    dropped: AtomicU64,
}

impl InputQueue {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        InputQueue {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, event: InputEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                warn!("InputQueue: full, {} event(s) dropped so far", dropped);
            }
        }
        events.push_back(event);
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&self) -> Vec<InputEvent> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
