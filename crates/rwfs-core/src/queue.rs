//! Blocking bounded FIFO
//!
//! Hands accepted connections from the acceptor to the worker pool.
//! Storage is a fixed-capacity `ArrayQueue`; a small gate mutex plus two
//! condvars turn it into a blocking queue. `push` waits while the queue is
//! full, which is what throttles the acceptor when every worker is busy.

use std::sync::{Condvar, Mutex};

use crossbeam_queue::ArrayQueue;

use crate::error::{CoreError, CoreResult};

/// Fixed-capacity FIFO with blocking push and pop
pub struct BoundedQueue<T> {
    slots: ArrayQueue<T>,

    /// Held across every check-then-wait so wakeups are never lost
    gate: Mutex<()>,

    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity);
        }
        Ok(Self {
            slots: ArrayQueue::new(capacity),
            gate: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Append `item`, blocking while the queue is full
    pub fn push(&self, mut item: T) -> CoreResult<()> {
        let mut gate = self.gate.lock()?;
        loop {
            match self.slots.push(item) {
                Ok(()) => break,
                Err(back) => {
                    item = back;
                    gate = self.not_full.wait(gate)?;
                }
            }
        }
        drop(gate);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking while the queue is empty
    pub fn pop(&self) -> CoreResult<T> {
        let mut gate = self.gate.lock()?;
        let item = loop {
            match self.slots.pop() {
                Some(item) => break item,
                None => gate = self.not_empty.wait(gate)?,
            }
        };
        drop(gate);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Append without blocking; hands the item back if the queue is full
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let gate = match self.gate.lock() {
            Ok(g) => g,
            Err(_) => return Err(item),
        };
        self.slots.push(item)?;
        drop(gate);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        let gate = self.gate.lock().ok()?;
        let item = self.slots.pop()?;
        drop(gate);
        self.not_full.notify_one();
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
