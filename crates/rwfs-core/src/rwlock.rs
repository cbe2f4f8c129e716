//! Reader/writer lock with bounded reader batches
//!
//! `ResourceLock` guards one servable file. Any number of readers may hold
//! it together; a writer holds it alone. To keep a steady stream of readers
//! from starving writers, at most `reader_batch` readers are admitted while
//! a writer is waiting. Once the batch is used up, new readers queue behind
//! the writer until it has run.
//!
//! After a writer releases, readers that queued up behind it get the next
//! batch before another writer runs. Writers among themselves are admitted
//! in arrival (ticket) order.
//!
//! # Example
//!
//! ```
//! use rwfs_core::ResourceLock;
//!
//! let lock = ResourceLock::new(1).unwrap();
//! {
//!     let _r1 = lock.read_acquire().unwrap();
//!     let _r2 = lock.read_acquire().unwrap();
//! }
//! let _w = lock.write_acquire().unwrap();
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{CoreError, CoreResult};

/// Counters protected by the lock's internal mutex
#[derive(Debug, Default)]
struct LockState {
    /// Readers currently holding the lock
    active_readers: usize,

    /// Readers blocked in `read_acquire`
    waiting_readers: usize,

    /// Writers blocked in `write_acquire`
    waiting_writers: usize,

    /// A writer holds the lock
    writer_active: bool,

    /// Readers admitted while a writer was waiting; reset when a writer runs
    batch: usize,

    /// Next ticket handed to an arriving writer
    next_ticket: u64,

    /// Ticket of the writer allowed to run next
    serving: u64,
}

/// Point-in-time view of a lock's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    pub active_readers: usize,
    pub waiting_readers: usize,
    pub waiting_writers: usize,
    pub writer_active: bool,
    pub batch: usize,
}

/// Fairness-aware reader/writer lock for a single resource
pub struct ResourceLock {
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
    reader_batch: usize,
}

impl ResourceLock {
    /// Create a lock admitting at most `reader_batch` readers while a writer waits
    pub fn new(reader_batch: usize) -> CoreResult<Self> {
        if reader_batch == 0 {
            return Err(CoreError::InvalidReaderBatch);
        }
        Ok(Self {
            state: Mutex::new(LockState::default()),
            readers: Condvar::new(),
            writers: Condvar::new(),
            reader_batch,
        })
    }

    /// Configured reader batch
    pub fn reader_batch(&self) -> usize {
        self.reader_batch
    }

    /// Block until admitted as a reader
    ///
    /// Only fails if the internal mutex was already poisoned on entry. Once
    /// queued, a waiter always runs to admission so the counters stay exact.
    pub fn read_acquire(&self) -> CoreResult<ReadGuard<'_>> {
        let mut state = self.state.lock()?;
        state.waiting_readers += 1;
        while !self.reader_may_enter(&state) {
            state = self.readers.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_readers -= 1;
        self.admit_reader(&mut state);
        Ok(ReadGuard { lock: self })
    }

    /// Admit a reader only if that would not block
    pub fn try_read_acquire(&self) -> CoreResult<Option<ReadGuard<'_>>> {
        let mut state = self.state.lock()?;
        if !self.reader_may_enter(&state) {
            return Ok(None);
        }
        self.admit_reader(&mut state);
        Ok(Some(ReadGuard { lock: self }))
    }

    /// Block until this thread is the only holder
    ///
    /// Resets the reader batch once granted.
    pub fn write_acquire(&self) -> CoreResult<WriteGuard<'_>> {
        let mut state = self.state.lock()?;
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting_writers += 1;
        while !self.writer_may_enter(&state, ticket) {
            state = self.writers.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting_writers -= 1;
        self.admit_writer(&mut state);
        Ok(WriteGuard { lock: self })
    }

    /// Take the lock exclusively only if no one holds or waits for it
    pub fn try_write_acquire(&self) -> CoreResult<Option<WriteGuard<'_>>> {
        let mut state = self.state.lock()?;
        if state.waiting_writers > 0 || !self.writer_may_enter(&state, state.next_ticket) {
            return Ok(None);
        }
        state.next_ticket += 1;
        self.admit_writer(&mut state);
        Ok(Some(WriteGuard { lock: self }))
    }

    /// Current counters
    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.lock_state();
        LockSnapshot {
            active_readers: state.active_readers,
            waiting_readers: state.waiting_readers,
            waiting_writers: state.waiting_writers,
            writer_active: state.writer_active,
            batch: state.batch,
        }
    }

    fn reader_may_enter(&self, state: &LockState) -> bool {
        if state.writer_active {
            return false;
        }
        !(state.waiting_writers > 0 && state.batch >= self.reader_batch)
    }

    fn writer_may_enter(&self, state: &LockState, ticket: u64) -> bool {
        if ticket != state.serving || state.writer_active || state.active_readers > 0 {
            return false;
        }
        // Queued readers still have part of their batch left.
        !(state.waiting_readers > 0 && state.batch < self.reader_batch)
    }

    fn admit_reader(&self, state: &mut LockState) {
        state.active_readers += 1;
        if state.waiting_writers > 0 {
            state.batch += 1;
        }
    }

    fn admit_writer(&self, state: &mut LockState) {
        state.serving += 1;
        state.writer_active = true;
        state.batch = 0;
    }

    /// Release paths must always run, so they see through poisoning.
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_release(&self) {
        let mut state = self.lock_state();
        debug_assert!(state.active_readers > 0);
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            self.writers.notify_all();
        }
    }

    fn write_release(&self) {
        let mut state = self.lock_state();
        debug_assert!(state.writer_active);
        state.writer_active = false;
        if state.waiting_readers > 0 {
            self.readers.notify_all();
        } else if state.waiting_writers > 0 {
            self.writers.notify_all();
        }
    }
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("reader_batch", &self.reader_batch)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Shared access; released when dropped
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ResourceLock,
}

impl ReadGuard<'_> {
    /// Release the read lock now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.read_release();
    }
}

/// Exclusive access; released when dropped
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ResourceLock,
}

impl WriteGuard<'_> {
    /// Release the write lock now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.write_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_zero_batch_rejected() {
        assert_eq!(ResourceLock::new(0).unwrap_err(), CoreError::InvalidReaderBatch);
    }

    #[test]
    fn test_readers_share() {
        let lock = ResourceLock::new(1).unwrap();
        let r1 = lock.read_acquire().unwrap();
        let r2 = lock.read_acquire().unwrap();
        assert_eq!(lock.snapshot().active_readers, 2);
        assert!(lock.try_write_acquire().unwrap().is_none());
        drop(r1);
        drop(r2);
        assert!(lock.try_write_acquire().unwrap().is_some());
    }

    #[test]
    fn test_writer_excludes_everyone() {
        let lock = ResourceLock::new(4).unwrap();
        let w = lock.write_acquire().unwrap();
        assert!(lock.snapshot().writer_active);
        assert!(lock.try_read_acquire().unwrap().is_none());
        assert!(lock.try_write_acquire().unwrap().is_none());
        w.release();
        assert!(!lock.snapshot().writer_active);
        assert!(lock.try_read_acquire().unwrap().is_some());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let lock = Arc::new(ResourceLock::new(2).unwrap());
        let readers_in = Arc::new(AtomicUsize::new(0));
        let writers_in = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for i in 0..6 {
            let lock = Arc::clone(&lock);
            let readers_in = Arc::clone(&readers_in);
            let writers_in = Arc::clone(&writers_in);
            let is_writer = i % 3 == 0;
            handles.push(thread::spawn(move || {
                for _ in 0..300 {
                    if is_writer {
                        let _g = lock.write_acquire().unwrap();
                        assert_eq!(writers_in.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers_in.load(Ordering::SeqCst), 0);
                        thread::yield_now();
                        writers_in.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        let _g = lock.read_acquire().unwrap();
                        readers_in.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers_in.load(Ordering::SeqCst), 0);
                        thread::yield_now();
                        readers_in.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = lock.snapshot();
        assert_eq!(snap.active_readers, 0);
        assert!(!snap.writer_active);
        assert_eq!(snap.waiting_writers, 0);
    }

    #[test]
    fn test_waiting_writer_bounds_reader_batch() {
        let lock = Arc::new(ResourceLock::new(2).unwrap());

        // Admitted before any writer shows up; does not count toward the batch.
        let r0 = lock.read_acquire().unwrap();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _w = lock.write_acquire().unwrap();
            })
        };
        wait_until("writer to queue", || lock.snapshot().waiting_writers == 1);

        let r1 = lock.try_read_acquire().unwrap().expect("first batch slot");
        let r2 = lock.try_read_acquire().unwrap().expect("second batch slot");
        assert_eq!(lock.snapshot().batch, 2);
        assert!(lock.try_read_acquire().unwrap().is_none(), "batch exhausted");

        drop(r0);
        drop(r1);
        assert_eq!(lock.snapshot().waiting_writers, 1);
        drop(r2);

        writer.join().unwrap();
        let snap = lock.snapshot();
        assert_eq!(snap.waiting_writers, 0);
        assert_eq!(snap.batch, 0);
        assert!(lock.try_read_acquire().unwrap().is_some());
    }

    #[test]
    fn test_queued_readers_run_before_next_writer() {
        let lock = Arc::new(ResourceLock::new(1).unwrap());
        let order = Arc::new(Mutex::new(Vec::new()));

        let w1 = lock.write_acquire().unwrap();

        let reader = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _r = lock.read_acquire().unwrap();
                order.lock().unwrap().push("reader");
                thread::sleep(Duration::from_millis(20));
            })
        };
        wait_until("reader to queue", || lock.snapshot().waiting_readers == 1);

        let writer = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _w = lock.write_acquire().unwrap();
                order.lock().unwrap().push("writer");
            })
        };
        wait_until("writer to queue", || lock.snapshot().waiting_writers == 1);

        drop(w1);
        reader.join().unwrap();
        writer.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["reader", "writer"]);
    }

    #[test]
    fn test_writers_admitted_in_arrival_order() {
        let lock = Arc::new(ResourceLock::new(1).unwrap());
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = lock.write_acquire().unwrap();

        let mut handles = vec![];
        for id in 1..=3 {
            let lock_c = Arc::clone(&lock);
            let order_c = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _w = lock_c.write_acquire().unwrap();
                order_c.lock().unwrap().push(id);
            }));
            wait_until("writer to queue", || lock.snapshot().waiting_writers == id);
        }

        drop(held);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_poisoned_while_waiting_still_admits() {
        let lock = Arc::new(ResourceLock::new(1).unwrap());
        let held = lock.write_acquire().unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.write_acquire().map(WriteGuard::release).is_ok())
        };
        wait_until("queued writer", || lock.snapshot().waiting_writers == 1);

        let l = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _state = l.state.lock().unwrap();
            panic!("poison the state mutex");
        })
        .join();

        held.release();
        assert!(waiter.join().unwrap(), "queued writer must still be admitted");

        let snap = lock.snapshot();
        assert_eq!(snap.waiting_writers, 0);
        assert!(!snap.writer_active);
        assert_eq!(lock.state.lock().unwrap_or_else(PoisonError::into_inner).serving, 2);

        // New callers see the poisoning instead of queueing.
        assert!(matches!(lock.write_acquire(), Err(CoreError::Poisoned(_))));
        assert!(matches!(lock.read_acquire(), Err(CoreError::Poisoned(_))));
    }
}
