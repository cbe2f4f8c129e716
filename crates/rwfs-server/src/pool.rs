//! `WorkerPool` - fixed set of worker threads fed by a bounded queue.
//!
//! Spawns N OS threads at creation. Each worker loops popping an item and
//! running the handler on it. `submit` blocks while the queue is full, so a
//! busy pool pushes back on whoever is producing work.
//!
//! A panicking handler is caught and logged; the worker keeps going.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use rwfs_core::{BoundedQueue, CoreResult};
use tracing::{debug, error};

use crate::error::{ServerError, ServerResult};

/// What travels through the queue
enum Task<T> {
    Run(T),
    Stop,
}

pub struct WorkerPool<T> {
    queue: Arc<BoundedQueue<Task<T>>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `workers` threads sharing a queue of `queue_capacity` slots
    pub fn new<F>(workers: usize, queue_capacity: usize, handler: F) -> ServerResult<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(ServerError::InvalidConfig("workers must be > 0"));
        }
        let queue = Arc::new(BoundedQueue::new(queue_capacity)?);
        let handler = Arc::new(handler);

        let mut pool = WorkerPool {
            queue,
            handles: Vec::with_capacity(workers),
        };
        for worker_id in 0..workers {
            let queue = Arc::clone(&pool.queue);
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("rwfs-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, &queue, &*handler));
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.stop_and_join();
                    return Err(ServerError::Spawn(e));
                }
            }
        }
        Ok(pool)
    }

    /// Queue `item` for a worker, blocking while the queue is full
    pub fn submit(&self, item: T) -> CoreResult<()> {
        self.queue.push(Task::Run(item))
    }

    /// Queue `item` without blocking; hands it back if the queue is full
    pub fn try_submit(&self, item: T) -> Result<(), T> {
        match self.queue.try_push(Task::Run(item)) {
            Err(Task::Run(item)) => Err(item),
            _ => Ok(()),
        }
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Stop every worker after the items already queued, and join them
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        for _ in 0..self.handles.len() {
            if let Err(e) = self.queue.push(Task::Stop) {
                error!(error = %e, "cannot queue worker stop");
                return;
            }
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked outside its handler");
            }
        }
    }
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .field("queue", &self.queue)
            .finish()
    }
}

fn worker_loop<T, F>(worker_id: usize, queue: &BoundedQueue<Task<T>>, handler: &F)
where
    F: Fn(T),
{
    debug!(worker = worker_id, "worker started");
    loop {
        match queue.pop() {
            Ok(Task::Run(item)) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(item))) {
                    error!(worker = worker_id, reason = panic_reason(&*payload), "handler panicked");
                }
            }
            Ok(Task::Stop) => break,
            Err(e) => {
                error!(worker = worker_id, error = %e, "work queue unusable");
                break;
            }
        }
    }
    debug!(worker = worker_id, "worker stopped");
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown"
    }
}
