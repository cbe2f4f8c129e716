//! Resource path -> `ResourceLock` registry
//!
//! One registry is created at startup and handed to every worker. It owns
//! every lock it creates; handlers get an `Arc` clone for the duration of a
//! request. Locks are never removed while the server runs, so a path always
//! maps to the same lock.
//!
//! The registry mutex only covers the lookup and the optional insert. It is
//! released before the caller blocks on the returned lock or touches the
//! filesystem.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::chained_map::ChainedMap;
use crate::constants::DEFAULT_READER_BATCH;
use crate::error::{CoreError, CoreResult};
use crate::rwlock::ResourceLock;

/// Process-wide table of per-resource locks
pub struct LockRegistry {
    map: Mutex<ChainedMap<Arc<ResourceLock>>>,
    reader_batch: usize,
}

impl LockRegistry {
    /// Registry with `buckets` chains whose locks admit `reader_batch`
    /// readers while a writer waits
    pub fn new(buckets: usize, reader_batch: usize) -> CoreResult<Self> {
        if reader_batch == 0 {
            return Err(CoreError::InvalidReaderBatch);
        }
        Ok(Self {
            map: Mutex::new(ChainedMap::with_buckets(buckets)?),
            reader_batch,
        })
    }

    /// Return the lock for `path`, creating it on first reference
    ///
    /// Concurrent callers for the same unseen path all receive the same lock.
    pub fn acquire_or_create(&self, path: &str) -> CoreResult<Arc<ResourceLock>> {
        let mut map = self.map.lock().map_err(|_| CoreError::Poisoned("registry"))?;
        if let Some(lock) = map.get(path) {
            return Ok(Arc::clone(lock));
        }

        let lock = Arc::new(ResourceLock::new(self.reader_batch)?);
        map.put(path, Arc::clone(&lock))?;
        debug!(path, locks = map.len(), "created resource lock");
        Ok(lock)
    }

    /// Number of resources seen so far
    pub fn len(&self) -> usize {
        self.map.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reader_batch(&self) -> usize {
        self.reader_batch
    }

    /// Release every lock and the table itself
    ///
    /// Only meaningful once workers have stopped issuing requests. Handlers
    /// still holding an `Arc` keep their lock alive until they drop it.
    /// Returns the number of locks released.
    pub fn shutdown(self) -> usize {
        let mut map = match self.map.into_inner() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let released = map.destroy_with(|path, lock| {
            if Arc::strong_count(&lock) > 1 {
                debug!(path = &*path, "lock still referenced at shutdown");
            }
        });
        debug!(released, "lock registry torn down");
        released
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self {
            map: Mutex::new(ChainedMap::new()),
            reader_batch: DEFAULT_READER_BATCH,
        }
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("locks", &self.len())
            .field("reader_batch", &self.reader_batch)
            .finish()
    }
}
