//! Bounded connection pool of the relational engine.

use crate::error::{StoreError, StoreResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PoolInner {
    in_use: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

/// Counting semaphore over a fixed number of connections.
///
/// Every relational session holds one [`Lease`] for its whole lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Creates a pool with `capacity` connections.
    #[must_use]
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                in_use: Mutex::new(0),
                released: Condvar::new(),
                capacity: capacity.max(1),
            }),
            acquire_timeout,
        }
    }

    /// Takes a connection, waiting up to the acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns a transient conflict if no connection frees up in time.
    pub fn acquire(&self) -> StoreResult<Lease> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut in_use = self.inner.in_use.lock();
        while *in_use >= self.inner.capacity {
            if self
                .inner
                .released
                .wait_until(&mut in_use, deadline)
                .timed_out()
                && *in_use >= self.inner.capacity
            {
                return Err(StoreError::transient(format!(
                    "no connection available within {:?} ({} in use)",
                    self.acquire_timeout, self.inner.capacity
                )));
            }
        }
        *in_use += 1;
        Ok(Lease {
            pool: Arc::clone(&self.inner),
        })
    }

    /// Number of leased connections.
    #[must_use]
    pub fn in_use(&self) -> usize {
        *self.inner.in_use.lock()
    }

    /// Pool capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// A leased connection. Returned to the pool on drop.
#[derive(Debug)]
pub struct Lease {
    pool: Arc<PoolInner>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut in_use = self.pool.in_use.lock();
        *in_use = in_use.saturating_sub(1);
        self.pool.released.notify_one();
    }
}
