//! Bounded counting monitor shared by the guide pool and the capacity pool.
//!
//! A [`BoundedPool`] guards a single counter in `[0, capacity]` with a
//! `parking_lot::Mutex` and a `parking_lot::Condvar`:
//!
//! - `acquire` parks the caller until enough units are free, re-checking the
//!   predicate after every wakeup
//! - `release` returns units and wakes every parked caller, which then
//!   re-race for the counter
//! - `peek` reads a snapshot without blocking
//!
//! No ordering among waiters is promised.
//!
//! ```
//! use tunnel_admission::core::BoundedPool;
//!
//! let guides = BoundedPool::new("guides", 4);
//! assert_eq!(guides.acquire(1), Ok(3));
//! assert_eq!(guides.release(1), Ok(4));
//! assert!(guides.acquire(0).is_err());
//! ```

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::core::PoolError;

#[derive(Debug)]
struct PoolState {
    available: u32,
    closed: bool,
}

/// Counting monitor with blocking acquire and broadcasting release.
#[derive(Debug)]
pub struct BoundedPool {
    name: String,
    capacity: u32,
    state: Mutex<PoolState>,
    capacity_freed: Condvar,
}

impl BoundedPool {
    /// Create a pool with every unit available.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            state: Mutex::new(PoolState {
                available: capacity,
                closed: false,
            }),
            capacity_freed: Condvar::new(),
        }
    }

    /// Pool name used in log output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed upper bound of the counter.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Block until `units` are free, take them and return what is left.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidArgument` if `units <= 0` or `units > capacity`
    /// - `PoolError::Interrupted` if the pool is closed while waiting
    pub fn acquire(&self, units: i32) -> Result<u32, PoolError> {
        let mut state = self.state.lock();
        let wanted = match u32::try_from(units) {
            Ok(n) if n > 0 && n <= self.capacity => n,
            _ => return Err(self.invalid(units, state.available)),
        };

        // Wakeups are broadcast; another waiter may have taken the units first.
        while state.available < wanted {
            if state.closed {
                return Err(PoolError::Interrupted);
            }
            debug!(pool = %self.name, wanted, available = state.available, "waiting for capacity");
            self.capacity_freed.wait(&mut state);
        }
        if state.closed {
            return Err(PoolError::Interrupted);
        }

        state.available -= wanted;
        info!(
            pool = %self.name,
            acquired = wanted,
            available = state.available,
            "{wanted} units received, {} units available",
            state.available
        );
        Ok(state.available)
    }

    /// Return `units` to the pool, wake every waiter and return the new count.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidArgument` if `units <= 0` or the release would push
    /// the counter above capacity. The counter is left unchanged.
    pub fn release(&self, units: i32) -> Result<u32, PoolError> {
        let mut state = self.state.lock();
        let returned = match u32::try_from(units) {
            Ok(n) if n > 0 && n <= self.capacity - state.available => n,
            _ => return Err(self.invalid(units, state.available)),
        };

        state.available += returned;
        info!(
            pool = %self.name,
            released = returned,
            available = state.available,
            "{returned} units released, {} units available",
            state.available
        );
        let available = state.available;
        drop(state);
        self.capacity_freed.notify_all();
        Ok(available)
    }

    /// Snapshot of the free units; may be stale as soon as it returns.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.state.lock().available
    }

    /// Units currently held by completed, unreleased acquires.
    #[must_use]
    pub fn held(&self) -> u32 {
        self.capacity - self.peek()
    }

    /// Fail every current and future `acquire` with `Interrupted`.
    ///
    /// Releases are still accepted so holders can hand their units back.
    pub fn close(&self) {
        self.state.lock().closed = true;
        info!(pool = %self.name, "pool closed, waking blocked acquirers");
        self.capacity_freed.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn invalid(&self, units: i32, available: u32) -> PoolError {
        PoolError::InvalidArgument {
            units: i64::from(units),
            capacity: self.capacity,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_release_track_available() {
        let pool = BoundedPool::new("visitors", 50);
        assert_eq!(pool.acquire(7), Ok(43));
        assert_eq!(pool.peek(), 43);
        assert_eq!(pool.held(), 7);
        assert_eq!(pool.release(7), Ok(50));
        assert_eq!(pool.held(), 0);
    }

    #[test]
    fn test_rejects_non_positive_counts() {
        let pool = BoundedPool::new("guides", 4);
        assert!(matches!(pool.acquire(0), Err(PoolError::InvalidArgument { .. })));
        assert!(matches!(pool.acquire(-1), Err(PoolError::InvalidArgument { .. })));
        assert!(matches!(pool.release(0), Err(PoolError::InvalidArgument { .. })));
        assert!(matches!(pool.release(-1), Err(PoolError::InvalidArgument { .. })));
        assert_eq!(pool.peek(), 4);
    }

    #[test]
    fn test_rejects_acquire_above_capacity() {
        let pool = BoundedPool::new("guides", 4);
        assert!(matches!(pool.acquire(5), Err(PoolError::InvalidArgument { .. })));
        assert_eq!(pool.peek(), 4);
    }

    #[test]
    fn test_rejects_release_above_capacity() {
        let pool = BoundedPool::new("visitors", 50);
        assert!(matches!(pool.release(1), Err(PoolError::InvalidArgument { .. })));
        pool.acquire(10).unwrap();
        assert!(matches!(pool.release(11), Err(PoolError::InvalidArgument { .. })));
        assert_eq!(pool.peek(), 40);
        assert_eq!(pool.release(10), Ok(50));
    }

    #[test]
    fn test_close_interrupts_blocked_acquire() {
        let pool = Arc::new(BoundedPool::new("guides", 1));
        pool.acquire(1).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire(1))
        };
        thread::sleep(Duration::from_millis(50));
        pool.close();

        assert_eq!(waiter.join().unwrap(), Err(PoolError::Interrupted));
        assert!(pool.is_closed());
        assert_eq!(pool.release(1), Ok(1));
        assert_eq!(pool.acquire(1), Err(PoolError::Interrupted));
    }
}
