//! Counting semaphore.
//!
//! Classic POSIX counting-semaphore semantics (`wait`/`try_wait`/
//! `timed_wait`/`post`), implemented with an atomic counter and spin+backoff
//! rather than an OS primitive, in keeping with this crate's bare-metal
//! support. [`pcqueue`](crate::pcqueue) composes two of these (`slots_avail`,
//! `slots_inuse`) with a [`Mutex`](crate::sync::Mutex) and a
//! [`Fifo`](crate::fifo::Fifo), mirroring the original library's
//! `pcqueue.c` composition.

use core::sync::atomic::{AtomicIsize, Ordering};

use crate::backoff::Backoff;
use crate::clock::{Clock, Instant};
use crate::error::{Error, Result};

/// A counting semaphore.
pub struct CountingSemaphore {
    count: AtomicIsize,
}

impl CountingSemaphore {
    /// Create a semaphore with the given initial count.
    #[inline]
    pub const fn new(initial: usize) -> Self {
        Self {
            count: AtomicIsize::new(initial as isize),
        }
    }

    /// Block until a unit is available, then consume it.
    pub fn wait(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self.try_wait() {
                return;
            }
            backoff.spin();
        }
    }

    /// Consume a unit if one is immediately available.
    #[must_use]
    pub fn try_wait(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Block until a unit is available or `deadline` passes, whichever comes
    /// first. `clock` supplies the notion of "now" — this type never reads
    /// wall-clock time on its own.
    pub fn timed_wait<C: Clock>(&self, deadline: Instant, clock: &C) -> Result<()> {
        let mut backoff = Backoff::new();
        loop {
            if self.try_wait() {
                return Ok(());
            }
            if clock.now() >= deadline {
                return Err(Error::Timeout);
            }
            backoff.spin();
        }
    }

    /// Release a unit, waking one waiter (conceptually; waiters here simply
    /// re-poll via `try_wait`).
    pub fn post(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    /// The current count. Racy the instant it's read under contention; for
    /// diagnostics only.
    #[must_use]
    pub fn count(&self) -> isize {
        self.count.load(Ordering::Relaxed)
    }
}
