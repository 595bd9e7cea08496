//! Producer-consumer queue: a [`Fifo`] guarded by a [`Mutex`] plus two
//! [`CountingSemaphore`]s tracking available and in-use slots.
//!
//! Directly mirrors the original library's composition of `fifo` + `mutex` +
//! two `csem`s: `slots_avail` starts at the queue's capacity and is waited
//! on by producers before they touch the FIFO; `slots_inuse` starts at zero
//! and is waited on by consumers. The FIFO itself is never touched without
//! holding `mutex`, so it is safe for arbitrarily many concurrent producers
//! and consumers, though ordering beyond per-call atomicity is only
//! guaranteed with exactly one of each.

use crate::clock::{Clock, Instant};
use crate::error::Result;
use crate::fifo::Fifo;
use crate::sync::{CountingSemaphore, Mutex};

/// A bounded, bipartite-semaphore-guarded queue of `T`.
pub struct PcQueue<T> {
    fifo: Mutex<Fifo<T>>,
    slots_avail: CountingSemaphore,
    slots_inuse: CountingSemaphore,
    capacity: usize,
}

impl<T> PcQueue<T> {
    /// Create a new, empty queue with room for `capacity` elements.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            fifo: Mutex::new(Fifo::new(capacity)?),
            slots_avail: CountingSemaphore::new(capacity),
            slots_inuse: CountingSemaphore::new(0),
            capacity,
        })
    }

    /// The queue's fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of elements currently queued. Racy the instant it is
    /// read under contention; for diagnostics only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fifo.lock().len()
    }

    /// Whether the queue holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Push `e`, blocking until a slot is available.
    pub fn push(&self, e: T) -> Result<()> {
        self.slots_avail.wait();
        let result = {
            let mut fifo = self.fifo.lock();
            fifo.add(e)
        };
        if result.is_ok() {
            self.slots_inuse.post();
        } else {
            self.slots_avail.post();
        }
        result
    }

    /// Push `e` if a slot is immediately available; otherwise fail with
    /// [`crate::error::Error::NoSpace`] rather than blocking.
    ///
    /// Used by delivery paths (e.g. a publish walk over many subscriber
    /// queues) that must not suspend on one full queue while still trying to
    /// reach the rest.
    pub fn try_push(&self, e: T) -> Result<()> {
        if !self.slots_avail.try_wait() {
            return Err(crate::error::Error::NoSpace);
        }
        let result = {
            let mut fifo = self.fifo.lock();
            fifo.add(e)
        };
        if result.is_ok() {
            self.slots_inuse.post();
        } else {
            self.slots_avail.post();
        }
        result
    }

    /// Pop the front element, blocking until one is available.
    pub fn pop(&self) -> Result<T> {
        self.slots_inuse.wait();
        let result = {
            let mut fifo = self.fifo.lock();
            fifo.remove()
        };
        if result.is_ok() {
            self.slots_avail.post();
        } else {
            self.slots_inuse.post();
        }
        result
    }

    /// Pop the front element, blocking until one is available or `deadline`
    /// passes.
    pub fn timed_pop<C: Clock>(&self, deadline: Instant, clock: &C) -> Result<T> {
        self.slots_inuse.timed_wait(deadline, clock)?;
        let result = {
            let mut fifo = self.fifo.lock();
            fifo.remove()
        };
        if result.is_ok() {
            self.slots_avail.post();
        } else {
            self.slots_inuse.post();
        }
        result
    }

    /// Run `f` against the front element without removing it, blocking until
    /// one is available. Does not change either semaphore's count of
    /// available slots beyond the wait/post pair used to observe the front.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.slots_inuse.wait();
        let fifo = self.fifo.lock();
        let result = fifo.front().map(f);
        drop(fifo);
        self.slots_inuse.post();
        result.ok_or(crate::error::Error::NotFound)
    }

    /// As [`PcQueue::peek`], but blocking only until `deadline`.
    pub fn timed_peek<C: Clock, R>(
        &self,
        deadline: Instant,
        clock: &C,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        self.slots_inuse.timed_wait(deadline, clock)?;
        let fifo = self.fifo.lock();
        let result = fifo.front().map(f);
        drop(fifo);
        self.slots_inuse.post();
        result.ok_or(crate::error::Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::time::Duration;

    struct FakeClock(Cell<u64>);
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            Instant::from_nanos(self.0.get())
        }
    }

    #[test]
    fn push_pop_preserves_order() {
        let q = PcQueue::new(4).unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.pop().unwrap(), 1);
        assert_eq!(q.pop().unwrap(), 2);
    }

    #[test]
    fn len_is_full_and_is_empty_track_occupancy() {
        let q = PcQueue::new(2).unwrap();
        assert!(q.is_empty());
        q.push(1).unwrap();
        assert_eq!(q.len(), 1);
        q.push(2).unwrap();
        assert!(q.is_full());
    }

    #[test]
    fn try_push_fails_without_blocking_once_full() {
        let q = PcQueue::new(1).unwrap();
        q.try_push(1).unwrap();
        assert_eq!(
            q.try_push(2).unwrap_err(),
            crate::error::Error::NoSpace
        );
        assert_eq!(q.pop().unwrap(), 1);
    }

    #[test]
    fn timed_pop_times_out_on_empty_queue() {
        let q: PcQueue<u8> = PcQueue::new(2).unwrap();
        let clock = FakeClock(Cell::new(0));
        let deadline = Instant::from_nanos(0);
        assert_eq!(
            q.timed_pop(deadline, &clock).unwrap_err(),
            crate::error::Error::Timeout
        );
    }

    #[test]
    fn timed_pop_succeeds_when_an_element_is_already_queued() {
        let q = PcQueue::new(2).unwrap();
        q.push(7).unwrap();
        let clock = FakeClock(Cell::new(0));
        let deadline = clock.deadline(Duration::from_secs(1));
        assert_eq!(q.timed_pop(deadline, &clock).unwrap(), 7);
    }

    #[test]
    fn peek_does_not_remove_the_element() {
        let q = PcQueue::new(2).unwrap();
        q.push(5).unwrap();
        let seen = q.peek(|v| *v).unwrap();
        assert_eq!(seen, 5);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap(), 5);
    }

    #[test]
    fn push_past_capacity_blocks_rather_than_errors_fifo_full() {
        // slots_avail gates pushes at the queue's capacity, so a well-behaved
        // caller never observes `Fifo::add`'s `NoSpace` through `push`.
        let q = PcQueue::new(1).unwrap();
        q.push(1).unwrap();
        assert!(q.is_full());
    }
}
