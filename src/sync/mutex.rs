//! A blocking, non-recursive, FIFO-fair mutex.
//!
//! A classic ticket-lock: each waiter draws a ticket and spins (with
//! exponential backoff) until `now_serving` reaches its ticket. Using a
//! spin-based implementation rather than an OS futex means the same code
//! runs unmodified on bare-metal targets with no scheduler.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::backoff::Backoff;

/// A non-recursive mutex with FIFO fairness.
#[repr(C)]
pub struct Mutex<T: ?Sized> {
    next_ticket: AtomicUsize,
    now_serving: AtomicUsize,
    data: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    /// Create a new unlocked mutex wrapping `data`.
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicUsize::new(0),
            now_serving: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, blocking (via spin+backoff) until it is available.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut backoff = Backoff::new();
        while self.now_serving.load(Ordering::Acquire) != ticket {
            backoff.spin();
        }
        MutexGuard { mutex: self }
    }

    /// Try to acquire the lock without blocking. Fails if another holder is
    /// already in the critical section or other waiters are queued ahead.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let ticket = self.next_ticket.load(Ordering::Relaxed);
        let serving = self.now_serving.load(Ordering::Acquire);
        if ticket != serving {
            return None;
        }
        if self
            .next_ticket
            .compare_exchange(ticket, ticket + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Whether any holder currently has the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }

    /// Acquire the lock without producing a guard, matching the raw
    /// `lock`/`unlock` pair the original C `mutex` collaborator exposes.
    ///
    /// Intended for composite primitives (e.g. [`crate::sync::RdwrLock`])
    /// that need to hold a lock across a non-lexical boundary — acquired in
    /// one call, released in a later, unrelated call on a different thread.
    /// Prefer [`Mutex::lock`]'s RAII guard wherever the critical section is
    /// lexically scoped.
    #[inline]
    pub fn lock_raw(&self) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut backoff = Backoff::new();
        while self.now_serving.load(Ordering::Acquire) != ticket {
            backoff.spin();
        }
    }

    /// Release a lock previously acquired with [`Mutex::lock_raw`].
    ///
    /// # Safety
    ///
    /// The caller must have a matching prior `lock_raw` call with no
    /// intervening `unlock_raw`, and must not access `T` through this call
    /// (there is no guard to grant that access safely).
    #[inline]
    pub unsafe fn unlock_raw(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
    }

    /// Consume the mutex, returning the wrapped value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

/// RAII guard returned by [`Mutex::lock`]/[`Mutex::try_lock`].
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard is proof of exclusive access.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard is proof of exclusive access.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.now_serving.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn lock_unlock_round_trip() {
        let m = Mutex::new(0);
        *m.lock() += 1;
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Mutex::new(());
        let _g = m.lock();
        assert!(m.try_lock().is_none());
    }

    #[test]
    fn try_lock_succeeds_once_released() {
        let m = Mutex::new(5);
        {
            let _g = m.lock();
        }
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn is_locked_reflects_state() {
        let m = Mutex::new(());
        assert!(!m.is_locked());
        let g = m.lock();
        assert!(m.is_locked());
        drop(g);
        assert!(!m.is_locked());
    }

    #[test]
    fn raw_lock_unlock_round_trip() {
        let m = Mutex::new(());
        m.lock_raw();
        assert!(m.is_locked());
        unsafe { m.unlock_raw() };
        assert!(!m.is_locked());
    }

    #[test]
    fn serializes_sequential_critical_sections() {
        let m = Mutex::new(Vec::new());
        for i in 0..100 {
            m.lock().push(i);
        }
        assert_eq!(m.lock().len(), 100);
    }
}
