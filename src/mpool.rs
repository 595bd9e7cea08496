//! Fixed-element memory pool with per-element reference counts.
//!
//! The innermost layer of the bus: a contiguous byte-array storage of `N`
//! fixed-size elements, a free-list and an (implicit) allocated set, and a
//! per-element reference count, all guarded by one internal
//! [`Mutex`](crate::sync::Mutex). [`MemoryPool::request`] hands out an RAII
//! [`Reservation`] rather than a bare index, so an abandoned reservation
//! (one `publish_release` never consumes) still returns its element to the
//! free list via `Drop`.
//!
//! `request` establishes the reservation's own reference (refcount starts at
//! 1, not 0): the reservation itself counts as one holder of the element
//! until it is either dropped (abandonment — the one reference it holds is
//! released) or consumed by `publish_release`, which adds one further
//! reference per successful subscriber delivery and then issues one final
//! unconditional `release` to retire the reservation's own reference. Net
//! effect for `k` deliveries: the element's refcount settles at `k`, and it
//! is freed immediately iff `k == 0`.
//!
//! Unlike the rest of this crate's collaborators, this module has no C
//! counterpart in the retrieved original sources (the upstream library's
//! pool implementation was not part of the retrieval) — its design is
//! derived directly from the calling pattern the software bus needs
//! (`request`, `add_ref`, `release`, `ref_count`, `is_full`) and from this
//! crate's own allocator-facade and mutex collaborators.

use core::cell::UnsafeCell;
use core::mem::ManuallyDrop;

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::sync::Mutex;

struct PoolState {
    /// Indices not currently checked out, most-recently-freed last.
    free: Vec<usize>,
    /// `true` while element `i` is checked out (requested but not yet fully
    /// released).
    in_use: Vec<bool>,
    /// Per-element reference count. Only meaningful while `in_use[i]`.
    refcounts: Vec<usize>,
}

/// A fixed-element-size, reference-counted memory pool.
pub struct MemoryPool {
    storage: UnsafeCell<Vec<u8>>,
    element_size: usize,
    capacity: usize,
    state: Mutex<PoolState>,
}

// SAFETY: `storage` is only ever sliced per-element, and the free-list
// protocol in `state` guarantees at most one `Reservation` exists for any
// given index at a time, so concurrent access to the same byte range never
// occurs.
unsafe impl Sync for MemoryPool {}
unsafe impl Send for MemoryPool {}

impl MemoryPool {
    /// Create a new pool of `capacity` elements, each `element_size` bytes.
    ///
    /// Fails with [`Error::InvalidArgument`] if either is zero.
    pub fn new(capacity: usize, element_size: usize) -> Result<Self> {
        if capacity == 0 || element_size == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            storage: UnsafeCell::new(vec![0u8; capacity * element_size]),
            element_size,
            capacity,
            state: Mutex::new(PoolState {
                free: (0..capacity).rev().collect(),
                in_use: vec![false; capacity],
                refcounts: vec![0; capacity],
            }),
        })
    }

    /// The size in bytes of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// The total number of elements this pool manages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether every element is currently checked out.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.state.lock().free.is_empty()
    }

    /// The current reference count of element `index`. Returns `0` for an
    /// out-of-range or currently-free index rather than erroring, since this
    /// is a diagnostic query, not a mutation.
    #[must_use]
    pub fn ref_count(&self, index: usize) -> usize {
        let state = self.state.lock();
        if index >= self.capacity || !state.in_use[index] {
            return 0;
        }
        state.refcounts[index]
    }

    /// Check out one element, returning an RAII [`Reservation`] that holds
    /// the element's first reference (refcount starts at one, not zero).
    /// Returns `None` if the pool is full.
    pub fn request(&self) -> Option<Reservation<'_>> {
        let mut state = self.state.lock();
        let index = state.free.pop()?;
        state.in_use[index] = true;
        state.refcounts[index] = 1;
        drop(state);
        Some(Reservation { pool: self, index })
    }

    /// Increment element `index`'s reference count.
    ///
    /// Fails with [`Error::InvalidArgument`] if `index` is out of range or
    /// not currently checked out.
    pub fn add_ref(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        self.checked_in_use(&state, index)?;
        state.refcounts[index] += 1;
        Ok(())
    }

    /// Decrement element `index`'s reference count; once it reaches zero the
    /// element returns to the free list. Since `request` leaves a freshly
    /// checked-out element at refcount one, a single `release` with no
    /// intervening `add_ref` is the abandonment path: it frees the element
    /// immediately.
    ///
    /// Fails with [`Error::InvalidArgument`] if `index` is out of range or
    /// not currently checked out.
    pub fn release(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        self.checked_in_use(&state, index)?;
        state.refcounts[index] -= 1;
        if state.refcounts[index] == 0 {
            self.free_locked(&mut state, index);
        }
        Ok(())
    }

    fn checked_in_use(&self, state: &PoolState, index: usize) -> Result<()> {
        if index >= self.capacity || !state.in_use[index] {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    fn free_locked(&self, state: &mut PoolState, index: usize) {
        state.in_use[index] = false;
        state.refcounts[index] = 0;
        state.free.push(index);
    }

    /// Raw byte access to element `index`. Callers must only invoke this for
    /// an index they currently hold a [`Reservation`] for, or a descriptor
    /// index known to be checked out.
    fn element_slice(&self, index: usize) -> &[u8] {
        let start = index * self.element_size;
        // SAFETY: `index < capacity` is checked by every caller before
        // reaching here, and only one `Reservation` exists per index at a
        // time, so this shared slice does not alias a concurrent `&mut`.
        unsafe { &(*self.storage.get())[start..start + self.element_size] }
    }

    #[allow(clippy::mut_from_ref)]
    fn element_slice_mut(&self, index: usize) -> &mut [u8] {
        let start = index * self.element_size;
        // SAFETY: see `element_slice`; the caller holding the sole
        // `Reservation` for `index` is the only writer.
        unsafe { &mut (*self.storage.get())[start..start + self.element_size] }
    }
}

/// An RAII handle to a checked-out pool element.
///
/// Dropping a `Reservation` that was never consumed by
/// [`crate::bus::SoftwareBus::publish_release`] (or another explicit
/// consumer) performs the abandonment release, returning the element to its
/// pool's free list.
pub struct Reservation<'pool> {
    pool: &'pool MemoryPool,
    index: usize,
}

impl<'pool> Reservation<'pool> {
    /// The element's index within its owning pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The reserved element's bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.pool.element_slice(self.index)
    }

    /// The reserved element's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.pool.element_slice_mut(self.index)
    }

    /// Consume this reservation, handing its index to the caller without
    /// running the abandonment-release `Drop` logic.
    ///
    /// Used by `publish_release` once delivery has added the subscriber
    /// reference(s) that will eventually be released through the RX queues
    /// instead of through this handle.
    pub fn into_raw_index(self) -> usize {
        let this = ManuallyDrop::new(self);
        this.index
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // The element was checked out by `request` and never handed off via
        // `into_raw_index`; releasing its sole reference frees it (the
        // abandonment path).
        let _ = self.pool.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_capacity_or_element_size() {
        assert_eq!(MemoryPool::new(0, 4).unwrap_err(), Error::InvalidArgument);
        assert_eq!(MemoryPool::new(4, 0).unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn request_until_full_then_refused() {
        let pool = MemoryPool::new(2, 8).unwrap();
        let a = pool.request();
        let b = pool.request();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(pool.is_full());
        assert!(pool.request().is_none());
    }

    #[test]
    fn dropping_an_unconsumed_reservation_frees_its_element() {
        let pool = MemoryPool::new(1, 8).unwrap();
        {
            let _r = pool.request().expect("pool should have room");
        }
        assert!(!pool.is_full());
        assert!(pool.request().is_some());
    }

    #[test]
    fn add_ref_then_release_twice_frees_on_second_release() {
        let pool = MemoryPool::new(1, 8).unwrap();
        let r = pool.request().unwrap();
        let index = r.into_raw_index();
        pool.add_ref(index).unwrap();
        assert_eq!(pool.ref_count(index), 2);
        pool.release(index).unwrap();
        assert!(pool.is_full());
        pool.release(index).unwrap();
        assert!(!pool.is_full());
    }

    #[test]
    fn release_with_no_add_ref_is_the_abandonment_path() {
        let pool = MemoryPool::new(1, 8).unwrap();
        let r = pool.request().unwrap();
        let index = r.into_raw_index();
        assert_eq!(pool.ref_count(index), 1);
        pool.release(index).unwrap();
        assert!(!pool.is_full());
    }

    #[test]
    fn add_ref_or_release_on_invalid_index_errors() {
        let pool = MemoryPool::new(1, 8).unwrap();
        assert_eq!(pool.add_ref(5).unwrap_err(), Error::InvalidArgument);
        assert_eq!(pool.release(5).unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn add_ref_or_release_on_free_index_errors() {
        let pool = MemoryPool::new(1, 8).unwrap();
        assert_eq!(pool.add_ref(0).unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn reservation_bytes_are_writable_and_readable() {
        let pool = MemoryPool::new(1, 4).unwrap();
        let mut r = pool.request().unwrap();
        r.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(r.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn element_size_and_capacity_are_reported() {
        let pool = MemoryPool::new(3, 16).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.element_size(), 16);
    }
}
