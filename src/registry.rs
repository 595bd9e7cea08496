//! Subscriber registry: an ordered set of `(packet_id, RxqRef)` pairs.
//!
//! Kept sorted by `(packet_id, RxqRef)` so insertion can reject duplicates
//! with a binary search rather than a linear scan. Delivery itself —
//! finding every subscriber for a given `packet_id` — is a linear scan
//! filtered by `packet_id`, matching the original's `LLIST_FOREACH` delivery
//! walk: once `unsubscribe` has removed entries, the remaining subscriptions
//! for a given `packet_id` are not necessarily contiguous, so a range query
//! would not be correct either way.

use alloc::vec::Vec;

use crate::error::{Error, Result};

/// A topic label subscribers filter by.
pub type PacketId = u32;

/// An opaque index into the bus's RX-queue table.
///
/// Never a raw pointer or borrowed reference — subscriptions only ever need
/// to name a queue, not alias it, so an index avoids both unsafe aliasing
/// and the pointer-cycle a self-referential handle would create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RxqRef(pub usize);

/// An ordered, capacity-bounded set of `(packet_id, RxqRef)` subscriptions.
pub struct SubscriberRegistry {
    entries: Vec<(PacketId, RxqRef)>,
    max_subs: usize,
}

impl SubscriberRegistry {
    /// Create a new, empty registry bounded to `max_subs` subscriptions.
    #[must_use]
    pub fn new(max_subs: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_subs,
        }
    }

    /// The number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `(pid, rxq)`, rejecting duplicates and capacity overflow.
    pub fn insert(&mut self, pid: PacketId, rxq: RxqRef) -> Result<()> {
        if self.entries.len() >= self.max_subs {
            return Err(Error::NoResources);
        }
        match self.entries.binary_search(&(pid, rxq)) {
            Ok(_) => Err(Error::Duplicate),
            Err(at) => {
                self.entries.insert(at, (pid, rxq));
                Ok(())
            }
        }
    }

    /// Remove `(pid, rxq)`. Fails with [`Error::NotFound`] if not present.
    pub fn remove(&mut self, pid: PacketId, rxq: RxqRef) -> Result<()> {
        match self.entries.binary_search(&(pid, rxq)) {
            Ok(at) => {
                self.entries.remove(at);
                Ok(())
            }
            Err(_) => Err(Error::NotFound),
        }
    }

    /// Whether `(pid, rxq)` is currently a subscription.
    #[must_use]
    pub fn query(&self, pid: PacketId, rxq: RxqRef) -> bool {
        self.entries.binary_search(&(pid, rxq)).is_ok()
    }

    /// Invoke `f` once for every `RxqRef` subscribed to `pid`, in ascending
    /// `RxqRef` order (a consequence of the registry's sort key, not a
    /// documented ordering guarantee of delivery itself).
    pub fn for_each(&self, pid: PacketId, mut f: impl FnMut(RxqRef)) {
        for &(entry_pid, rxq) in &self.entries {
            if entry_pid == pid {
                f(rxq);
            }
        }
    }
}
