//! The software bus: a zero-copy, reference-counted, many-to-many
//! publish/subscribe fabric.
//!
//! A publisher reserves a buffer from the smallest-fitting pool, writes its
//! payload, and releases it; release walks the subscriber registry,
//! enqueuing a packet descriptor onto each matching RX queue and recording a
//! pool reference per successful enqueue. Subscribers peek, process, and pop
//! their copy; popping releases the pool reference and returns the buffer
//! once the last reference is gone. In synchronous mode, release takes a
//! writer lock that subscriber `rxq_wait` calls bracket with a reader lock,
//! so a publisher only returns once every subscriber currently inside a
//! receive window has completed it.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::warn;

use crate::clock::{Clock, Instant};
use crate::error::{Error, Result};
use crate::mpool::MemoryPool;
use crate::pcqueue::PcQueue;
use crate::registry::{PacketId, RxqRef, SubscriberRegistry};
use crate::sync::{Mutex, RdwrLock, Scope};

const MAX_NAME_LEN: usize = 64;

/// Flags controlling a bus instance's behavior for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusFlags(u8);

impl BusFlags {
    /// Zero every allocation before returning it.
    pub const ZALLOC: BusFlags = BusFlags(0x1);
    /// Disable the synchronous delivery barrier.
    pub const ASYNC: BusFlags = BusFlags(0x2);
    /// No flags set.
    pub const NONE: BusFlags = BusFlags(0);

    /// Whether `self` contains every bit set in `other`.
    #[must_use]
    pub const fn contains(self, other: BusFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for BusFlags {
    type Output = BusFlags;
    fn bitor(self, rhs: BusFlags) -> BusFlags {
        BusFlags(self.0 | rhs.0)
    }
}

/// One pool's configuration within a bus's pool table.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Size in bytes of one element in this pool.
    pub element_size: usize,
    /// Number of elements this pool manages.
    pub max_elements: usize,
}

/// Construction parameters for [`SoftwareBus::init`].
pub struct BusParams {
    /// A human-readable bus name, bounded to 64 bytes.
    pub name: String,
    /// Maximum number of concurrently active RX queues.
    pub max_rxqs: usize,
    /// Maximum number of active subscriptions.
    pub max_subs: usize,
    /// Pool table, in increasing `element_size` order.
    pub pools: Vec<PoolConfig>,
    /// Behavior flags.
    pub flags: BusFlags,
}

/// A buffer reserved from one of a bus's pools, returned by
/// [`SoftwareBus::publish_reserve`] and consumed by
/// [`SoftwareBus::publish_release`].
///
/// Wraps a plain [`crate::mpool::Reservation`] together with the index of
/// the pool it came from, since a bare `Reservation` only knows its element
/// index within its own pool, not which slot that pool occupies in the
/// bus's pool table.
pub struct BusReservation<'bus> {
    pool: usize,
    reservation: crate::mpool::Reservation<'bus>,
}

impl BusReservation<'_> {
    /// The reserved buffer's bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.reservation.as_slice()
    }

    /// The reserved buffer's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.reservation.as_mut_slice()
    }
}

/// A packet descriptor: a reference to a buffer living in one of the bus's
/// pools, enqueued by value onto subscriber RX queues.
#[derive(Debug, Clone, Copy)]
pub struct PacketDescriptor {
    /// Index of the owning pool within the bus's pool table.
    pub pool: usize,
    /// Index of the element within its owning pool.
    pub element: usize,
    /// The payload size in bytes (may be less than the pool's element size).
    pub size: usize,
    /// The packet id this descriptor was published under.
    pub packet_id: PacketId,
}

struct BusState {
    /// `Arc`-wrapped so callers can clone a queue handle out from under the
    /// bus mutex before blocking on it — mirroring the original, where
    /// `rxq_wait` and friends take no bus-level lock at all and operate
    /// directly on the subscriber's own queue pointer.
    rxqs: Vec<Arc<PcQueue<PacketDescriptor>>>,
    registry: SubscriberRegistry,
    /// Failed deliveries attempted during `publish_release`, cumulative.
    delivery_failures: u64,
}

/// A zero-copy, reference-counted publish/subscribe bus.
pub struct SoftwareBus {
    name: String,
    flags: BusFlags,
    pools: Vec<MemoryPool>,
    max_rxqs: usize,
    state: Mutex<BusState>,
    barrier: RdwrLock<()>,
}

impl SoftwareBus {
    /// Initialize a new bus.
    ///
    /// Fails with [`Error::InvalidArgument`] if `name` exceeds the length
    /// limit, the pool table is empty, or the pool table is not sorted by
    /// strictly increasing `element_size` (callers rely on first-fit scan
    /// order in [`SoftwareBus::publish_reserve`], so a misordered table is a
    /// configuration bug caught here rather than silently degrading fit
    /// quality later).
    pub fn init(params: BusParams) -> Result<Self> {
        if params.name.len() > MAX_NAME_LEN || params.pools.is_empty() {
            return Err(Error::InvalidArgument);
        }
        for window in params.pools.windows(2) {
            if window[1].element_size <= window[0].element_size {
                return Err(Error::InvalidArgument);
            }
        }

        let mut pools = Vec::with_capacity(params.pools.len());
        for cfg in &params.pools {
            pools.push(MemoryPool::new(cfg.max_elements, cfg.element_size)?);
        }

        Ok(Self {
            name: params.name,
            flags: params.flags,
            pools,
            max_rxqs: params.max_rxqs,
            state: Mutex::new(BusState {
                rxqs: Vec::new(),
                registry: SubscriberRegistry::new(params.max_subs),
                delivery_failures: 0,
            }),
            barrier: RdwrLock::new(()),
        })
    }

    /// This bus's configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_sync(&self) -> bool {
        !self.flags.contains(BusFlags::ASYNC)
    }

    /// Allocate a new RX queue of capacity `n_entries`.
    ///
    /// Fails with [`Error::NoResources`] once `max_rxqs` is reached.
    pub fn rxq_init(&self, n_entries: usize) -> Result<RxqRef> {
        let mut state = self.state.lock();
        if state.rxqs.len() >= self.max_rxqs {
            return Err(Error::NoResources);
        }
        let queue = Arc::new(PcQueue::new(n_entries)?);
        state.rxqs.push(queue);
        Ok(RxqRef(state.rxqs.len() - 1))
    }

    /// Subscribe `queue` to `pid`.
    pub fn subscribe(&self, queue: RxqRef, pid: PacketId) -> Result<()> {
        let mut state = self.state.lock();
        state.registry.insert(pid, queue)
    }

    /// Unsubscribe `queue` from `pid`.
    pub fn unsubscribe(&self, queue: RxqRef, pid: PacketId) -> Result<()> {
        let mut state = self.state.lock();
        state.registry.remove(pid, queue)
    }

    /// Reserve a buffer of at least `size` bytes from the first pool (in
    /// definition order) that fits and is not full.
    ///
    /// Fails with [`Error::InvalidArgument`] if `size` is zero.
    ///
    /// Not guarded by the bus mutex; each pool serializes its own mutations
    /// internally, so reservations proceed concurrently with unrelated bus
    /// state changes.
    pub fn publish_reserve(&self, size: usize) -> Result<BusReservation<'_>> {
        if size == 0 {
            return Err(Error::InvalidArgument);
        }
        for (pool_idx, pool) in self.pools.iter().enumerate() {
            if pool.element_size() >= size && !pool.is_full() {
                if let Some(reservation) = pool.request() {
                    return Ok(BusReservation {
                        pool: pool_idx,
                        reservation,
                    });
                }
            }
        }
        Err(Error::NoSpace)
    }

    /// Publish `reservation` under `pid`, delivering it to every current
    /// subscriber of `pid`.
    ///
    /// Returns `Err(Error::Error)` if at least one, but not all, subscriber
    /// deliveries failed; `Ok(())` otherwise (including when there were no
    /// subscribers at all).
    pub fn publish_release(
        &self,
        pid: PacketId,
        reservation: BusReservation<'_>,
        size: usize,
    ) -> Result<()> {
        let pool_idx = reservation.pool;
        let element = reservation.reservation.index();
        let pool = &self.pools[pool_idx];

        if self.is_sync() {
            self.barrier.req(Scope::Write);
        }

        let mut failures = 0u64;
        {
            let descriptor = PacketDescriptor {
                pool: pool_idx,
                element,
                size,
                packet_id: pid,
            };

            let state = self.state.lock();
            let mut subscribers = Vec::new();
            state.registry.for_each(pid, |rxq| subscribers.push(rxq));
            let matching: Vec<_> = subscribers
                .into_iter()
                .map(|rxq| (rxq, state.rxqs.get(rxq.0).cloned()))
                .collect();
            drop(state);

            for (rxq, queue) in matching {
                match queue {
                    Some(queue) => match queue.try_push(descriptor) {
                        Ok(()) => {
                            if let Err(e) = pool.add_ref(element) {
                                warn!("bus {}: add_ref failed for delivered descriptor: {e}", self.name);
                                failures += 1;
                            }
                        }
                        Err(e) => {
                            warn!("bus {}: delivery to rxq {} failed: {e}", self.name, rxq.0);
                            failures += 1;
                        }
                    },
                    None => {
                        warn!("bus {}: subscriber referenced missing rxq {}", self.name, rxq.0);
                        failures += 1;
                    }
                }
            }
        }

        if self.is_sync() {
            self.barrier.exit(Scope::Write);
        }

        // The reservation holds the element's own first reference (see
        // `mpool::MemoryPool::request`); each successful delivery adds one
        // more on top of that, and this final release retires the
        // reservation's own reference. Net effect for `k` deliveries: the
        // refcount settles at `k`, freeing the buffer immediately iff `k == 0`.
        reservation.reservation.into_raw_index();
        let _ = pool.release(element);

        if failures > 0 {
            let mut state = self.state.lock();
            state.delivery_failures += failures;
            return Err(Error::Error);
        }
        Ok(())
    }

    /// The cumulative count of failed subscriber deliveries across every
    /// `publish_release` call on this bus.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.state.lock().delivery_failures
    }

    /// Reserve a buffer, copy `data` into it, and release it under `pid`.
    pub fn publish(&self, pid: PacketId, data: &[u8]) -> Result<()> {
        let mut reservation = self.publish_reserve(data.len())?;
        reservation.as_mut_slice()[..data.len()].copy_from_slice(data);
        self.publish_release(pid, reservation, data.len())
    }

    /// Block until `queue` has a descriptor available, returning a copy of
    /// its front descriptor without removing it.
    ///
    /// In synchronous mode, brackets the peek with a reader-lock
    /// acquire/release so a concurrent `publish_release` can observe that
    /// this receive window has completed.
    pub fn rxq_wait(&self, queue: RxqRef) -> Result<PacketDescriptor> {
        let q = self.rxq_handle(queue)?;
        let result = q.peek(|d| *d);

        if self.is_sync() {
            self.barrier.req(Scope::Read);
        }
        let descriptor = result;
        if self.is_sync() {
            self.barrier.exit(Scope::Read);
        }
        descriptor
    }

    /// As [`SoftwareBus::rxq_wait`], but blocking only until `deadline`.
    pub fn rxq_timed_wait<C: Clock>(
        &self,
        queue: RxqRef,
        deadline: Instant,
        clock: &C,
    ) -> Result<PacketDescriptor> {
        let q = self.rxq_handle(queue)?;
        let result = q.timed_peek(deadline, clock, |d| *d);

        if self.is_sync() {
            self.barrier.req(Scope::Read);
        }
        let descriptor = result;
        if self.is_sync() {
            self.barrier.exit(Scope::Read);
        }
        descriptor
    }

    /// A non-blocking version of [`SoftwareBus::rxq_wait`]'s peek, returning
    /// immediately with `Err(Error::NotFound)` if the queue is empty.
    ///
    /// Unlike `rxq_wait`, never blocks and never takes the delivery
    /// barrier — intended for polling contexts that cannot suspend.
    pub fn rxq_front(&self, queue: RxqRef) -> Result<PacketDescriptor> {
        let q = self.rxq_handle(queue)?;
        if q.is_empty() {
            return Err(Error::NotFound);
        }
        q.peek(|d| *d)
    }

    /// Release the pool reference for `queue`'s front descriptor and pop it.
    pub fn rxq_pop_front(&self, queue: RxqRef) -> Result<()> {
        let q = self.rxq_handle(queue)?;
        let descriptor = q.peek(|d| *d)?;

        if let Some(pool) = self.pools.get(descriptor.pool) {
            if let Err(e) = pool.release(descriptor.element) {
                warn!("bus {}: release of popped descriptor failed: {e}", self.name);
            }
        }

        q.pop()?;
        Ok(())
    }

    /// Clone out an `Arc` handle to `queue`'s `PcQueue`, releasing the bus
    /// mutex immediately rather than holding it for whatever blocking
    /// operation the caller performs next.
    fn rxq_handle(&self, queue: RxqRef) -> Result<Arc<PcQueue<PacketDescriptor>>> {
        self.state
            .lock()
            .rxqs
            .get(queue.0)
            .cloned()
            .ok_or(Error::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_pool_bus(element_size: usize, capacity: usize, max_rxqs: usize, max_subs: usize) -> SoftwareBus {
        SoftwareBus::init(BusParams {
            name: String::from("test-bus"),
            max_rxqs,
            max_subs,
            pools: alloc::vec![PoolConfig {
                element_size,
                max_elements: capacity,
            }],
            flags: BusFlags::NONE,
        })
        .unwrap()
    }

    #[test]
    fn init_rejects_misordered_pool_table() {
        let result = SoftwareBus::init(BusParams {
            name: String::from("bad"),
            max_rxqs: 2,
            max_subs: 2,
            pools: alloc::vec![
                PoolConfig { element_size: 16, max_elements: 2 },
                PoolConfig { element_size: 8, max_elements: 2 },
            ],
            flags: BusFlags::NONE,
        });
        assert_eq!(result.unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn init_rejects_empty_pool_table() {
        let result = SoftwareBus::init(BusParams {
            name: String::from("empty"),
            max_rxqs: 1,
            max_subs: 1,
            pools: Vec::new(),
            flags: BusFlags::NONE,
        });
        assert_eq!(result.unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn publish_with_no_subscribers_recycles_the_buffer() {
        let bus = one_pool_bus(16, 4, 2, 2);
        bus.publish(7, &[1, 2, 3, 4]).unwrap();
        assert!(!bus.pools[0].is_full());
        assert_eq!(bus.pools[0].ref_count(0), 0);
    }

    #[test]
    fn single_publisher_single_subscriber_round_trip() {
        let bus = one_pool_bus(16, 4, 2, 2);
        let q = bus.rxq_init(4).unwrap();
        bus.subscribe(q, 7).unwrap();

        for _ in 0..3 {
            bus.publish(7, &[1, 2, 3, 4]).unwrap();
        }

        assert_eq!(bus.pools[0].capacity() - free_count(&bus), 3);
        for _ in 0..3 {
            bus.rxq_pop_front(q).unwrap();
        }
        assert_eq!(bus.pools[0].capacity() - free_count(&bus), 0);
    }

    #[test]
    fn two_subscribers_see_refcount_converge_to_zero() {
        let bus = one_pool_bus(16, 4, 2, 2);
        let q1 = bus.rxq_init(4).unwrap();
        let q2 = bus.rxq_init(4).unwrap();
        bus.subscribe(q1, 9).unwrap();
        bus.subscribe(q2, 9).unwrap();

        bus.publish(9, &[0u8; 8]).unwrap();
        assert_eq!(bus.pools[0].ref_count(0), 2);

        bus.rxq_pop_front(q1).unwrap();
        assert_eq!(bus.pools[0].ref_count(0), 1);

        bus.rxq_pop_front(q2).unwrap();
        assert_eq!(bus.pools[0].ref_count(0), 0);
    }

    #[test]
    fn backpressure_counts_partial_delivery_failure() {
        let bus = one_pool_bus(16, 8, 2, 2);
        let q = bus.rxq_init(2).unwrap();
        bus.subscribe(q, 1).unwrap();

        bus.publish(1, &[0u8; 4]).unwrap();
        bus.publish(1, &[0u8; 4]).unwrap();
        let result = bus.publish(1, &[0u8; 4]);

        assert_eq!(result.unwrap_err(), Error::Error);
        assert_eq!(bus.delivery_failures(), 1);
    }

    #[test]
    fn unsubscribe_then_publish_delivers_nowhere() {
        let bus = one_pool_bus(16, 4, 2, 2);
        let q = bus.rxq_init(4).unwrap();
        bus.subscribe(q, 3).unwrap();
        bus.unsubscribe(q, 3).unwrap();

        bus.publish(3, &[0u8; 4]).unwrap();
        assert_eq!(bus.rxq_front(q).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn rxq_init_past_max_rxqs_errors() {
        let bus = one_pool_bus(16, 4, 1, 2);
        bus.rxq_init(4).unwrap();
        assert_eq!(bus.rxq_init(4).unwrap_err(), Error::NoResources);
    }

    #[test]
    fn publish_reserve_past_every_pool_size_errors() {
        let bus = one_pool_bus(8, 2, 1, 1);
        assert_eq!(bus.publish_reserve(9).unwrap_err(), Error::NoSpace);
    }

    #[test]
    fn publish_reserve_rejects_zero_size() {
        let bus = one_pool_bus(8, 2, 1, 1);
        assert_eq!(bus.publish_reserve(0).unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn publish_rejects_zero_length_payload() {
        let bus = one_pool_bus(8, 2, 1, 1);
        assert_eq!(bus.publish(1, &[]).unwrap_err(), Error::InvalidArgument);
    }

    fn free_count(bus: &SoftwareBus) -> usize {
        let mut n = 0;
        for i in 0..bus.pools[0].capacity() {
            if bus.pools[0].ref_count(i) == 0 {
                n += 1;
            }
        }
        n
    }
}
