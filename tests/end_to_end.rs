//! End-to-end scenarios exercising [`swbus::SoftwareBus`] across real
//! threads. Integration tests link `std` regardless of the library crate's
//! `no_std` status, so the timed-wait scenario here uses a real
//! `std::time::Instant`-backed clock and genuine thread scheduling rather
//! than a deterministic fake clock.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant as StdInstant};

use swbus::clock::{Clock, Instant};
use swbus::error::Error;
use swbus::{BusFlags, BusParams, PoolConfig, SoftwareBus};

/// Adapts `std::time::Instant` to the crate's `Clock` trait.
struct StdClock {
    epoch: StdInstant,
}

impl StdClock {
    fn new() -> Self {
        Self {
            epoch: StdInstant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.epoch.elapsed().as_nanos() as u64)
    }
}

fn one_pool_bus(element_size: usize, capacity: usize, max_rxqs: usize, max_subs: usize) -> SoftwareBus {
    SoftwareBus::init(BusParams {
        name: String::from("e2e-bus"),
        max_rxqs,
        max_subs,
        pools: vec![PoolConfig {
            element_size,
            max_elements: capacity,
        }],
        flags: BusFlags::NONE,
    })
    .unwrap()
}

#[test]
fn single_publisher_single_subscriber_sync_mode() {
    let bus = one_pool_bus(16, 4, 2, 2);
    let q = bus.rxq_init(4).unwrap();
    bus.subscribe(q, 7).unwrap();

    for _ in 0..3 {
        bus.publish(7, &[0x01, 0x02, 0x03, 0x04]).unwrap();
    }

    for _ in 0..3 {
        assert!(bus.rxq_front(q).is_ok());
        bus.rxq_pop_front(q).unwrap();
    }
    assert_eq!(bus.rxq_front(q).unwrap_err(), Error::NotFound);
}

#[test]
fn publish_with_no_subscribers_for_pid_recycles_the_buffer() {
    let bus = one_pool_bus(16, 4, 2, 2);
    bus.publish(7, &[0x01, 0x02, 0x03, 0x04]).unwrap();
    assert!(bus.publish_reserve(16).is_ok());
}

#[test]
fn two_subscribers_see_refcount_converge_via_pop() {
    let bus = one_pool_bus(16, 4, 2, 2);
    let q1 = bus.rxq_init(4).unwrap();
    let q2 = bus.rxq_init(4).unwrap();
    bus.subscribe(q1, 9).unwrap();
    bus.subscribe(q2, 9).unwrap();

    bus.publish(9, &[0u8; 8]).unwrap();

    assert!(bus.rxq_front(q1).is_ok());
    assert!(bus.rxq_front(q2).is_ok());

    bus.rxq_pop_front(q1).unwrap();
    bus.rxq_pop_front(q2).unwrap();
}

#[test]
fn backpressure_via_queue_fullness_counts_a_delivery_failure() {
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
fn sync_barrier_allows_a_concurrent_publisher_and_waiting_subscriber_to_rendezvous() {
    // `rxq_wait` blocks on the queue's semaphore until `publish_release` has
    // already enqueued a descriptor, so the subscriber thread below cannot
    // observe a payload until the publisher has run; the sleep after
    // `rxq_wait` returns models the subscriber's own receive-window work,
    // which the writer-preference barrier (see `bus::SoftwareBus`'s reader
    // lock around the tail of `rxq_wait`) keeps from overlapping a
    // concurrent `publish_release`'s delivery walk.
    let bus = Arc::new(one_pool_bus(16, 4, 2, 2));
    let q = bus.rxq_init(4).unwrap();
    bus.subscribe(q, 3).unwrap();

    let subscriber_bus = Arc::clone(&bus);
    let subscriber = thread::spawn(move || {
        let descriptor = subscriber_bus.rxq_wait(q).unwrap();
        thread::sleep(Duration::from_millis(50));
        subscriber_bus.rxq_pop_front(q).unwrap();
        descriptor.size
    });

    // Give the subscriber thread a head start so it is already blocked in
    // `rxq_wait` before the publish below runs.
    thread::sleep(Duration::from_millis(10));

    let start = StdInstant::now();
    bus.publish(3, &[0xAA; 4]).unwrap();

    let delivered_size = subscriber.join().unwrap();
    let total_elapsed = start.elapsed();

    assert_eq!(delivered_size, 4);
    assert!(
        total_elapsed >= Duration::from_millis(50),
        "round trip finished after {total_elapsed:?}, before the subscriber's 50ms receive window could have elapsed"
    );
}

#[test]
fn multi_fifo_chunked_drain_rejects_root_removal_until_children_drain() {
    use swbus::multififo::MultiFifo;

    let mut mf = MultiFifo::new(16, 2, &[4]).unwrap();
    mf.add(Arc::from(&[1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16][..]))
        .unwrap();

    assert_eq!(mf.child(0).unwrap().len(), 4);
    assert_eq!(mf.remove().unwrap_err(), Error::Busy);

    for _ in 0..3 {
        mf.child_mut(0).unwrap().remove().unwrap();
        assert_eq!(mf.remove().unwrap_err(), Error::Busy);
    }
    mf.child_mut(0).unwrap().remove().unwrap();
    assert!(mf.remove().is_ok());
}

#[test]
fn rxq_timed_wait_times_out_on_an_empty_queue() {
    let bus = one_pool_bus(16, 2, 1, 1);
    let q = bus.rxq_init(2).unwrap();
    let clock = StdClock::new();
    let deadline = clock.deadline(Duration::from_millis(20));

    assert_eq!(
        bus.rxq_timed_wait(q, deadline, &clock).unwrap_err(),
        Error::Timeout
    );
}
