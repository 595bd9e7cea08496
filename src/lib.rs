//! # swbus
//!
//! A zero-copy, reference-counted, many-to-many publish/subscribe bus.
//!
//! A [`bus::SoftwareBus`] owns a table of fixed-element-size memory pools. A
//! publisher reserves a buffer from the smallest pool that fits, writes into
//! it, and releases it under a packet id; release walks the subscriber
//! registry and enqueues a small packet descriptor — never the payload
//! itself — onto every matching RX queue, bumping the buffer's reference
//! count once per successful delivery. Subscribers peek their queue's front
//! descriptor, read the shared buffer, and pop, which drops the reference;
//! the buffer returns to its pool once the last reference is gone.
//!
//! ## Module organization
//!
//! ### Foundation
//! - [`error`] - the shared `Error`/`Result` taxonomy
//! - [`clock`] - the `Clock`/`Instant` collaborator timed waits are built on
//! - [`alloc_facade`] - the `Allocator` trait and caller-provided-storage facade
//!
//! ### Synchronization
//! - [`sync`] - `Mutex`, `CountingSemaphore`, and `RdwrLock`
//! - [`backoff`] - exponential backoff for spin-wait contention management
//!
//! ### Data structures
//! - [`fifo`] - bounded array-backed FIFO
//! - [`multififo`] - a FIFO of large records with zero-copy child shadow FIFOs
//! - [`mpool`] - fixed-element memory pool with per-element reference counts
//! - [`pcqueue`] - producer-consumer queue (FIFO + mutex + two semaphores)
//! - [`registry`] - the subscriber registry
//!
//! ### The bus itself
//! - [`bus`] - [`bus::SoftwareBus`] and its supporting types
//!
//! ## `no_std`
//!
//! This crate is `no_std` and allocates via [`alloc`]; it runs equally on a
//! hosted target or bare metal given a working global allocator. Logging
//! goes through the [`log`] facade, so a bare-metal integration that wires up
//! no logger simply sees no output rather than failing to link.

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

// =============================================================================
// Foundation
// =============================================================================

/// The shared error taxonomy and `Result` alias.
pub mod error;

/// The monotonic clock collaborator used by every timed wait.
pub mod clock;

/// Allocator abstraction and the caller-provided-storage facade.
pub mod alloc_facade;

// =============================================================================
// Synchronization
// =============================================================================

/// Exponential backoff for contention management.
pub mod backoff;

/// CPU stall hint used internally by [`backoff`].
mod pr;

/// `Mutex`, `CountingSemaphore`, and `RdwrLock`.
pub mod sync;

// =============================================================================
// Data structures
// =============================================================================

/// Bounded, array-backed FIFO.
pub mod fifo;

/// A FIFO of large records with zero-copy child shadow FIFOs.
pub mod multififo;

/// Fixed-element memory pool with per-element reference counts.
pub mod mpool;

/// Producer-consumer queue.
pub mod pcqueue;

/// The subscriber registry.
pub mod registry;

// =============================================================================
// The bus
// =============================================================================

/// The software bus itself.
pub mod bus;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use alloc_facade::Allocator;
pub use bus::{BusFlags, BusParams, BusReservation, PacketDescriptor, PoolConfig, SoftwareBus};
pub use clock::{Clock, Instant};
pub use error::{Error, Result};
pub use registry::{PacketId, RxqRef};
