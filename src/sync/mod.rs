//! Synchronization primitives: the `Mutex`, `CountingSemaphore`, and
//! `RdwrLock` collaborators that [`crate::pcqueue`] and [`crate::bus`] are
//! built from.

pub mod csem;
pub mod mutex;
pub mod rdwrl;

pub use csem::CountingSemaphore;
pub use mutex::{Mutex, MutexGuard};
pub use rdwrl::{RdwrLock, Scope};
