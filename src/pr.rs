//! CPU stall hint for spin loops.
//!
//! Just the one primitive [`backoff`](crate::backoff) needs: a portable
//! pause instruction for tight retry loops. `no_std` spin-based
//! synchronization (`sync::Mutex`, `sync::CountingSemaphore`) backs off
//! through [`Backoff`](crate::backoff::Backoff) rather than calling this
//! directly.

/// CPU stall/pause hint for spin loops.
///
/// Reduces power consumption and contention in spin-wait loops; not a
/// memory fence.
#[inline(always)]
pub fn stall() {
    core::hint::spin_loop();
}
