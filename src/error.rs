//! Error taxonomy shared by every fallible operation in this crate.
//!
//! Every public operation returns `Result<T, Error>` rather than panicking.
//! `Error` implements [`core::fmt::Display`] unconditionally and
//! [`core::error::Error`] as well, since that trait has lived in `core`
//! (rather than `std`) since Rust 1.81 and this crate otherwise has no way
//! to participate in `?`-based error chains on bare-metal targets.

use core::fmt;

/// The result type returned by fallible operations in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The error kinds produced by this crate.
///
/// Variant names intentionally match the taxonomy callers of the original
/// C library would recognize, not idiomatic Rust error-per-call-site types,
/// since a single shared enum is what lets `publish_release`'s partial-walk
/// failure accumulate cleanly into one `Error::Error` without allocating a
/// `Vec<Error>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Null/malformed inputs, zero sizes, a misordered pool table, etc.
    InvalidArgument,
    /// No pool can satisfy a reservation.
    NoSpace,
    /// The RX-queue table or subscriber registry is at capacity.
    NoResources,
    /// `(pid, queue)` is already subscribed.
    Duplicate,
    /// The target of an `unsubscribe`/query was not present.
    NotFound,
    /// A timed wait's deadline passed before the condition was satisfied.
    Timeout,
    /// A non-reentrant guard (multi-FIFO) observed concurrent use.
    Busy,
    /// Aggregate/partial failure from a multi-step walk (some, not all,
    /// subscriber deliveries failed during `publish_release`).
    Error,
    /// An invariant was violated (e.g. refcount underflow). Reachable only
    /// as defense in depth; the documented invariants in this crate should
    /// make this unreachable in practice.
    Fatal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::NoSpace => "no space available",
            Error::NoResources => "resource table at capacity",
            Error::Duplicate => "duplicate subscription",
            Error::NotFound => "not found",
            Error::Timeout => "operation timed out",
            Error::Busy => "resource busy",
            Error::Error => "one or more sub-operations failed",
            Error::Fatal => "invariant violation",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
