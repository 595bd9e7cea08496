//! Allocator abstraction and the caller-provided-storage facade.
//!
//! This module defines the [`Allocator`] trait which lets the data
//! structures in this crate use custom memory allocators, and a small set of
//! bitflags plus [`alloc_with_flags`]/[`free_with_flags`] free functions that
//! give every `*_init` call a uniform way to accept either library-allocated
//! or caller-provided storage, with optional zeroing.
//!
//! # Design
//!
//! On bare-metal targets there is no heap, so every structure in this crate
//! that owns storage (a pool's element array, an RX-queue table, ...) must be
//! constructible from a caller-supplied buffer instead of allocating one.
//! [`AllocFlags::NO_ALLOC`] marks that case: when set, [`alloc_with_flags`]
//! returns the caller's pointer unchanged (zeroing it in place if
//! [`AllocFlags::ZALLOC`] is also set) instead of calling into the
//! [`Allocator`].

use alloc::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

/// Minimal bitflags-style macro, used instead of pulling in the `bitflags`
/// crate for a single two-bit flag set.
macro_rules! bitflags_lite {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(
                $(#[$var_meta:meta])*
                const $var:ident = $val:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            $(
                $(#[$var_meta])*
                pub const $var: $name = $name($val);
            )*

            /// The empty flag set.
            pub const NONE: $name = $name(0);

            /// Whether `self` contains every bit set in `other`.
            #[must_use]
            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl core::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_lite! {
    /// Flags controlling a single allocation request.
    ///
    /// Mirrors the original library's `RCSW_NOALLOC_HANDLE` /
    /// `RCSW_NOALLOC_DATA` / `RCSW_NOALLOC_META` / `RCSW_ZALLOC` bits, folded
    /// into one flag since Rust's ownership model means a single caller-
    /// provided buffer is always used in full (there is no separate
    /// "handle" vs "data" vs "metadata" allocation site once a type owns its
    /// own storage as a field rather than a set of parallel C arrays).
    pub struct AllocFlags: u8 {
        /// Use caller-provided storage instead of allocating.
        const NO_ALLOC = 0x1;
        /// Zero the memory before returning it, whichever path provided it.
        const ZALLOC = 0x2;
    }
}

/// A memory allocator for this crate's data structures.
///
/// # Safety
///
/// Implementations must ensure that:
/// - `malloc` returns properly aligned memory for any type up to pointer
///   alignment, sized at least `size` bytes.
/// - `free` only deallocates memory previously returned by `malloc` on the
///   same allocator instance, with the same `size`.
pub trait Allocator {
    /// Allocate a new memory block of at least `size` bytes.
    fn malloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Deallocate a block previously returned by `malloc`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with this `size`,
    /// and must not be used after this call.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// An [`Allocator`] backed by Rust's global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAllocator;

fn layout_for(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), core::mem::align_of::<usize>()).ok()
}

impl Allocator for GlobalAllocator {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = layout_for(size)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = layout_for(size) {
            // SAFETY: caller guarantees ptr was allocated by us with this size.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}

/// A buffer returned by [`alloc_with_flags`]: either owned by the allocator
/// (and freed by [`free_with_flags`]) or borrowed from the caller (in which
/// case `free_with_flags` is a no-op).
#[derive(Debug)]
pub struct Buffer {
    ptr: NonNull<u8>,
    size: usize,
    owned: bool,
}

impl Buffer {
    /// The raw pointer to the start of the buffer.
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// The buffer's size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the buffer is empty (always false; kept for API symmetry with
    /// slice-like types and to satisfy `clippy::len_without_is_empty`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Allocate `n_bytes`, honoring `flags`.
///
/// If `flags` contains [`AllocFlags::NO_ALLOC`], `user_ptr` must be `Some`
/// and is returned as-is (zeroed first if [`AllocFlags::ZALLOC`] is also
/// set). Otherwise `alloc` is used to obtain new storage, zeroed up front
/// when `ZALLOC` is set.
pub fn alloc_with_flags<A: Allocator>(
    alloc: &A,
    user_ptr: Option<NonNull<u8>>,
    n_bytes: usize,
    flags: AllocFlags,
) -> Option<Buffer> {
    if flags.contains(AllocFlags::NO_ALLOC) {
        let ptr = user_ptr?;
        if flags.contains(AllocFlags::ZALLOC) {
            // SAFETY: caller promises `ptr` is valid for `n_bytes` writes.
            unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, n_bytes) };
        }
        return Some(Buffer {
            ptr,
            size: n_bytes,
            owned: false,
        });
    }

    let ptr = if flags.contains(AllocFlags::ZALLOC) {
        let layout = layout_for(n_bytes)?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { alloc_zeroed(layout) })?
    } else {
        alloc.malloc(n_bytes)?
    };

    Some(Buffer {
        ptr,
        size: n_bytes,
        owned: true,
    })
}

/// Release a [`Buffer`] obtained from [`alloc_with_flags`].
///
/// A no-op if the buffer was caller-provided (`NO_ALLOC` was set at
/// allocation time).
///
/// # Safety
///
/// `buf` must not be used after this call, and must have been produced by
/// [`alloc_with_flags`] with `alloc` as the allocator.
pub unsafe fn free_with_flags<A: Allocator>(alloc: &A, buf: Buffer) {
    if buf.owned {
        // SAFETY: `buf.owned` implies this pointer came from `alloc.malloc`
        // or the global zeroed-allocation path using the same layout rules.
        unsafe { alloc.free(buf.ptr, buf.size) };
    }
}
