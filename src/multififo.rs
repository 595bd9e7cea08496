//! Multi-FIFO: a FIFO of large records with zero-copy child "shadow" FIFOs.
//!
//! Useful when producers emit large packets but consumers want to drain them
//! in smaller, fixed-size chunks — for example a process that produces large
//! packets of telemetry which a periodic low-priority task feeds out over a
//! slow transport a few bytes at a time, without ever copying the packet.
//!
//! All data lives in the root FIFO, stored as reference-counted byte records
//! (`alloc::sync::Arc<[u8]>`). Each child FIFO holds [`Shadow`] views — a
//! clone of the `Arc` plus an offset and length — into the root's current
//! front record, so child FIFOs never copy payload bytes, only bump a
//! refcount. This is the safe, owned-`Arc` equivalent of the original's
//! pointer-aliasing shadow FIFOs.
//!
//! Not internally thread-safe: a non-reentrant `locked` flag (mirroring the
//! original's cooperative "busy" boolean) rejects concurrent `add`/`remove`
//! calls with [`Error::Busy`] rather than racing, so it is meant to be driven
//! either single-threaded or wrapped externally.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fifo::Fifo;

/// A zero-copy view into a byte range of a root record.
#[derive(Clone)]
pub struct Shadow {
    data: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl Shadow {
    /// The bytes this shadow view covers.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// The length of this view in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this view covers zero bytes. Child element sizes are
    /// validated to be non-zero at construction, so this is always `false`
    /// in practice; kept for API symmetry with slice-like types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A root FIFO of fixed-size byte records, with `n` child shadow FIFOs that
/// drain the current front record in smaller chunks.
pub struct MultiFifo {
    root: Fifo<Arc<[u8]>>,
    children: Vec<Fifo<Shadow>>,
    child_elt_sizes: Vec<usize>,
    elt_size: usize,
    front_refmask: u32,
    locked: bool,
}

impl MultiFifo {
    /// Create a new, empty multi-FIFO.
    ///
    /// `elt_size` is the size in bytes of a root record. `child_elt_sizes`
    /// gives one entry per child FIFO, each of which must be non-zero and
    /// evenly divide `elt_size`.
    pub fn new(elt_size: usize, max_elts: usize, child_elt_sizes: &[usize]) -> Result<Self> {
        if elt_size == 0 || child_elt_sizes.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let mut children = Vec::with_capacity(child_elt_sizes.len());
        for &size in child_elt_sizes {
            if size == 0 || elt_size % size != 0 {
                return Err(Error::InvalidArgument);
            }
            let n_elts = elt_size / size;
            children.push(Fifo::new(n_elts)?);
        }
        Ok(Self {
            root: Fifo::new(max_elts)?,
            children,
            child_elt_sizes: child_elt_sizes.to_vec(),
            elt_size,
            front_refmask: 0,
            locked: false,
        })
    }

    /// The number of child shadow FIFOs.
    #[must_use]
    pub fn n_children(&self) -> usize {
        self.children.len()
    }

    /// Borrow child FIFO `i`, for consumers to pull chunks from.
    #[must_use]
    pub fn child(&self, i: usize) -> Option<&Fifo<Shadow>> {
        self.children.get(i)
    }

    /// Mutably borrow child FIFO `i`, for consumers to pull chunks from.
    pub fn child_mut(&mut self, i: usize) -> Option<&mut Fifo<Shadow>> {
        self.children.get_mut(i)
    }

    /// Whether the root FIFO is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.root.is_full()
    }

    /// Whether the root FIFO is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The number of records in the root FIFO.
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// The root FIFO's capacity, in records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.root.capacity()
    }

    /// Whether a concurrent `add`/`remove` is in progress.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The current front record, without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&Arc<[u8]>> {
        self.root.front()
    }

    fn children_status_update(&mut self) {
        for (i, child) in self.children.iter().enumerate() {
            if child.is_empty() {
                self.front_refmask &= !(1 << i);
            }
        }
    }

    fn children_feed(&mut self) -> Result<()> {
        if self.root.is_empty() {
            return Ok(());
        }
        self.front_refmask = 0;
        let front = self.root.front().expect("just checked non-empty").clone();
        for (i, &child_size) in self.child_elt_sizes.iter().enumerate() {
            let n_elts = self.elt_size / child_size;
            for j in 0..n_elts {
                let shadow = Shadow {
                    data: front.clone(),
                    offset: child_size * j,
                    len: child_size,
                };
                self.children[i].add(shadow)?;
                self.front_refmask |= 1 << i;
            }
        }
        Ok(())
    }

    /// Enqueue a new root record.
    ///
    /// `e.len()` must equal this multi-FIFO's `elt_size`. If every child has
    /// finished draining the current front record, the (possibly new) front
    /// record is fed into every child.
    pub fn add(&mut self, e: Arc<[u8]>) -> Result<()> {
        if e.len() != self.elt_size {
            return Err(Error::InvalidArgument);
        }
        if self.locked {
            return Err(Error::Busy);
        }
        self.locked = true;
        let result = (|| {
            self.root.add(e)?;
            self.children_status_update();
            if self.front_refmask == 0 {
                self.children_feed()?;
            }
            Ok(())
        })();
        self.locked = false;
        result
    }

    /// Remove the front record, if every child has finished draining it.
    ///
    /// Fails with [`Error::Busy`] if any child still holds a shadow view
    /// into the current front record.
    pub fn remove(&mut self) -> Result<Arc<[u8]>> {
        if self.locked {
            return Err(Error::Busy);
        }
        self.locked = true;
        let result = (|| {
            self.children_status_update();
            if self.front_refmask != 0 {
                return Err(Error::Busy);
            }
            let removed = self.root.remove()?;
            self.children_feed()?;
            Ok(removed)
        })();
        self.locked = false;
        result
    }

    /// Empty the root FIFO and every child FIFO.
    pub fn clear(&mut self) {
        self.root.clear();
        for child in &mut self.children {
            child.clear();
        }
        self.front_refmask = 0;
        self.locked = false;
    }
}
