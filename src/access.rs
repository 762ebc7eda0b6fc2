//! Per-transaction access descriptors.
//!
//! A read access remembers the lock word it validated against; a write
//! access buffers a pending value together with everything needed to publish
//! it and to restore the slot on rollback. Distinct locations that hash to
//! the same slot share that slot's single ownership and chain off one write
//! set entry.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::field::WordKind;

/// A validated read: location plus the free lock word observed for it.
pub(crate) struct ReadAccess {
    pub base: u64,
    pub offset: u64,
    pub slot: usize,
    pub lock: u64,
}

impl ReadAccess {
    #[inline]
    pub(crate) fn matches(&self, base: u64, offset: u64) -> bool {
        self.base == base && self.offset == offset
    }
}

/// A buffered write. `prev_lock` is the free word present when this
/// transaction first acquired the slot; every entry on a chain carries the
/// chain head's value so rollback can restore the slot from the head alone.
pub(crate) struct WriteAccess {
    base: u64,
    offset: u64,
    /// Target word inside the object's storage.
    word: *const AtomicU64,
    pub kind: WordKind,
    pub pending: u64,
    pub prev_lock: u64,
    pub next: Option<Box<WriteAccess>>,
}

impl WriteAccess {
    pub(crate) fn new(
        base: u64,
        offset: u64,
        word: &AtomicU64,
        kind: WordKind,
        pending: u64,
        prev_lock: u64,
    ) -> Self {
        Self {
            base,
            offset,
            word: word as *const AtomicU64,
            kind,
            pending,
            prev_lock,
            next: None,
        }
    }

    #[inline]
    pub(crate) fn matches(&self, base: u64, offset: u64) -> bool {
        self.base == base && self.offset == offset
    }

    /// Find the chain entry for a location, if this transaction wrote it.
    pub(crate) fn find(&self, base: u64, offset: u64) -> Option<&WriteAccess> {
        if self.matches(base, offset) {
            Some(self)
        } else {
            self.next.as_deref().and_then(|next| next.find(base, offset))
        }
    }

    /// Merge a repeated write into the chain: overwrite the pending value of
    /// a matching entry, or append at the tail with the head's saved word.
    pub(crate) fn coalesce(&mut self, mut new: WriteAccess) {
        if self.matches(new.base, new.offset) {
            self.kind = new.kind;
            self.pending = new.pending;
        } else if let Some(next) = self.next.as_mut() {
            next.coalesce(new);
        } else {
            new.prev_lock = self.prev_lock;
            self.next = Some(Box::new(new));
        }
    }

    /// Store the pending value into the target word. Relaxed: the release
    /// store that frees the slot's lock publishes it.
    #[inline]
    pub(crate) fn write_back(&self) {
        // SAFETY: the pointer was captured from a live borrow when the write
        // was buffered, and the transaction contract requires the object to
        // outlive the attempt that buffered writes against it.
        unsafe { (*self.word).store(self.pending, Ordering::Relaxed) }
    }
}
