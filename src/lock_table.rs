//! Versioned lock table.
//!
//! A fixed power-of-two array of 64-bit atomic words, indexed by a hash of
//! (object identity, field offset). Each word is either the version written
//! by the last committing transaction that touched the slot, or an ownership
//! marker naming the thread that currently holds it exclusively.

use core::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::fast::FixedState;

use crate::error::StmError;

/// Ownership flag. A word with this bit set is owned; the low 63 bits are
/// the owner's thread id. A word with it clear is a free version.
const OWNED: u64 = 1 << 63;

/// Classify a lock word with a single load: set sign bit means owned.
#[inline]
pub(crate) fn is_owned(word: u64) -> bool {
    word & OWNED != 0
}

/// Thread id of the owner. Only meaningful when `is_owned(word)`.
#[inline]
pub(crate) fn owner_of(word: u64) -> u64 {
    word & !OWNED
}

#[inline]
fn owned_by(id: u64) -> u64 {
    OWNED | id
}

pub(crate) struct LockTable {
    words: Box<[AtomicU64]>,
    mask: usize,
    hasher: FixedState,
}

impl LockTable {
    pub(crate) fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "lock table size must be a power of two");
        let mut words = Vec::with_capacity(size);
        for _ in 0..size {
            words.push(AtomicU64::new(0));
        }
        Self {
            words: words.into_boxed_slice(),
            mask: size - 1,
            hasher: FixedState::default(),
        }
    }

    /// Map a location to its slot. Stable for the lifetime of the object
    /// because the identity is the stable address of its word storage.
    #[inline]
    pub(crate) fn slot(&self, base: u64, offset: u64) -> usize {
        self.hasher.hash_one((base, offset)) as usize & self.mask
    }

    /// Load the slot's word. Fails if it is owned by a thread other than
    /// `self_id`. Never blocks.
    #[inline]
    pub(crate) fn check_lock(&self, slot: usize, self_id: u64) -> Result<u64, StmError> {
        let word = self.words[slot].load(Ordering::Acquire);
        if is_owned(word) && owner_of(word) != self_id {
            return Err(StmError::LockedByOther);
        }
        Ok(word)
    }

    /// Transition a free slot to owned-by-`self_id`, returning the previous
    /// free word. Re-entry on a slot already owned by `self_id` returns the
    /// owned word unchanged. One CAS attempt; a lost race is a conflict.
    pub(crate) fn try_lock(&self, slot: usize, self_id: u64) -> Result<u64, StmError> {
        let word = self.words[slot].load(Ordering::Acquire);
        if is_owned(word) {
            if owner_of(word) == self_id {
                return Ok(word);
            }
            return Err(StmError::LockedByOther);
        }
        match self.words[slot].compare_exchange(
            word,
            owned_by(self_id),
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(prev) => Ok(prev),
            Err(_) => Err(StmError::LockedByOther),
        }
    }

    /// Store `word` into the slot, releasing ownership. The caller must own
    /// the slot; `word` is a new version on commit or the saved previous
    /// word on rollback.
    #[inline]
    pub(crate) fn set_and_release(&self, slot: usize, word: u64) {
        self.words[slot].store(word, Ordering::Release);
    }
}
